//! Ahead-of-render computation of hydration snapshots.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info};

use crate::application::router::ProcedureRouter;
use crate::cache::{EncodedSnapshot, LogicalClock, ReadQuery, Snapshot};
use crate::infra::codec::{CodecError, SnapshotCodec};

/// Runs a page's reads on the server side and packages the results.
pub struct Prefetcher {
    router: Arc<dyn ProcedureRouter>,
    codec: Arc<dyn SnapshotCodec>,
    clock: LogicalClock,
}

impl Prefetcher {
    pub fn new(router: Arc<dyn ProcedureRouter>, codec: Arc<dyn SnapshotCodec>) -> Self {
        Self {
            router,
            codec,
            clock: LogicalClock::new(),
        }
    }

    /// Execute every query and collect its settled result.
    ///
    /// Failures, not-found included, are recorded as error entries so that
    /// the client renders them without fetching again.
    pub async fn snapshot(&self, queries: &[ReadQuery]) -> Snapshot {
        let results = join_all(queries.iter().map(|query| async move {
            let outcome = self.router.query(query).await;
            (query.key(), outcome)
        }))
        .await;

        let mut snapshot = Snapshot::new();
        for (key, outcome) in results {
            if let Err(err) = &outcome {
                debug!(key = %key, error_kind = err.kind(), "Prefetched read failed");
            }
            snapshot.insert(key, outcome, self.clock.tick());
        }
        snapshot
    }

    /// [`Prefetcher::snapshot`] followed by encoding.
    pub async fn compute_snapshot(
        &self,
        queries: &[ReadQuery],
    ) -> Result<EncodedSnapshot, CodecError> {
        let snapshot = self.snapshot(queries).await;
        let encoded = self.codec.encode(&snapshot)?;
        info!(
            entries = snapshot.len(),
            bytes = encoded.as_str().len(),
            "Computed hydration snapshot"
        );
        Ok(encoded)
    }
}
