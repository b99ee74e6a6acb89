//! Client page session: one cache, hydrated once, disposed at the end.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::composer::PostComposer;
use crate::application::mutation::MutationCoordinator;
use crate::application::pages::PageRoute;
use crate::application::router::ProcedureRouter;
use crate::cache::{
    CacheConfig, CacheEntry, EncodedSnapshot, Loader, QueryCache, ReadQuery, SeedOutcome,
    Subscription,
};
use crate::infra::codec::{CodecError, SnapshotCodec};

/// Who is looking at the page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Viewer {
    #[default]
    Anonymous,
    SignedIn {
        user_id: String,
    },
}

impl Viewer {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self::SignedIn {
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::SignedIn { user_id } => Some(user_id),
        }
    }
}

#[derive(Debug, Error)]
pub enum HydrationError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("page session has been disposed")]
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationReport {
    Seeded {
        inserted: usize,
        replaced: usize,
        skipped: usize,
    },
    /// The session was hydrated before; nothing changed.
    AlreadyHydrated,
}

pub struct PageSession {
    id: Uuid,
    viewer: Viewer,
    cache: Arc<QueryCache>,
    router: Arc<dyn ProcedureRouter>,
    codec: Arc<dyn SnapshotCodec>,
    coordinator: Arc<MutationCoordinator>,
    hydrated: AtomicBool,
}

impl fmt::Debug for PageSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageSession")
            .field("id", &self.id)
            .field("viewer", &self.viewer)
            .field("cache", &self.cache)
            .field("hydrated", &self.hydrated)
            .finish_non_exhaustive()
    }
}

impl PageSession {
    pub fn create(
        config: CacheConfig,
        router: Arc<dyn ProcedureRouter>,
        codec: Arc<dyn SnapshotCodec>,
        viewer: Viewer,
    ) -> Arc<Self> {
        let cache = QueryCache::new(config);
        let coordinator = Arc::new(MutationCoordinator::new(
            Arc::clone(&router),
            Arc::clone(&cache),
        ));
        let id = Uuid::new_v4();
        info!(session_id = %id, signed_in = viewer.user_id().is_some(), "Created page session");

        Arc::new(Self {
            id,
            viewer,
            cache,
            router,
            codec,
            coordinator,
            hydrated: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn coordinator(&self) -> &Arc<MutationCoordinator> {
        &self.coordinator
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated.load(Ordering::SeqCst)
    }

    /// Seed the cache from an embedded snapshot, at most once per session.
    ///
    /// A snapshot that fails to decode leaves the session unhydrated.
    pub fn hydrate(&self, encoded: &EncodedSnapshot) -> Result<HydrationReport, HydrationError> {
        if self.cache.is_disposed() {
            return Err(HydrationError::Disposed);
        }

        let snapshot = self.codec.decode(encoded)?;

        if self
            .hydrated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!(session_id = %self.id, "Ignored repeated hydration");
            return Ok(HydrationReport::AlreadyHydrated);
        }

        if self.cache.has_subscribers() {
            warn!(
                session_id = %self.id,
                "Hydrating after components subscribed; newer fetched values are kept"
            );
        }

        let (mut inserted, mut replaced, mut skipped) = (0, 0, 0);
        for entry in snapshot.entries {
            match self
                .cache
                .seed(&entry.key, entry.outcome.into(), entry.updated_at)
            {
                SeedOutcome::Inserted => inserted += 1,
                SeedOutcome::Replaced => replaced += 1,
                SeedOutcome::Skipped => skipped += 1,
            }
        }

        info!(
            session_id = %self.id,
            inserted, replaced, skipped, "Hydrated page session"
        );
        Ok(HydrationReport::Seeded {
            inserted,
            replaced,
            skipped,
        })
    }

    /// Loader that runs `query` through this session's router.
    pub fn loader(&self, query: &ReadQuery) -> Loader {
        let router = Arc::clone(&self.router);
        let query = query.clone();
        Loader::new(move || {
            let router = Arc::clone(&router);
            let query = query.clone();
            async move { router.query(&query).await }
        })
    }

    pub fn ensure(&self, query: &ReadQuery) -> CacheEntry {
        self.cache.ensure(&query.key(), self.loader(query))
    }

    pub fn subscribe(&self, query: &ReadQuery) -> Subscription {
        self.cache.subscribe(&query.key(), self.loader(query))
    }

    /// Subscribe to every read the page at `route` renders.
    pub fn open(&self, route: &PageRoute) -> Vec<Subscription> {
        route
            .queries()
            .iter()
            .map(|query| self.subscribe(query))
            .collect()
    }

    /// Composer for the signed-in viewer; anonymous viewers get none.
    pub fn composer(&self) -> Option<PostComposer> {
        PostComposer::new(Arc::clone(&self.coordinator), &self.viewer)
    }

    pub fn dispose(&self) {
        self.cache.dispose();
        info!(session_id = %self.id, "Disposed page session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedSettings;
    use crate::infra::codec::JsonCodec;
    use crate::infra::memory::InMemoryRouter;

    fn session() -> Arc<PageSession> {
        PageSession::create(
            CacheConfig::default(),
            InMemoryRouter::seeded(FeedSettings::default()),
            Arc::new(JsonCodec),
            Viewer::Anonymous,
        )
    }

    #[test]
    fn malformed_snapshots_do_not_consume_hydration() {
        let session = session();

        let err = session
            .hydrate(&EncodedSnapshot::new("{"))
            .expect_err("malformed");
        assert!(matches!(err, HydrationError::Codec(_)));
        assert!(!session.is_hydrated());

        let report = session
            .hydrate(&EncodedSnapshot::new(r#"{"version":1,"entries":[]}"#))
            .expect("valid snapshot");
        assert_eq!(
            report,
            HydrationReport::Seeded {
                inserted: 0,
                replaced: 0,
                skipped: 0
            }
        );
        assert!(session.is_hydrated());
    }

    #[test]
    fn anonymous_viewers_get_no_composer() {
        assert!(session().composer().is_none());
        assert_eq!(Viewer::signed_in("user_1").user_id(), Some("user_1"));
    }

    #[test]
    fn disposed_sessions_refuse_hydration() {
        let session = session();
        session.dispose();

        let err = session
            .hydrate(&EncodedSnapshot::new(r#"{"version":1,"entries":[]}"#))
            .expect_err("disposed");
        assert!(matches!(err, HydrationError::Disposed));
    }
}
