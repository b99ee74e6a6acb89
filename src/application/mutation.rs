//! Write execution and cache invalidation.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use metrics::counter;
use tracing::{info, warn};

use crate::application::router::{Mutation, MutationOutput, ProcedureRouter};
use crate::cache::{QueryCache, QueryKey, ReadQuery};
use crate::domain::error::ProcedureError;

const METRIC_MUTATION: &str = "chirp_mutation_total";

/// Declares which cached reads a write makes stale.
#[derive(Debug, Clone)]
pub enum InvalidationRule {
    /// Always invalidate this key.
    Exact(QueryKey),
    /// Derive the keys from the mutation input.
    FromInput(fn(&Mutation) -> Vec<QueryKey>),
}

impl InvalidationRule {
    pub fn keys(&self, mutation: &Mutation) -> Vec<QueryKey> {
        match self {
            Self::Exact(key) => vec![key.clone()],
            Self::FromInput(derive) => derive(mutation),
        }
    }
}

/// A write together with its statically declared invalidation set.
#[derive(Debug, Clone)]
pub struct MutationDescriptor {
    mutation: Mutation,
    invalidates: Vec<InvalidationRule>,
}

impl MutationDescriptor {
    pub fn new(mutation: Mutation, invalidates: Vec<InvalidationRule>) -> Self {
        Self {
            mutation,
            invalidates,
        }
    }

    /// `createPost`, which makes the feed stale.
    pub fn create_post(content: impl Into<String>) -> Self {
        Self::new(
            Mutation::create_post(content),
            vec![InvalidationRule::Exact(ReadQuery::AllPosts.key())],
        )
    }

    pub fn mutation(&self) -> &Mutation {
        &self.mutation
    }

    pub fn operation(&self) -> &'static str {
        self.mutation.operation()
    }

    /// Keys to invalidate after success, deduplicated and sorted.
    pub fn invalidated_keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<_> = self
            .invalidates
            .iter()
            .flat_map(|rule| rule.keys(&self.mutation))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

/// Runs writes through the router and invalidates only after confirmation.
pub struct MutationCoordinator {
    router: Arc<dyn ProcedureRouter>,
    cache: Arc<QueryCache>,
    pending: Arc<DashMap<&'static str, usize>>,
}

impl MutationCoordinator {
    pub fn new(router: Arc<dyn ProcedureRouter>, cache: Arc<QueryCache>) -> Self {
        Self {
            router,
            cache,
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Whether a write of `operation` is currently running.
    pub fn is_pending(&self, operation: &str) -> bool {
        self.pending
            .get(operation)
            .is_some_and(|count| *count > 0)
    }

    pub async fn mutate(
        &self,
        descriptor: &MutationDescriptor,
    ) -> Result<MutationOutput, ProcedureError> {
        self.mutate_then(descriptor, |_| {}).await
    }

    /// Run a write, calling `on_success` once it is confirmed and before any
    /// declared key is invalidated.
    /// Callers clear the input they own in `on_success`.
    pub async fn mutate_then<F>(
        &self,
        descriptor: &MutationDescriptor,
        on_success: F,
    ) -> Result<MutationOutput, ProcedureError>
    where
        F: FnOnce(&MutationOutput) + Send,
    {
        let operation = descriptor.operation();
        let _pending = PendingGuard::acquire(&self.pending, operation);
        let started_at = Instant::now();

        let result = self.router.mutate(descriptor.mutation()).await;
        let elapsed_ms = started_at.elapsed().as_millis() as u64;

        match &result {
            Ok(output) => {
                on_success(output);
                let keys = descriptor.invalidated_keys();
                for key in &keys {
                    self.cache.invalidate(key);
                }
                counter!(METRIC_MUTATION, "outcome" => "success").increment(1);
                info!(
                    operation,
                    invalidated = keys.len(),
                    elapsed_ms,
                    "Mutation succeeded"
                );
            }
            Err(err) => {
                counter!(METRIC_MUTATION, "outcome" => err.kind()).increment(1);
                warn!(
                    operation,
                    error_kind = err.kind(),
                    error = %err,
                    elapsed_ms,
                    "Mutation failed"
                );
            }
        }

        result
    }
}

struct PendingGuard {
    operation: &'static str,
    pending: Arc<DashMap<&'static str, usize>>,
}

impl PendingGuard {
    fn acquire(pending: &Arc<DashMap<&'static str, usize>>, operation: &'static str) -> Self {
        *pending.entry(operation).or_insert(0) += 1;
        Self {
            operation,
            pending: Arc::clone(pending),
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending
            .remove_if_mut(self.operation, |_, count| {
                *count = count.saturating_sub(1);
                *count == 0
            });
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::cache::{CREATE_POST, GET_ALL_POSTS, GET_POST_BY_ID};

    fn post_keys(mutation: &Mutation) -> Vec<QueryKey> {
        match mutation {
            Mutation::CreatePost(input) => vec![QueryKey::new(
                GET_POST_BY_ID,
                &json!({ "id": Uuid::nil(), "content": input.content }),
            )],
        }
    }

    #[test]
    fn create_post_invalidates_the_feed() {
        let descriptor = MutationDescriptor::create_post("hi");
        assert_eq!(descriptor.operation(), CREATE_POST);
        assert_eq!(
            descriptor.invalidated_keys(),
            vec![QueryKey::new(GET_ALL_POSTS, &json!({}))]
        );
    }

    #[test]
    fn rules_are_combined_and_deduplicated() {
        let descriptor = MutationDescriptor::new(
            Mutation::create_post("hi"),
            vec![
                InvalidationRule::Exact(ReadQuery::AllPosts.key()),
                InvalidationRule::FromInput(post_keys),
                InvalidationRule::Exact(ReadQuery::AllPosts.key()),
            ],
        );

        let keys = descriptor.invalidated_keys();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().any(|key| key.input().contains("\"content\":\"hi\"")));
    }

    #[test]
    fn pending_guard_tracks_nested_acquisitions() {
        let pending = Arc::new(DashMap::new());

        let first = PendingGuard::acquire(&pending, CREATE_POST);
        let second = PendingGuard::acquire(&pending, CREATE_POST);
        assert_eq!(pending.get(CREATE_POST).map(|c| *c), Some(2));

        drop(first);
        assert_eq!(pending.get(CREATE_POST).map(|c| *c), Some(1));
        drop(second);
        assert!(pending.get(CREATE_POST).is_none());
    }
}
