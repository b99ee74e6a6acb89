use tokio::sync::watch;

use super::entry::CacheEntry;
use super::keys::QueryKey;

/// Live interest in one cache key.
///
/// Every subscription on a key observes the same entry. Dropping the last one
/// leaves the entry in the cache; it only stops invalidation from refetching.
#[derive(Debug)]
pub struct Subscription {
    key: QueryKey,
    receiver: watch::Receiver<CacheEntry>,
}

impl Subscription {
    pub(crate) fn new(key: QueryKey, receiver: watch::Receiver<CacheEntry>) -> Self {
        Self { key, receiver }
    }

    /// A subscription that is already closed, handed out after dispose.
    pub(crate) fn detached(key: QueryKey) -> Self {
        let (_, receiver) = watch::channel(CacheEntry::idle(key.clone()));
        Self { key, receiver }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// The entry as of now.
    pub fn current(&self) -> CacheEntry {
        self.receiver.borrow().clone()
    }

    /// Wait for the next state transition.
    ///
    /// Returns `None` once the cache has been disposed.
    pub async fn changed(&mut self) -> Option<CacheEntry> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Wait until the entry holds a success or an error.
    ///
    /// Returns immediately when it already does, and `None` if the cache is
    /// disposed first.
    pub async fn settled(&mut self) -> Option<CacheEntry> {
        self.receiver
            .wait_for(|entry| entry.status().is_settled())
            .await
            .ok()
            .map(|entry| entry.clone())
    }
}
