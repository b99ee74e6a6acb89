//! Chirp query cache
//!
//! Client-side store of read results for one page session. Entries come from
//! three sources:
//!
//! - **Hydration**: settled results computed before render and embedded in the
//!   page, written with [`QueryCache::seed`].
//! - **Fetches**: loaders started by [`QueryCache::ensure`] and
//!   [`QueryCache::subscribe`] when an entry is missing or stale.
//! - **Invalidation**: [`QueryCache::invalidate`] after a confirmed write.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! fetch_timeout_ms = 10000
//! retry_failed_on_subscribe = true
//! ```

mod clock;
mod config;
mod entry;
mod keys;
mod lock;
mod snapshot;
mod store;
mod subscription;

pub use clock::{LogicalClock, Timestamp};
pub use config::{CacheConfig, DEFAULT_FETCH_TIMEOUT_MS};
pub use entry::{CacheEntry, QueryOutcome, QueryStatus};
pub use keys::{CREATE_POST, GET_ALL_POSTS, GET_POST_BY_ID, GET_USER_BY_USERNAME, QueryKey, ReadQuery};
pub use snapshot::{EncodedSnapshot, SNAPSHOT_VERSION, Snapshot, SnapshotEntry, SnapshotOutcome};
pub use store::{Invalidation, Loader, QueryCache, SeedOutcome};
pub use subscription::Subscription;

pub(crate) use lock::mutex_lock;
