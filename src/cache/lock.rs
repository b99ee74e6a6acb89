use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Lock a mutex, recovering the inner state if a previous holder panicked.
///
/// Cache state is only ever mutated in short, non-panicking sections, so a
/// poisoned guard still holds a consistent map.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!(
            op,
            target_module = target,
            lock_kind = "mutex.lock",
            result = "poisoned_recovered",
            "Recovered from poisoned session lock"
        );
        poisoned.into_inner()
    })
}
