//! Logical timestamps for last-writer-wins reconciliation.
//!
//! Timestamps are milliseconds since the Unix epoch, issued by a clock that
//! never repeats or goes backwards within one process. Server snapshots and
//! client fetches are stamped by different clocks; wall-clock alignment keeps
//! their values comparable, and [`LogicalClock::observe`] keeps a client clock
//! ahead of every timestamp it has seeded.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Self = Self(0);

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Monotonic issuer of [`Timestamp`]s.
#[derive(Debug, Default)]
pub struct LogicalClock {
    last: AtomicU64,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a timestamp strictly greater than every one issued or observed.
    pub fn tick(&self) -> Timestamp {
        let now = wall_clock_millis();
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|last| last);
        Timestamp(now.max(previous.saturating_add(1)))
    }

    /// Advance the clock past a timestamp issued elsewhere.
    pub fn observe(&self, timestamp: Timestamp) {
        self.last.fetch_max(timestamp.0, Ordering::SeqCst);
    }

    /// The most recent timestamp issued or observed.
    pub fn last(&self) -> Timestamp {
        Timestamp(self.last.load(Ordering::SeqCst))
    }
}

fn wall_clock_millis() -> u64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    u64::try_from(nanos).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_are_strictly_increasing() {
        let clock = LogicalClock::new();
        let t1 = clock.tick();
        let t2 = clock.tick();
        let t3 = clock.tick();

        assert!(t1 < t2);
        assert!(t2 < t3);
        assert_eq!(clock.last(), t3);
    }

    #[test]
    fn observed_timestamps_push_the_clock_forward() {
        let clock = LogicalClock::new();
        let far_future = Timestamp::from_millis(u64::MAX / 2);

        clock.observe(far_future);
        assert!(clock.tick() > far_future);
    }

    #[test]
    fn observing_an_older_timestamp_is_a_no_op() {
        let clock = LogicalClock::new();
        let current = clock.tick();

        clock.observe(Timestamp::from_millis(1));
        assert_eq!(clock.last(), current);
    }

    #[test]
    fn ticks_track_wall_clock() {
        let clock = LogicalClock::new();
        let now = wall_clock_millis();
        assert!(clock.tick().as_millis() >= now);
    }
}
