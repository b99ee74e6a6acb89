//! Cache configuration.
//!
//! Built from the validated `[cache]` settings; controls loader timeouts and
//! error retry behavior.

use std::time::Duration;

pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

/// Query cache configuration for one page session.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound for a single loader run in milliseconds; `0` disables it.
    pub fetch_timeout_ms: u64,
    /// Re-run a read that failed with a transport error on the next subscribe.
    pub retry_failed_on_subscribe: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            retry_failed_on_subscribe: true,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            fetch_timeout_ms: settings
                .fetch_timeout
                .map_or(0, |timeout| u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)),
            retry_failed_on_subscribe: settings.retry_failed_on_subscribe,
        }
    }
}

impl CacheConfig {
    /// Loader timeout, or `None` when loaders may run indefinitely.
    pub fn fetch_timeout(&self) -> Option<Duration> {
        (self.fetch_timeout_ms > 0).then(|| Duration::from_millis(self.fetch_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.fetch_timeout_ms, 10_000);
        assert!(config.retry_failed_on_subscribe);
        assert_eq!(config.fetch_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn built_from_settings() {
        let settings = crate::config::CacheSettings {
            fetch_timeout: None,
            retry_failed_on_subscribe: false,
        };
        let config = CacheConfig::from(&settings);
        assert_eq!(config.fetch_timeout_ms, 0);
        assert!(!config.retry_failed_on_subscribe);

        let settings = crate::config::CacheSettings {
            fetch_timeout: Some(Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS)),
            retry_failed_on_subscribe: true,
        };
        assert_eq!(
            CacheConfig::from(&settings).fetch_timeout_ms,
            DEFAULT_FETCH_TIMEOUT_MS
        );
    }

    #[test]
    fn zero_timeout_disables_it() {
        let config = CacheConfig {
            fetch_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.fetch_timeout(), None);
    }
}
