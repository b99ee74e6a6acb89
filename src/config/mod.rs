//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::DEFAULT_FETCH_TIMEOUT_MS;
use crate::domain::posts::{DEFAULT_FEED_LIMIT, DEFAULT_MAX_CONTENT_CHARS};

mod cli;

pub use cli::{CliArgs, Command, DemoArgs, SessionOverrides, SnapshotArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "chirp";
const MAX_FETCH_TIMEOUT_MS: u64 = 10 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub feed: FeedSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// `None` lets loaders run without a deadline.
    pub fetch_timeout: Option<Duration>,
    pub retry_failed_on_subscribe: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedSettings {
    pub max_posts: usize,
    pub max_content_chars: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            max_posts: DEFAULT_FEED_LIMIT,
            max_content_chars: DEFAULT_MAX_CONTENT_CHARS,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("CHIRP").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Snapshot(args)) => raw.apply_session_overrides(&args.overrides),
        Some(Command::Demo(args)) => raw.apply_session_overrides(&args.overrides),
        None => raw.apply_session_overrides(&SessionOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    feed: RawFeedSettings,
}

impl RawSettings {
    fn apply_session_overrides(&mut self, overrides: &SessionOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(timeout) = overrides.cache_fetch_timeout_ms {
            self.cache.fetch_timeout_ms = Some(timeout);
        }
        if let Some(retry) = overrides.cache_retry_failed_on_subscribe {
            self.cache.retry_failed_on_subscribe = Some(retry);
        }
        if let Some(max) = overrides.feed_max_posts {
            self.feed.max_posts = Some(max);
        }
        if let Some(max) = overrides.feed_max_content_chars {
            self.feed.max_content_chars = Some(max);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            feed,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let feed = build_feed_settings(feed)?;

        Ok(Self {
            logging,
            cache,
            feed,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let timeout_ms = cache.fetch_timeout_ms.unwrap_or(DEFAULT_FETCH_TIMEOUT_MS);
    if timeout_ms > MAX_FETCH_TIMEOUT_MS {
        return Err(LoadError::invalid(
            "cache.fetch_timeout_ms",
            format!("must be at most {MAX_FETCH_TIMEOUT_MS}"),
        ));
    }
    let fetch_timeout = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms));

    Ok(CacheSettings {
        fetch_timeout,
        retry_failed_on_subscribe: cache.retry_failed_on_subscribe.unwrap_or(true),
    })
}

fn build_feed_settings(feed: RawFeedSettings) -> Result<FeedSettings, LoadError> {
    let defaults = FeedSettings::default();
    let max_posts = match feed.max_posts {
        Some(value) => positive_usize(value, "feed.max_posts")?,
        None => defaults.max_posts,
    };
    let max_content_chars = match feed.max_content_chars {
        Some(value) => positive_usize(value, "feed.max_content_chars")?,
        None => defaults.max_content_chars,
    };

    Ok(FeedSettings {
        max_posts,
        max_content_chars,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    fetch_timeout_ms: Option<u64>,
    retry_failed_on_subscribe: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFeedSettings {
    max_posts: Option<u64>,
    max_content_chars: Option<u64>,
}

fn positive_usize(value: u64, key: &'static str) -> Result<usize, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    usize::try_from(value)
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))
}

#[cfg(test)]
mod tests;
