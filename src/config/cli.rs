use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the chirp binary.
#[derive(Debug, Parser)]
#[command(name = "chirp", version, about = "Chirp page session toolkit")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CHIRP_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the hydration snapshot embedded in the page for a route.
    Snapshot(SnapshotArgs),
    /// Run a scripted page session against seeded in-memory data.
    Demo(DemoArgs),
}

#[derive(Debug, Args, Clone)]
pub struct SnapshotArgs {
    #[command(flatten)]
    pub overrides: SessionOverrides,

    /// Page path, e.g. `/@alice`.
    #[arg(value_name = "PATH")]
    pub path: String,
}

#[derive(Debug, Args, Clone)]
pub struct DemoArgs {
    #[command(flatten)]
    pub overrides: SessionOverrides,

    /// Profile page the session opens on.
    #[arg(long, default_value = "/@alice", value_name = "PATH")]
    pub path: String,

    /// Content of the post submitted during the session.
    #[arg(long, default_value = "hello from chirp", value_name = "TEXT")]
    pub message: String,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            overrides: SessionOverrides::default(),
            path: "/@alice".to_string(),
            message: "hello from chirp".to_string(),
        }
    }
}

#[derive(Debug, Args, Default, Clone)]
pub struct SessionOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the loader timeout in milliseconds; `0` disables it.
    #[arg(long = "cache-fetch-timeout-ms", value_name = "MILLIS")]
    pub cache_fetch_timeout_ms: Option<u64>,

    /// Toggle retrying reads that failed with a transport error.
    #[arg(
        long = "cache-retry-failed-on-subscribe",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_retry_failed_on_subscribe: Option<bool>,

    /// Override the number of posts returned by the feed.
    #[arg(long = "feed-max-posts", value_name = "COUNT")]
    pub feed_max_posts: Option<u64>,

    /// Override the maximum post length in characters.
    #[arg(long = "feed-max-content-chars", value_name = "COUNT")]
    pub feed_max_content_chars: Option<u64>,
}
