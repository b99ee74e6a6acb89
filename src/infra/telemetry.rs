use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr; stdout is reserved for command output such as encoded
/// snapshots.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "chirp_query_cache_hit_total",
            Unit::Count,
            "Total number of reads served from a fresh cache entry."
        );
        describe_counter!(
            "chirp_query_cache_miss_total",
            Unit::Count,
            "Total number of reads that started a load."
        );
        describe_counter!(
            "chirp_query_dedup_total",
            Unit::Count,
            "Total number of reads that joined a load already in flight."
        );
        describe_counter!(
            "chirp_query_fetch_total",
            Unit::Count,
            "Total number of completed loads, labelled by outcome."
        );
        describe_histogram!(
            "chirp_query_fetch_ms",
            Unit::Milliseconds,
            "Loader latency in milliseconds."
        );
        describe_counter!(
            "chirp_query_invalidate_total",
            Unit::Count,
            "Total number of invalidations, labelled by action taken."
        );
        describe_counter!(
            "chirp_hydration_seed_total",
            Unit::Count,
            "Total number of hydrated entries, labelled by seed outcome."
        );
        describe_counter!(
            "chirp_mutation_total",
            Unit::Count,
            "Total number of mutations, labelled by outcome."
        );
    });
}
