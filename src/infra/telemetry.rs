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
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "vellum_cache_hit_total",
            Unit::Count,
            "Local cache hits, labelled by tier."
        );
        describe_counter!(
            "vellum_cache_miss_total",
            Unit::Count,
            "Local cache misses (absent or expired), labelled by tier."
        );
        describe_counter!(
            "vellum_cache_evict_total",
            Unit::Count,
            "Local cache evictions due to capacity, labelled by tier."
        );
        describe_histogram!(
            "vellum_reload_ms",
            Unit::Milliseconds,
            "Duration of a full collection reload pass in milliseconds."
        );
        describe_counter!(
            "vellum_orphans_deleted_total",
            Unit::Count,
            "Persisted content nodes deleted because no source file maps to them."
        );
        describe_counter!(
            "vellum_schema_parse_failures_total",
            Unit::Count,
            "Schema files that could not be evaluated."
        );
    });
}
