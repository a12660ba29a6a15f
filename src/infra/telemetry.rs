use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
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
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
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
            "folio_cache_hits_total",
            Unit::Count,
            "Total number of cache lookups served from a stored entry."
        );
        describe_counter!(
            "folio_cache_misses_total",
            Unit::Count,
            "Total number of cache lookups that ran the computation."
        );
        describe_counter!(
            "folio_cache_stale_discards_total",
            Unit::Count,
            "Computed values not stored because an invalidation happened meanwhile."
        );
        describe_counter!(
            "folio_cache_invalidations_total",
            Unit::Count,
            "Total number of published invalidation events, by scope."
        );
        describe_counter!(
            "folio_cache_evictions_total",
            Unit::Count,
            "Total number of entries evicted by invalidation."
        );
        describe_gauge!(
            "folio_cache_entries",
            Unit::Count,
            "Current number of stored cache entries."
        );
        describe_histogram!(
            "folio_cache_compute_ms",
            Unit::Milliseconds,
            "Latency of cache-miss computations in milliseconds."
        );
        describe_histogram!(
            "folio_cache_consume_ms",
            Unit::Milliseconds,
            "Cache event consumption latency in milliseconds."
        );
        describe_histogram!(
            "folio_store_fetch_ms",
            Unit::Milliseconds,
            "Latency of a full paginated document store fetch, by kind."
        );
        describe_counter!(
            "folio_store_errors_total",
            Unit::Count,
            "Total number of failed document store fetches, by kind."
        );
        describe_counter!(
            "folio_http_responses_total",
            Unit::Count,
            "Total number of HTTP responses served, by status class."
        );
        describe_counter!(
            "folio_store_requests_total",
            Unit::Count,
            "Total number of HTTP requests sent to the document store, by operation."
        );
    });
}
