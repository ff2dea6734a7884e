use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

static METRIC_DESCRIPTIONS: Once = Once::new();

#[derive(Debug, Error)]
#[error("telemetry initialization failed: {0}")]
pub struct TelemetryError(String);

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), TelemetryError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(logging.level).into())
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
        .map_err(|err| TelemetryError(format!("failed to install tracing subscriber: {err}")))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "rinfresco_refresh_processed_total",
            Unit::Count,
            "Total number of identifiers refreshed and recorded complete."
        );
        describe_counter!(
            "rinfresco_refresh_skipped_total",
            Unit::Count,
            "Total number of identifiers skipped because a prior run completed them."
        );
        describe_counter!(
            "rinfresco_refresh_failed_total",
            Unit::Count,
            "Total number of identifiers abandoned for this run after exhausting retries."
        );
        describe_counter!(
            "rinfresco_backoff_engaged_total",
            Unit::Count,
            "Total number of pool-wide backoff pauses, labelled by pause kind."
        );
        describe_histogram!(
            "rinfresco_refresh_item_ms",
            Unit::Milliseconds,
            "Per-identifier refresh latency in milliseconds."
        );
        describe_histogram!(
            "rinfresco_refresh_batch_ms",
            Unit::Milliseconds,
            "Wall time per reported batch of successes in milliseconds."
        );
        describe_histogram!(
            "rinfresco_index_fetch_ms",
            Unit::Milliseconds,
            "Index page-fetch latency in milliseconds."
        );
        describe_gauge!(
            "rinfresco_id_buffer_len",
            Unit::Count,
            "Identifiers currently buffered and awaiting dispatch."
        );
    });
}
