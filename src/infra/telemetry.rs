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

/// Register metric descriptions with the installed recorder; runs once per process.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "edgepurge_decisions_total",
            Unit::Count,
            "Cache decisions made for responses, labelled by cacheability."
        );
        describe_counter!(
            "edgepurge_purge_requests_total",
            Unit::Count,
            "Purge dispatches, labelled by delivery mode."
        );
        describe_counter!(
            "edgepurge_backend_failures_total",
            Unit::Count,
            "Purge calls rejected or lost by the edge backend."
        );
        describe_gauge!(
            "edgepurge_queue_len",
            Unit::Count,
            "Items waiting in a site's purge queue."
        );
        describe_histogram!(
            "edgepurge_drain_ms",
            Unit::Milliseconds,
            "Queue drain latency in milliseconds."
        );
    });
}
