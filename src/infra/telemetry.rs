use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter,
    filter::Directive,
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Targets that flood the log at `info` while a browser is driven.
const QUIET_TARGETS: &[&str] = &[
    "chromiumoxide::conn=warn",
    "chromiumoxide::handler=warn",
    "sqlx::query=warn",
];

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr; stdout is reserved for command output.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

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
        .with(env_filter(logging))
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// `RUST_LOG` wins over the configured level and the quiet targets.
fn env_filter(logging: &LoggingSettings) -> EnvFilter {
    let filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return filter;
    }

    QUIET_TARGETS
        .iter()
        .filter_map(|directive| directive.parse::<Directive>().ok())
        .fold(filter, EnvFilter::add_directive)
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "postergen_render_attempts_total",
            Unit::Count,
            "Total number of render attempts started."
        );
        describe_histogram!(
            "postergen_render_attempt_ms",
            Unit::Milliseconds,
            "Render attempt latency in milliseconds, timeouts included."
        );
        describe_counter!(
            "postergen_render_outcomes_total",
            Unit::Count,
            "Finished render jobs by outcome (rendered, canceled, exhausted)."
        );
        describe_counter!(
            "postergen_cancellations_total",
            Unit::Count,
            "Cancellations by the path that reached the job (queue, bus, worker)."
        );
        describe_counter!(
            "postergen_browser_launches_total",
            Unit::Count,
            "Total number of browser processes launched."
        );
    });
}
