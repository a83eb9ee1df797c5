//! Error-telemetry sink and process-wide tracing/metrics setup. Stands in
//! for `error_reporter_config`: a `NoopReporter` by default, a
//! `TracingReporter` when an operator wants structured logs.

use tracing::error;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::Subscriber;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::MetricsLabel;

/// Identifies where an error happened, for telemetry correlation. Never
/// carries the error's raw backtrace; that stays on stderr only, matching
/// `display_causes_and_backtrace`'s existing split between operator-facing
/// and any would-be user-facing message.
#[derive(Clone, Debug)]
pub struct ErrorContext {
    pub contributor: Option<String>,
    pub list_id: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        ErrorContext {
            contributor: None,
            list_id: None,
        }
    }

    pub fn with_contributor(mut self, contributor: impl Into<String>) -> Self {
        self.contributor = Some(contributor.into());
        self
    }

    pub fn with_list_id(mut self, list_id: impl Into<String>) -> Self {
        self.list_id = Some(list_id.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A sink for unexpected (batch-scoped or upload-time) errors.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, err: &anyhow::Error, context: ErrorContext);
}

/// The default: telemetry is disabled.
pub struct NoopReporter;

impl ErrorReporter for NoopReporter {
    fn report(&self, _err: &anyhow::Error, _context: ErrorContext) {}
}

/// Logs via `tracing::error!` with structured fields. This is the
/// teacher's own logging idiom, not a third-party telemetry integration.
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, err: &anyhow::Error, context: ErrorContext) {
        error!(
            contributor = context.contributor.as_deref().unwrap_or("unknown"),
            list_id = context.list_id.as_deref().unwrap_or("unknown"),
            error = %err,
            "unexpected error in facility-match pipeline",
        );
    }
}

/// Install the `RUST_LOG`-driven tracing subscriber, matching the teacher's
/// `main.rs` setup exactly.
pub fn init_tracing() {
    let filter = EnvFilter::from_default_env();
    Subscriber::builder()
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_env_filter(filter)
        .finish()
        .init();
}

/// Install the Prometheus metrics recorder and apply any global labels the
/// operator configured.
pub fn init_metrics(
    labels: &[MetricsLabel],
) -> Result<metrics_exporter_prometheus::PrometheusHandle, anyhow::Error> {
    let mut builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    for label in labels {
        builder = builder.add_global_label(&label.key, &label.value);
    }
    let handle = builder.install_recorder()?;
    Ok(handle)
}
