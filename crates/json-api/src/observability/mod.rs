//! Logging, trace export, access logs and Prometheus metrics.

use thiserror::Error;

mod metrics;
mod otel;
mod request;
mod settings;
mod subscriber;

pub(crate) use metrics::metrics_handler;
pub(crate) use request::{record_magic_link_outcome, request_logging};
pub(crate) use subscriber::Observability;

#[derive(Debug, Error)]
pub(crate) enum ObservabilityError {
    #[error("failed to build OTLP exporter: {0}")]
    OtlpExporter(#[from] opentelemetry_otlp::ExporterBuildError),

    #[error("invalid log filter: {0}")]
    LogFilter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to install tracing subscriber: {0}")]
    TracingSubscriber(#[from] tracing_subscriber::util::TryInitError),
}
