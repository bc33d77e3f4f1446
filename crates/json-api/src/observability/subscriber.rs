//! Global subscriber for the server binary.
//!
//! Events go to stdout in the configured format. Audit events from the
//! domain (`magiclink::audit`) stay at `info` whatever the base level is, and
//! dependency chatter is held at `warn`.

use opentelemetry::{global, trace::TracerProvider as _};
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace::SdkTracerProvider};
use tracing::error;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

use crate::config::{ServerConfig, observability::LogFormat};

use super::{ObservabilityError, otel, settings};

const QUIET_TARGETS: [&str; 6] = ["sqlx", "reqwest", "hyper", "h2", "tonic", "opentelemetry"];
const AUDIT_TARGET: &str = "magiclink::audit";

/// Handle on the installed pipeline; flushes pending spans on shutdown.
#[derive(Debug)]
pub(crate) struct Observability {
    tracer_provider: Option<SdkTracerProvider>,
}

impl Observability {
    pub(crate) fn init(config: &ServerConfig) -> Result<Self, ObservabilityError> {
        settings::apply_runtime_config(config);

        let tracer_provider = if config.observability.otel_enabled {
            global::set_text_map_propagator(TraceContextPropagator::new());

            Some(otel::build_tracer_provider(config)?)
        } else {
            None
        };

        let otel_layer = tracer_provider.as_ref().map(|provider| {
            tracing_opentelemetry::layer()
                .with_tracer(provider.tracer(config.observability.service_name.clone()))
        });

        tracing_subscriber::registry()
            .with(fmt_layer(config.logging.format(config.runtime.app_env)))
            .with(EnvFilter::try_new(filter_directives(&config.logging.log_level))?)
            .with(otel_layer)
            .try_init()?;

        Ok(Self { tracer_provider })
    }

    pub(crate) fn shutdown(self) {
        if let Some(provider) = self.tracer_provider
            && let Err(source) = provider.shutdown()
        {
            error!("failed to flush spans on shutdown: {source}");
        }
    }
}

fn fmt_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .boxed(),
    }
}

/// The configured level followed by the fixed per-target overrides.
fn filter_directives(level: &str) -> String {
    let mut directives = vec![level.to_string(), format!("{AUDIT_TARGET}=info")];

    directives.extend(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")));
    directives.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_events_survive_a_quiet_base_level() {
        let directives = filter_directives("warn");

        assert!(
            directives.starts_with("warn,magiclink::audit=info,"),
            "unexpected directives {directives}"
        );
        assert!(directives.contains("sqlx=warn"), "sqlx not quieted");
    }

    #[test]
    fn configured_directives_are_kept() {
        assert!(
            EnvFilter::try_new(filter_directives("debug,magiclink_app=trace")).is_ok(),
            "expected a valid filter"
        );
    }

    #[test]
    fn unknown_levels_are_rejected() {
        assert!(
            EnvFilter::try_new(filter_directives("magiclink_app=loudest")).is_err(),
            "expected a directive parse error"
        );
    }
}
