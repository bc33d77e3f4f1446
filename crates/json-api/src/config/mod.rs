//! Server configuration module

use clap::Parser;

use crate::config::{
    broker::BrokerConfig,
    database::DatabaseConfig,
    limits::{RateLimitConfig, TokenConfig},
    observability::{LoggingConfig, ObservabilityConfig},
    runtime::RuntimeConfig,
    server::ServerRuntimeConfig,
};

pub(crate) mod broker;
pub(crate) mod database;
pub(crate) mod limits;
pub(crate) mod observability;
pub(crate) mod runtime;
pub(crate) mod server;

/// Magic link JSON API server configuration
#[derive(Debug, Parser)]
#[command(name = "magiclink-json", about = "Magic link JSON API Server", long_about = None)]
pub struct ServerConfig {
    /// Server network settings.
    #[command(flatten)]
    pub server: ServerRuntimeConfig,

    /// Logging output settings.
    #[command(flatten)]
    pub logging: LoggingConfig,

    /// Observability (traces/metrics) settings.
    #[command(flatten)]
    pub observability: ObservabilityConfig,

    /// Token store settings.
    #[command(flatten)]
    pub database: DatabaseConfig,

    /// Session broker settings.
    #[command(flatten)]
    pub broker: BrokerConfig,

    /// Per-dimension rate limits.
    #[command(flatten)]
    pub rate_limits: RateLimitConfig,

    /// Token lifetime and store timeouts.
    #[command(flatten)]
    pub tokens: TokenConfig,

    /// Deployment environment settings.
    #[command(flatten)]
    pub runtime: RuntimeConfig,
}

impl ServerConfig {
    /// Load configuration from environment and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed or the runtime
    /// settings conflict
    pub fn load() -> Result<Self, clap::Error> {
        // Load .env file if present (ignore if missing)
        _ = dotenvy::dotenv();

        Self::try_parse()?.validated()
    }

    fn validated(self) -> Result<Self, clap::Error> {
        self.runtime.validate()?;

        Ok(self)
    }

    /// Get the socket address for binding
    #[must_use]
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        self.server.socket_addr()
    }

    /// Service-level settings derived from the flattened groups.
    #[must_use]
    pub fn app_settings(&self) -> magiclink_app::context::AppSettings {
        magiclink_app::context::AppSettings {
            rate_limits: self.rate_limits.policy(),
            degradation: self.runtime.degradation_policy(),
            tokens: self.tokens.settings(),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;
    use magiclink_app::domain::rate_limits::records::{DegradationPolicy, RateLimitPolicy};
    use testresult::TestResult;

    use super::*;
    use crate::config::observability::LogFormat;

    const REQUIRED: [&str; 5] = [
        "magiclink-json",
        "--supabase-url",
        "https://project.supabase.co",
        "--supabase-anon-key",
        "anon",
    ];

    #[test]
    fn defaults_match_the_documented_policy() -> TestResult {
        let config = ServerConfig::try_parse_from(REQUIRED)?;
        let settings = config.app_settings();

        assert_eq!(settings.rate_limits, RateLimitPolicy::default());
        assert_eq!(settings.degradation, DegradationPolicy::FailOpen);
        assert_eq!(settings.tokens.ttl_minutes, 15);
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8787");
        assert_eq!(
            config.logging.format(config.runtime.app_env),
            LogFormat::Compact
        );

        Ok(())
    }

    #[test]
    fn production_logs_json_unless_told_otherwise() -> TestResult {
        let production = parse(["--app-env", "production"])?;
        let compact = parse(["--app-env", "production", "--log-format", "compact"])?;

        assert_eq!(
            production.logging.format(production.runtime.app_env),
            LogFormat::Json
        );
        assert_eq!(
            compact.logging.format(compact.runtime.app_env),
            LogFormat::Compact
        );

        Ok(())
    }

    #[test]
    fn sample_ratio_must_be_a_probability() -> TestResult {
        let half = parse(["--trace-sample-ratio", "0.5"])?;

        assert!((half.observability.trace_sample_ratio - 0.5).abs() < f64::EPSILON);
        assert!(parse(["--trace-sample-ratio", "1.5"]).is_err(), "1.5 accepted");
        assert!(parse(["--trace-sample-ratio", "NaN"]).is_err(), "NaN accepted");

        Ok(())
    }

    #[test]
    fn host_must_be_an_ip_address() {
        assert!(
            parse(["--host", "localhost:80"]).is_err(),
            "expected a host parse error"
        );
    }

    fn parse(extra: impl IntoIterator<Item = &'static str>) -> Result<ServerConfig, clap::Error> {
        ServerConfig::try_parse_from(REQUIRED.into_iter().chain(extra))?.validated()
    }

    #[test]
    fn production_fails_closed_by_default() -> TestResult {
        let production = parse(["--app-env", "production"])?;

        assert_eq!(
            production.app_settings().degradation,
            DegradationPolicy::FailClosed
        );

        Ok(())
    }

    #[test]
    fn production_rejects_a_fail_open_override() {
        let result = parse([
            "--app-env",
            "production",
            "--degradation-policy",
            "fail-open",
        ]);

        assert!(
            matches!(result, Err(ref error) if error.kind() == ErrorKind::ArgumentConflict),
            "expected an argument conflict"
        );
    }

    #[test]
    fn production_never_resolves_to_fail_open() -> TestResult {
        let unvalidated = ServerConfig::try_parse_from(REQUIRED.into_iter().chain([
            "--app-env",
            "production",
            "--degradation-policy",
            "fail-open",
        ]))?;

        assert_eq!(
            unvalidated.app_settings().degradation,
            DegradationPolicy::FailClosed
        );

        Ok(())
    }

    #[test]
    fn development_can_tighten_to_fail_closed() -> TestResult {
        let tightened = parse(["--degradation-policy", "fail-closed"])?;

        assert_eq!(
            tightened.app_settings().degradation,
            DegradationPolicy::FailClosed
        );

        Ok(())
    }

    #[test]
    fn unknown_degradation_policy_is_rejected() {
        let result = ServerConfig::try_parse_from(
            REQUIRED
                .into_iter()
                .chain(["--degradation-policy", "sometimes"]),
        );

        assert!(result.is_err(), "expected a parse error");
    }
}
