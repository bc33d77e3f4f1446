//! Runtime Environment Config

use clap::{Args, ValueEnum, error::ErrorKind};
use magiclink_app::domain::rate_limits::records::DegradationPolicy;

/// Deployment environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum AppEnv {
    /// Local development: fail-open, debug endpoint and verbose errors.
    Development,

    /// Production: fail-closed, no introspection.
    Production,
}

impl AppEnv {
    #[must_use]
    pub fn is_production(self) -> bool {
        self == Self::Production
    }

    /// Name reported as the trace `deployment.environment.name`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

/// Environment-dependent behaviour.
#[derive(Debug, Args)]
pub struct RuntimeConfig {
    /// Deployment environment (development, production)
    #[arg(long, env = "APP_ENV", value_enum, default_value_t = AppEnv::Development)]
    pub app_env: AppEnv,

    /// Behaviour when the token store fails (fail-open, fail-closed).
    /// Production only accepts fail-closed.
    #[arg(long, env = "DEGRADATION_POLICY")]
    pub degradation_policy: Option<DegradationPolicy>,

    /// Public site URL used for sign-in redirects
    #[arg(long, env = "SITE_URL", default_value = "http://localhost:3000")]
    pub site_url: String,
}

impl RuntimeConfig {
    /// Rejects an override that would loosen the production policy.
    ///
    /// # Errors
    ///
    /// Returns an argument conflict when production is asked to fail open
    pub fn validate(&self) -> Result<(), clap::Error> {
        if self.app_env.is_production()
            && self.degradation_policy == Some(DegradationPolicy::FailOpen)
        {
            return Err(clap::Error::raw(
                ErrorKind::ArgumentConflict,
                "DEGRADATION_POLICY=fail-open is not allowed when APP_ENV=production\n",
            ));
        }

        Ok(())
    }

    /// The environment's default, tightened by an explicit fail-closed.
    ///
    /// Production always fails closed.
    #[must_use]
    pub fn degradation_policy(&self) -> DegradationPolicy {
        if self.app_env.is_production() {
            return DegradationPolicy::FailClosed;
        }

        self.degradation_policy.unwrap_or(DegradationPolicy::FailOpen)
    }
}
