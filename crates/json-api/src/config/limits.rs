//! Rate Limit & Token Config

use std::time::Duration;

use clap::Args;
use magiclink_app::domain::{
    rate_limits::records::{DimensionLimit, RateLimitPolicy},
    tokens::TokenSettings,
};

/// Sliding-window limits per dimension.
#[derive(Debug, Args)]
pub struct RateLimitConfig {
    /// Window for requests per email address, in minutes
    #[arg(long, env = "RATE_LIMIT_EMAIL_WINDOW_MINUTES", default_value_t = 15)]
    pub email_window_minutes: u32,

    /// Requests allowed per email address within the window
    #[arg(long, env = "RATE_LIMIT_EMAIL_MAX_ATTEMPTS", default_value_t = 3)]
    pub email_max_attempts: u32,

    /// Window for requests per IP address, in minutes
    #[arg(long, env = "RATE_LIMIT_IP_WINDOW_MINUTES", default_value_t = 60)]
    pub ip_window_minutes: u32,

    /// Requests allowed per IP address within the window
    #[arg(long, env = "RATE_LIMIT_IP_MAX_ATTEMPTS", default_value_t = 10)]
    pub ip_max_attempts: u32,

    /// Window for requests per browser fingerprint, in minutes
    #[arg(long, env = "RATE_LIMIT_FINGERPRINT_WINDOW_MINUTES", default_value_t = 30)]
    pub fingerprint_window_minutes: u32,

    /// Requests allowed per browser fingerprint within the window
    #[arg(long, env = "RATE_LIMIT_FINGERPRINT_MAX_ATTEMPTS", default_value_t = 5)]
    pub fingerprint_max_attempts: u32,
}

impl RateLimitConfig {
    #[must_use]
    pub fn policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            email: DimensionLimit::new(self.email_window_minutes, self.email_max_attempts),
            ip_address: DimensionLimit::new(self.ip_window_minutes, self.ip_max_attempts),
            browser_fingerprint: DimensionLimit::new(
                self.fingerprint_window_minutes,
                self.fingerprint_max_attempts,
            ),
        }
    }
}

/// Token lifetime and store call bounds.
#[derive(Debug, Args)]
pub struct TokenConfig {
    /// Lifetime of issued tokens, in minutes
    #[arg(long, env = "TOKEN_TTL_MINUTES", default_value_t = 15)]
    pub token_ttl_minutes: u32,

    /// Upper bound for each store call, in milliseconds
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value_t = 5_000_u64)]
    pub store_timeout_ms: u64,
}

impl TokenConfig {
    #[must_use]
    pub fn settings(&self) -> TokenSettings {
        TokenSettings {
            ttl_minutes: self.token_ttl_minutes,
            store_timeout: Duration::from_millis(self.store_timeout_ms),
        }
    }
}
