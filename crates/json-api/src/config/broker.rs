//! Session Broker Config

use std::time::Duration;

use clap::Args;
use magiclink_app::broker::SupabaseConfig;

/// Supabase auth settings.
#[derive(Debug, Args)]
pub struct BrokerConfig {
    /// Supabase project URL
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: String,

    /// Supabase anon key
    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    pub supabase_anon_key: String,

    /// Upper bound for each broker call, in seconds
    #[arg(long, env = "BROKER_TIMEOUT_SECONDS", default_value_t = 10_u64)]
    pub broker_timeout_seconds: u64,
}

impl BrokerConfig {
    #[must_use]
    pub fn supabase(&self) -> SupabaseConfig {
        SupabaseConfig {
            url: self.supabase_url.clone(),
            anon_key: self.supabase_anon_key.clone(),
            timeout: Duration::from_secs(self.broker_timeout_seconds),
        }
    }
}
