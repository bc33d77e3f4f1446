use std::{sync::Arc, time::Duration};

use clap::Args;
use magiclink_app::{
    clock::SystemClock,
    database,
    domain::{
        maintenance::StoreMaintenanceService,
        rate_limits::{
            StoreRateLimitService,
            records::{DegradationPolicy, RateLimitPolicy},
        },
        tokens::{StoreTokensService, TokenSettings, store::PgTokenStore},
    },
};

#[derive(Debug, Args)]
pub(crate) struct StoreArgs {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    /// Upper bound for each store call, in seconds
    #[arg(long, env = "STORE_TIMEOUT_SECS", default_value_t = 5)]
    store_timeout_secs: u64,
}

pub(crate) struct Services {
    pub(crate) tokens: Arc<StoreTokensService>,
    pub(crate) maintenance: StoreMaintenanceService,
}

impl StoreArgs {
    pub(crate) async fn services(&self) -> Result<Services, String> {
        let pool = database::connect(&self.database_url)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;

        let store = Arc::new(PgTokenStore::new(pool));
        let clock = Arc::new(SystemClock);
        let store_timeout = Duration::from_secs(self.store_timeout_secs);

        let rate_limits = Arc::new(StoreRateLimitService::new(
            store.clone(),
            clock.clone(),
            RateLimitPolicy::default(),
            DegradationPolicy::FailClosed,
            store_timeout,
        ));

        let tokens = Arc::new(StoreTokensService::new(
            store.clone(),
            clock.clone(),
            TokenSettings {
                store_timeout,
                ..TokenSettings::default()
            },
        ));

        Ok(Services {
            maintenance: StoreMaintenanceService::new(
                store,
                tokens.clone(),
                rate_limits,
                clock,
                store_timeout,
            ),
            tokens,
        })
    }
}
