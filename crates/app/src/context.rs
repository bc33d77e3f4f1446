//! App Context

use std::{sync::Arc, time::Duration};

use thiserror::Error;

use crate::{
    broker::SessionBroker,
    clock::{Clock, SystemClock},
    database,
    domain::{
        magic_links::{DefaultMagicLinkService, MagicLinkService},
        maintenance::{MaintenanceService, StoreMaintenanceService},
        rate_limits::{
            RateLimitService, StoreRateLimitService,
            records::{DegradationPolicy, RateLimitPolicy},
        },
        tokens::{
            StoreTokensService, TokenSettings, TokensService,
            store::{MemoryTokenStore, PgTokenStore, TokenStore},
        },
    },
};

#[derive(Debug, Error)]
pub enum AppInitError {
    #[error("failed to connect to database")]
    Database(#[source] sqlx::Error),

    #[error("failed to apply database migrations")]
    Migration(#[source] sqlx::migrate::MigrateError),

    #[error("DATABASE_URL is required for the postgres token store")]
    MissingDatabaseUrl,
}

/// Tunables shared by every service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppSettings {
    pub rate_limits: RateLimitPolicy,
    pub degradation: DegradationPolicy,
    pub tokens: TokenSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            rate_limits: RateLimitPolicy::default(),
            degradation: DegradationPolicy::FailClosed,
            tokens: TokenSettings::default(),
        }
    }
}

impl AppSettings {
    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        self.tokens.store_timeout
    }
}

#[derive(Clone)]
pub struct AppContext {
    pub tokens: Arc<dyn TokensService>,
    pub rate_limits: Arc<dyn RateLimitService>,
    pub magic_links: Arc<dyn MagicLinkService>,
    pub maintenance: Arc<dyn MaintenanceService>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext").finish_non_exhaustive()
    }
}

impl AppContext {
    /// Build application context from a database URL, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error when connecting or migrating fails.
    pub async fn from_database_url(
        url: &str,
        settings: AppSettings,
        broker: Arc<dyn SessionBroker>,
    ) -> Result<Self, AppInitError> {
        let pool = database::connect(url)
            .await
            .map_err(AppInitError::Database)?;

        database::migrate(&pool)
            .await
            .map_err(AppInitError::Migration)?;

        Ok(Self::with_store(
            Arc::new(PgTokenStore::new(pool)),
            Arc::new(SystemClock),
            settings,
            broker,
        ))
    }

    /// Build application context over a process-local store.
    #[must_use]
    pub fn in_memory(settings: AppSettings, broker: Arc<dyn SessionBroker>) -> Self {
        Self::with_store(
            Arc::new(MemoryTokenStore::new()),
            Arc::new(SystemClock),
            settings,
            broker,
        )
    }

    #[must_use]
    pub fn with_store(
        store: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
        settings: AppSettings,
        broker: Arc<dyn SessionBroker>,
    ) -> Self {
        let tokens = Arc::new(StoreTokensService::new(
            store.clone(),
            clock.clone(),
            settings.tokens,
        ));

        let rate_limits = Arc::new(StoreRateLimitService::new(
            store.clone(),
            clock.clone(),
            settings.rate_limits,
            settings.degradation,
            settings.store_timeout(),
        ));

        let maintenance = Arc::new(StoreMaintenanceService::new(
            store,
            tokens.clone(),
            rate_limits.clone(),
            clock.clone(),
            settings.store_timeout(),
        ));

        let magic_links = Arc::new(DefaultMagicLinkService::new(
            rate_limits.clone(),
            tokens.clone(),
            broker,
            clock,
        ));

        Self {
            tokens,
            rate_limits,
            magic_links,
            maintenance,
        }
    }
}
