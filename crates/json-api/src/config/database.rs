//! Token Store Config

use clap::{Args, ValueEnum};

/// Backing implementation of the token store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// `PostgreSQL`, the durable store.
    Postgres,

    /// Process-local store for development; counts reset on restart.
    Memory,
}

/// Token store settings.
#[derive(Debug, Args)]
pub struct DatabaseConfig {
    /// Token store backend (postgres, memory)
    #[arg(long, env = "TOKEN_STORE", value_enum, default_value_t = StoreKind::Postgres)]
    pub token_store: StoreKind,

    /// `PostgreSQL` connection string, required for the postgres store
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,
}
