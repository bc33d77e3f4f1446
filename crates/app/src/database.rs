//! Database connection management

use std::time::Duration;

use sqlx::{PgPool, postgres::PgPoolOptions, query_scalar};

/// Tables the token store depends on.
pub const TOKEN_TABLES: [&str; 3] = ["auth_tokens", "browser_sessions", "verification_codes"];

const TABLE_EXISTS_SQL: &str = "SELECT to_regclass($1) IS NOT NULL";

/// Connect to `PostgreSQL`.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// Apply the bundled schema migrations.
///
/// # Errors
///
/// Returns an error if a migration fails to apply.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}

/// Report whether `table` exists in the connected database.
pub(crate) async fn table_exists(pool: &PgPool, table: &str) -> Result<bool, sqlx::Error> {
    query_scalar::<_, bool>(TABLE_EXISTS_SQL)
        .bind(format!("public.{table}"))
        .fetch_one(pool)
        .await
}
