//! `PostgreSQL` token store.

use async_trait::async_trait;
use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use serde_json::Value;
use sqlx::{
    FromRow, PgPool, Postgres, Row, postgres::PgRow, query, query_as, query_scalar, types::Json,
};
use tracing::debug;

use crate::{
    database::{self, TOKEN_TABLES},
    domain::{
        rate_limits::records::Dimension,
        tokens::{
            data::{BrowserSessionTouch, NewAuthToken},
            errors::TokenStoreError,
            records::{
                AuthToken, AuthTokenUuid, BrowserSession, BrowserSessionUuid, KeyCount,
                StoreHealth, TableStatus, TokenType, VerificationCodeUuid, WindowAttempts,
            },
            store::{TokenStore, VolumeKey},
        },
    },
};

const INSERT_TOKEN_SQL: &str = include_str!("sql/insert_token.sql");
const INSERT_VERIFICATION_CODE_SQL: &str = include_str!("sql/insert_verification_code.sql");
const FIND_TOKEN_SQL: &str = include_str!("sql/find_token.sql");
const MARK_USED_SQL: &str = include_str!("sql/mark_used.sql");
const COUNT_ACTIVE_SQL: &str = include_str!("sql/count_active.sql");
const COUNT_ACTIVE_ALL_SQL: &str = include_str!("sql/count_active_all.sql");
const INVALIDATE_ALL_SQL: &str = include_str!("sql/invalidate_all.sql");
const WINDOW_ATTEMPTS_EMAIL_SQL: &str = include_str!("sql/window_attempts_email.sql");
const WINDOW_ATTEMPTS_IP_SQL: &str = include_str!("sql/window_attempts_ip.sql");
const WINDOW_ATTEMPTS_FINGERPRINT_SQL: &str = include_str!("sql/window_attempts_fingerprint.sql");
const COUNT_CREATED_SINCE_SQL: &str = include_str!("sql/count_created_since.sql");
const BUSIEST_EMAILS_SQL: &str = include_str!("sql/busiest_emails.sql");
const BUSIEST_IPS_SQL: &str = include_str!("sql/busiest_ips.sql");
const SHARED_FINGERPRINTS_SQL: &str = include_str!("sql/shared_fingerprints.sql");
const LIST_FOR_EMAIL_SQL: &str = include_str!("sql/list_for_email.sql");
const DELETE_EXPIRED_SQL: &str = include_str!("sql/delete_expired.sql");
const DELETE_USED_SQL: &str = include_str!("sql/delete_used.sql");
const TOUCH_BROWSER_SESSION_SQL: &str = include_str!("sql/touch_browser_session.sql");
const LIST_SESSIONS_SQL: &str = include_str!("sql/list_sessions.sql");
const DELETE_INACTIVE_SESSIONS_SQL: &str = include_str!("sql/delete_inactive_sessions.sql");
const DELETE_USED_CODES_SQL: &str = include_str!("sql/delete_used_codes.sql");
const SAMPLE_COUNT_SQL: &str = "SELECT count(*) FROM auth_tokens";

#[derive(Debug, Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    #[tracing::instrument(
        name = "tokens.store.insert_token",
        skip(self, token),
        fields(token_type = %token.token_type),
        err
    )]
    async fn insert_token(&self, token: NewAuthToken) -> Result<AuthToken, TokenStoreError> {
        let mut tx = self.pool.begin().await?;

        let created = query_as::<Postgres, AuthToken>(INSERT_TOKEN_SQL)
            .bind(token.id.into_uuid())
            .bind(&token.email)
            .bind(&token.token_hash)
            .bind(token.token_type.as_str())
            .bind(SqlxTimestamp::from(token.expires_at))
            .bind(token.context.user_agent.as_deref())
            .bind(token.context.ip_address.as_deref())
            .bind(token.context.browser_fingerprint.as_deref())
            .bind(Json(&token.metadata))
            .bind(SqlxTimestamp::from(token.created_at))
            .fetch_one(&mut *tx)
            .await?;

        if token.token_type == TokenType::VerificationCode {
            query(INSERT_VERIFICATION_CODE_SQL)
                .bind(VerificationCodeUuid::new().into_uuid())
                .bind(&token.email)
                .bind(&token.token_hash)
                .bind(SqlxTimestamp::from(token.expires_at))
                .bind(token.id.into_uuid())
                .bind(SqlxTimestamp::from(token.created_at))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(created)
    }

    async fn find_token(
        &self,
        email: &str,
        token_hash: &str,
        token_type: TokenType,
    ) -> Result<Option<AuthToken>, TokenStoreError> {
        let token = query_as::<Postgres, AuthToken>(FIND_TOKEN_SQL)
            .bind(email)
            .bind(token_hash)
            .bind(token_type.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(token)
    }

    #[tracing::instrument(name = "tokens.store.mark_used", skip(self), err)]
    async fn mark_used(
        &self,
        token: AuthTokenUuid,
        at: Timestamp,
    ) -> Result<bool, TokenStoreError> {
        let updated: i64 = query_scalar(MARK_USED_SQL)
            .bind(token.into_uuid())
            .bind(SqlxTimestamp::from(at))
            .fetch_one(&self.pool)
            .await?;

        Ok(updated > 0)
    }

    async fn count_active(
        &self,
        email: &str,
        token_type: Option<TokenType>,
        now: Timestamp,
    ) -> Result<u64, TokenStoreError> {
        let count: i64 = query_scalar(COUNT_ACTIVE_SQL)
            .bind(email)
            .bind(token_type.map(TokenType::as_str))
            .bind(SqlxTimestamp::from(now))
            .fetch_one(&self.pool)
            .await?;

        to_count(count)
    }

    async fn count_active_all(&self, now: Timestamp) -> Result<u64, TokenStoreError> {
        let count: i64 = query_scalar(COUNT_ACTIVE_ALL_SQL)
            .bind(SqlxTimestamp::from(now))
            .fetch_one(&self.pool)
            .await?;

        to_count(count)
    }

    #[tracing::instrument(name = "tokens.store.invalidate_all", skip(self, email), err)]
    async fn invalidate_all(&self, email: &str, at: Timestamp) -> Result<u64, TokenStoreError> {
        let count: i64 = query_scalar(INVALIDATE_ALL_SQL)
            .bind(email)
            .bind(SqlxTimestamp::from(at))
            .fetch_one(&self.pool)
            .await?;

        to_count(count)
    }

    #[tracing::instrument(
        name = "tokens.store.window_attempts",
        skip(self, key),
        fields(dimension = %dimension),
        err
    )]
    async fn window_attempts(
        &self,
        dimension: Dimension,
        key: &str,
        since: Timestamp,
    ) -> Result<WindowAttempts, TokenStoreError> {
        let sql = match dimension {
            Dimension::Email => WINDOW_ATTEMPTS_EMAIL_SQL,
            Dimension::IpAddress => WINDOW_ATTEMPTS_IP_SQL,
            Dimension::BrowserFingerprint => WINDOW_ATTEMPTS_FINGERPRINT_SQL,
        };

        let (count, oldest): (i64, Option<SqlxTimestamp>) = query_as(sql)
            .bind(key)
            .bind(SqlxTimestamp::from(since))
            .fetch_one(&self.pool)
            .await?;

        debug!(count, "counted window attempts");

        Ok(WindowAttempts {
            count: to_count(count)?,
            oldest: oldest.map(SqlxTimestamp::to_jiff),
        })
    }

    async fn count_created_since(&self, since: Timestamp) -> Result<u64, TokenStoreError> {
        let count: i64 = query_scalar(COUNT_CREATED_SINCE_SQL)
            .bind(SqlxTimestamp::from(since))
            .fetch_one(&self.pool)
            .await?;

        to_count(count)
    }

    async fn busiest(
        &self,
        key: VolumeKey,
        since: Timestamp,
        min_attempts: u64,
    ) -> Result<Vec<KeyCount>, TokenStoreError> {
        let sql = match key {
            VolumeKey::Email => BUSIEST_EMAILS_SQL,
            VolumeKey::IpAddress => BUSIEST_IPS_SQL,
        };

        key_counts(&self.pool, sql, since, min_attempts).await
    }

    async fn shared_fingerprints(
        &self,
        since: Timestamp,
        min_emails: u64,
    ) -> Result<Vec<KeyCount>, TokenStoreError> {
        key_counts(&self.pool, SHARED_FINGERPRINTS_SQL, since, min_emails).await
    }

    async fn list_for_email(
        &self,
        email: &str,
        since: Timestamp,
    ) -> Result<Vec<AuthToken>, TokenStoreError> {
        let tokens = query_as::<Postgres, AuthToken>(LIST_FOR_EMAIL_SQL)
            .bind(email)
            .bind(SqlxTimestamp::from(since))
            .fetch_all(&self.pool)
            .await?;

        Ok(tokens)
    }

    async fn delete_expired_before(&self, cutoff: Timestamp) -> Result<u64, TokenStoreError> {
        delete_before(&self.pool, DELETE_EXPIRED_SQL, cutoff).await
    }

    async fn delete_used_before(&self, cutoff: Timestamp) -> Result<u64, TokenStoreError> {
        delete_before(&self.pool, DELETE_USED_SQL, cutoff).await
    }

    async fn touch_browser_session(
        &self,
        touch: BrowserSessionTouch,
    ) -> Result<BrowserSession, TokenStoreError> {
        let session = query_as::<Postgres, BrowserSession>(TOUCH_BROWSER_SESSION_SQL)
            .bind(BrowserSessionUuid::new().into_uuid())
            .bind(&touch.email)
            .bind(&touch.browser_fingerprint)
            .bind(touch.user_agent.as_deref())
            .bind(touch.ip_address.as_deref())
            .bind(SqlxTimestamp::from(touch.at))
            .fetch_one(&self.pool)
            .await?;

        Ok(session)
    }

    async fn list_sessions_for_email(
        &self,
        email: &str,
        since: Timestamp,
    ) -> Result<Vec<BrowserSession>, TokenStoreError> {
        let sessions = query_as::<Postgres, BrowserSession>(LIST_SESSIONS_SQL)
            .bind(email)
            .bind(SqlxTimestamp::from(since))
            .fetch_all(&self.pool)
            .await?;

        Ok(sessions)
    }

    async fn delete_inactive_sessions(&self, cutoff: Timestamp) -> Result<u64, TokenStoreError> {
        delete_before(&self.pool, DELETE_INACTIVE_SESSIONS_SQL, cutoff).await
    }

    async fn delete_used_codes_before(&self, cutoff: Timestamp) -> Result<u64, TokenStoreError> {
        delete_before(&self.pool, DELETE_USED_CODES_SQL, cutoff).await
    }

    #[tracing::instrument(name = "tokens.store.health", skip(self), err)]
    async fn health(&self) -> Result<StoreHealth, TokenStoreError> {
        let mut tables = Vec::with_capacity(TOKEN_TABLES.len());

        for name in TOKEN_TABLES {
            tables.push(TableStatus {
                name: name.to_string(),
                exists: database::table_exists(&self.pool, name).await?,
            });
        }

        let sample_count: i64 = query_scalar(SAMPLE_COUNT_SQL).fetch_one(&self.pool).await?;

        Ok(StoreHealth {
            tables,
            sample_count: to_count(sample_count)?,
        })
    }
}

async fn delete_before(pool: &PgPool, sql: &str, cutoff: Timestamp) -> Result<u64, TokenStoreError> {
    let rows_affected = query(sql)
        .bind(SqlxTimestamp::from(cutoff))
        .execute(pool)
        .await?
        .rows_affected();

    Ok(rows_affected)
}

async fn key_counts(
    pool: &PgPool,
    sql: &str,
    since: Timestamp,
    min: u64,
) -> Result<Vec<KeyCount>, TokenStoreError> {
    let min = i64::try_from(min).map_err(|e| TokenStoreError::InvalidData(e.to_string()))?;

    let rows: Vec<(String, i64)> = query_as(sql)
        .bind(SqlxTimestamp::from(since))
        .bind(min)
        .fetch_all(pool)
        .await?;

    rows.into_iter()
        .map(|(key, count)| {
            Ok(KeyCount {
                key,
                count: to_count(count)?,
            })
        })
        .collect()
}

fn to_count(count: i64) -> Result<u64, TokenStoreError> {
    u64::try_from(count).map_err(|e| TokenStoreError::InvalidData(e.to_string()))
}

fn decode_error(index: &str, error: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: index.to_string(),
        source: Box::new(error),
    }
}

impl<'r> FromRow<'r, PgRow> for AuthToken {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let token_type = row
            .try_get::<String, _>("token_type")?
            .parse::<TokenType>()
            .map_err(|e| decode_error("token_type", e))?;

        Ok(Self {
            id: AuthTokenUuid::from_uuid(row.try_get("id")?),
            email: row.try_get("email")?,
            token_hash: row.try_get("token_hash")?,
            token_type,
            expires_at: row.try_get::<SqlxTimestamp, _>("expires_at")?.to_jiff(),
            used_at: row
                .try_get::<Option<SqlxTimestamp>, _>("used_at")?
                .map(SqlxTimestamp::to_jiff),
            user_agent: row.try_get("user_agent")?,
            ip_address: row.try_get("ip_address")?,
            browser_fingerprint: row.try_get("browser_fingerprint")?,
            metadata: row
                .try_get::<Option<Json<Value>>, _>("metadata")?
                .map_or(Value::Null, |Json(value)| value),
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
        })
    }
}

impl<'r> FromRow<'r, PgRow> for BrowserSession {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: BrowserSessionUuid::from_uuid(row.try_get("id")?),
            email: row.try_get("email")?,
            browser_fingerprint: row.try_get("browser_fingerprint")?,
            user_agent: row.try_get("user_agent")?,
            ip_address: row.try_get("ip_address")?,
            is_trusted: row.try_get("is_trusted")?,
            last_activity: row.try_get::<SqlxTimestamp, _>("last_activity")?.to_jiff(),
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
        })
    }
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;
    use serde_json::json;
    use testresult::TestResult;

    use super::*;
    use crate::{domain::tokens::records::TokenContext, test::TestDb};

    fn new_token(email: &str, hash: &str, token_type: TokenType, now: Timestamp) -> NewAuthToken {
        NewAuthToken {
            id: AuthTokenUuid::new(),
            email: email.to_string(),
            token_hash: hash.to_string(),
            token_type,
            expires_at: now + SignedDuration::from_mins(15),
            context: TokenContext {
                user_agent: Some("test-agent".to_string()),
                ip_address: Some("203.0.113.7".to_string()),
                browser_fingerprint: Some("fp-1".to_string()),
            },
            metadata: json!({ "source": "test" }),
            created_at: now,
        }
    }

    #[tokio::test]
    #[ignore = "requires a container runtime"]
    async fn mark_used_only_succeeds_once() -> TestResult {
        let db = TestDb::new().await;
        let store = PgTokenStore::new(db.pool.clone());
        let now = Timestamp::now();

        let token = store
            .insert_token(new_token("a@example.com", "h1", TokenType::MagicLink, now))
            .await?;

        assert!(store.mark_used(token.id, now).await?);
        assert!(!store.mark_used(token.id, now).await?);

        let found = store
            .find_token("a@example.com", "h1", TokenType::MagicLink)
            .await?;

        assert!(found.is_some_and(|token| token.is_used()));

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a container runtime"]
    async fn window_attempts_count_each_dimension() -> TestResult {
        let db = TestDb::new().await;
        let store = PgTokenStore::new(db.pool.clone());
        let now = Timestamp::now();

        for hash in ["h1", "h2"] {
            store
                .insert_token(new_token("a@example.com", hash, TokenType::MagicLink, now))
                .await?;
        }

        let since = now - SignedDuration::from_mins(15);

        let email = store
            .window_attempts(Dimension::Email, "a@example.com", since)
            .await?;
        let ip = store
            .window_attempts(Dimension::IpAddress, "203.0.113.7", since)
            .await?;
        let fingerprint = store
            .window_attempts(Dimension::BrowserFingerprint, "fp-1", since)
            .await?;

        assert_eq!(email.count, 2);
        assert_eq!(ip.count, 2);
        assert_eq!(fingerprint.count, 2);
        assert!(email.oldest.is_some());

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a container runtime"]
    async fn verification_code_tokens_get_a_linked_code_row() -> TestResult {
        let db = TestDb::new().await;
        let store = PgTokenStore::new(db.pool.clone());
        let now = Timestamp::now();

        let token = store
            .insert_token(new_token(
                "c@example.com",
                "h3",
                TokenType::VerificationCode,
                now,
            ))
            .await?;

        store.mark_used(token.id, now).await?;

        let deleted = store
            .delete_used_codes_before(now + SignedDuration::from_mins(1))
            .await?;

        assert_eq!(deleted, 1);

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a container runtime"]
    async fn health_reports_every_table() -> TestResult {
        let db = TestDb::new().await;
        let store = PgTokenStore::new(db.pool.clone());

        let health = store.health().await?;

        assert!(health.all_tables_exist());
        assert_eq!(health.tables.len(), TOKEN_TABLES.len());
        assert_eq!(health.sample_count, 0);

        Ok(())
    }
}
