//! Token Store

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;

use crate::domain::{
    rate_limits::records::Dimension,
    tokens::{
        data::{BrowserSessionTouch, NewAuthToken},
        errors::TokenStoreError,
        records::{
            AuthToken, AuthTokenUuid, BrowserSession, KeyCount, StoreHealth, TokenType,
            WindowAttempts,
        },
    },
};

mod memory;
mod postgres;

/// Columns the monitoring volume aggregates group by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeKey {
    Email,
    IpAddress,
}

impl From<VolumeKey> for Dimension {
    fn from(key: VolumeKey) -> Self {
        match key {
            VolumeKey::Email => Self::Email,
            VolumeKey::IpAddress => Self::IpAddress,
        }
    }
}

pub use memory::MemoryTokenStore;
pub use postgres::PgTokenStore;

/// Durable storage of issued tokens, browser sessions and verification codes.
///
/// Every rate-limit count is derived from `auth_tokens`, so the store is the only
/// source of truth and nothing above it caches counts.
#[automock]
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist a new token. `verification_code` tokens also get a linked code row.
    async fn insert_token(&self, token: NewAuthToken) -> Result<AuthToken, TokenStoreError>;

    /// Find a token by its owner, digest and type regardless of its used state.
    async fn find_token(
        &self,
        email: &str,
        token_hash: &str,
        token_type: TokenType,
    ) -> Result<Option<AuthToken>, TokenStoreError>;

    /// Set `used_at` only if it is still null. Returns whether this call won.
    async fn mark_used(&self, token: AuthTokenUuid, at: Timestamp)
    -> Result<bool, TokenStoreError>;

    /// Unused tokens for `email` expiring after `now`.
    async fn count_active(
        &self,
        email: &str,
        token_type: Option<TokenType>,
        now: Timestamp,
    ) -> Result<u64, TokenStoreError>;

    /// Unused, unexpired tokens across all addresses.
    async fn count_active_all(&self, now: Timestamp) -> Result<u64, TokenStoreError>;

    /// Mark every unused token of `email` as used.
    async fn invalidate_all(&self, email: &str, at: Timestamp) -> Result<u64, TokenStoreError>;

    /// Rows for `key` in `dimension` created at or after `since`.
    async fn window_attempts(
        &self,
        dimension: Dimension,
        key: &str,
        since: Timestamp,
    ) -> Result<WindowAttempts, TokenStoreError>;

    /// Tokens created at or after `since`.
    async fn count_created_since(&self, since: Timestamp) -> Result<u64, TokenStoreError>;

    /// Keys of `key` with at least `min_attempts` rows since `since`.
    async fn busiest(
        &self,
        key: VolumeKey,
        since: Timestamp,
        min_attempts: u64,
    ) -> Result<Vec<KeyCount>, TokenStoreError>;

    /// Fingerprints seen with at least `min_emails` distinct addresses since `since`.
    async fn shared_fingerprints(
        &self,
        since: Timestamp,
        min_emails: u64,
    ) -> Result<Vec<KeyCount>, TokenStoreError>;

    /// Tokens of `email` created at or after `since`, newest first.
    async fn list_for_email(
        &self,
        email: &str,
        since: Timestamp,
    ) -> Result<Vec<AuthToken>, TokenStoreError>;

    async fn delete_expired_before(&self, cutoff: Timestamp) -> Result<u64, TokenStoreError>;

    async fn delete_used_before(&self, cutoff: Timestamp) -> Result<u64, TokenStoreError>;

    async fn touch_browser_session(
        &self,
        touch: BrowserSessionTouch,
    ) -> Result<BrowserSession, TokenStoreError>;

    async fn list_sessions_for_email(
        &self,
        email: &str,
        since: Timestamp,
    ) -> Result<Vec<BrowserSession>, TokenStoreError>;

    async fn delete_inactive_sessions(&self, cutoff: Timestamp) -> Result<u64, TokenStoreError>;

    async fn delete_used_codes_before(&self, cutoff: Timestamp) -> Result<u64, TokenStoreError>;

    /// Table presence and a sample row count. Fails when the store is unreachable.
    async fn health(&self) -> Result<StoreHealth, TokenStoreError>;
}

/// Bound a store call by `limit`. Expiry surfaces as [`TokenStoreError::Timeout`].
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, TokenStoreError>
where
    F: Future<Output = Result<T, TokenStoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_elapsed) => Err(TokenStoreError::Timeout(limit)),
    }
}
