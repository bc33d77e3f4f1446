//! Tokens service.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use jiff::SignedDuration;
use mockall::automock;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    clock::{Clock, shift_minutes},
    domain::{
        email::normalize_email,
        tokens::{
            data::{BrowserSessionTouch, NewAuthToken},
            errors::TokensServiceError,
            records::{AuthToken, AuthTokenUuid, BrowserSession, TokenContext, TokenType},
            secret::TokenSecret,
            store::{TokenStore, bounded},
        },
    },
};

/// Default lifetime of an issued token.
pub const DEFAULT_TOKEN_TTL_MINUTES: u32 = 15;

/// Request to mint a new token.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueToken {
    pub email: String,
    pub token_type: TokenType,
    pub ttl_minutes: Option<u32>,
    pub context: TokenContext,
    pub metadata: Value,
}

/// A freshly minted token. `secret` is the only copy of the redeemable value.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token_hash: String,
    pub secret: TokenSecret,
    pub token: AuthToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSettings {
    pub ttl_minutes: u32,
    pub store_timeout: Duration,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            ttl_minutes: DEFAULT_TOKEN_TTL_MINUTES,
            store_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
pub struct StoreTokensService {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    settings: TokenSettings,
}

impl StoreTokensService {
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>, clock: Arc<dyn Clock>, settings: TokenSettings) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }
}

impl fmt::Debug for StoreTokensService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreTokensService")
            .field("clock", &self.clock)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokensService for StoreTokensService {
    #[tracing::instrument(
        name = "tokens.service.issue",
        skip(self, request),
        fields(token_type = %request.token_type),
        err
    )]
    async fn issue(&self, request: IssueToken) -> Result<IssuedToken, TokensServiceError> {
        let now = self.clock.now();
        let ttl = request.ttl_minutes.unwrap_or(self.settings.ttl_minutes);

        let secret = TokenSecret::generate();
        let token_hash = secret.digest();

        let token = bounded(
            self.settings.store_timeout,
            self.store.insert_token(NewAuthToken {
                id: AuthTokenUuid::new(),
                email: normalize_email(&request.email),
                token_hash: token_hash.clone(),
                token_type: request.token_type,
                expires_at: shift_minutes(now, i64::from(ttl)),
                context: request.context,
                metadata: request.metadata,
                created_at: now,
            }),
        )
        .await?;

        debug!(token_id = %token.id, ttl_minutes = ttl, "issued token");

        Ok(IssuedToken {
            token_hash,
            secret,
            token,
        })
    }

    #[tracing::instrument(
        name = "tokens.service.redeem",
        skip(self, email, secret),
        fields(token_type = %token_type),
        err
    )]
    async fn redeem(
        &self,
        email: &str,
        secret: &str,
        token_type: TokenType,
    ) -> Result<AuthToken, TokensServiceError> {
        let secret = TokenSecret::parse(secret.trim()).ok_or(TokensServiceError::Invalid)?;
        let email = normalize_email(email);

        let token = bounded(
            self.settings.store_timeout,
            self.store.find_token(&email, &secret.digest(), token_type),
        )
        .await?
        .ok_or(TokensServiceError::Invalid)?;

        if token.is_used() {
            return Err(TokensServiceError::Used);
        }

        let now = self.clock.now();

        if token.is_expired_at(now) {
            return Err(TokensServiceError::Expired);
        }

        let won = bounded(
            self.settings.store_timeout,
            self.store.mark_used(token.id, now),
        )
        .await?;

        if !won {
            return Err(TokensServiceError::Used);
        }

        info!(token_id = %token.id, "redeemed token");

        Ok(AuthToken {
            used_at: Some(now),
            ..token
        })
    }

    async fn count_active(
        &self,
        email: &str,
        token_type: Option<TokenType>,
    ) -> Result<u64, TokensServiceError> {
        let count = bounded(
            self.settings.store_timeout,
            self.store
                .count_active(&normalize_email(email), token_type, self.clock.now()),
        )
        .await?;

        Ok(count)
    }

    #[tracing::instrument(name = "tokens.service.invalidate_all", skip(self, email), err)]
    async fn invalidate_all(&self, email: &str) -> Result<u64, TokensServiceError> {
        let invalidated = bounded(
            self.settings.store_timeout,
            self.store
                .invalidate_all(&normalize_email(email), self.clock.now()),
        )
        .await?;

        info!(invalidated, "invalidated outstanding tokens");

        Ok(invalidated)
    }

    #[tracing::instrument(name = "tokens.service.record_browser_session", skip_all, err)]
    async fn record_browser_session(
        &self,
        email: &str,
        context: TokenContext,
    ) -> Result<Option<BrowserSession>, TokensServiceError> {
        let Some(browser_fingerprint) = context.browser_fingerprint else {
            return Ok(None);
        };

        let session = bounded(
            self.settings.store_timeout,
            self.store.touch_browser_session(BrowserSessionTouch {
                email: normalize_email(email),
                browser_fingerprint,
                user_agent: context.user_agent,
                ip_address: context.ip_address,
                at: self.clock.now(),
            }),
        )
        .await?;

        Ok(Some(session))
    }

    #[tracing::instrument(name = "tokens.service.purge_expired", skip(self), err)]
    async fn purge_expired(&self, grace: SignedDuration) -> Result<u64, TokensServiceError> {
        let cutoff = self
            .clock
            .now()
            .saturating_sub(grace)
            .unwrap_or(jiff::Timestamp::MIN);

        let purged = bounded(
            self.settings.store_timeout,
            self.store.delete_expired_before(cutoff),
        )
        .await?;

        Ok(purged)
    }
}

#[automock]
#[async_trait]
pub trait TokensService: Send + Sync {
    /// Mint a token, persisting only its digest.
    async fn issue(&self, request: IssueToken) -> Result<IssuedToken, TokensServiceError>;

    /// Consume a token. Succeeds at most once per token.
    async fn redeem(
        &self,
        email: &str,
        secret: &str,
        token_type: TokenType,
    ) -> Result<AuthToken, TokensServiceError>;

    /// Unused, unexpired tokens for `email`.
    async fn count_active(
        &self,
        email: &str,
        token_type: Option<TokenType>,
    ) -> Result<u64, TokensServiceError>;

    /// Mark every outstanding token for `email` as used.
    async fn invalidate_all(&self, email: &str) -> Result<u64, TokensServiceError>;

    /// Create or refresh the browser session behind a completed sign-in.
    /// Returns `None` when the context carries no fingerprint.
    async fn record_browser_session(
        &self,
        email: &str,
        context: TokenContext,
    ) -> Result<Option<BrowserSession>, TokensServiceError>;

    /// Delete tokens that expired more than `grace` ago.
    async fn purge_expired(&self, grace: SignedDuration) -> Result<u64, TokensServiceError>;
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use serde_json::json;
    use testresult::TestResult;

    use super::*;
    use crate::{
        clock::ManualClock,
        domain::tokens::{
            errors::TokenStoreError,
            store::{MemoryTokenStore, MockTokenStore},
        },
    };

    struct Harness {
        clock: Arc<ManualClock>,
        tokens: StoreTokensService,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(Timestamp::UNIX_EPOCH));
        let tokens = StoreTokensService::new(
            Arc::new(MemoryTokenStore::new()),
            clock.clone(),
            TokenSettings::default(),
        );

        Harness { clock, tokens }
    }

    fn request(email: &str) -> IssueToken {
        IssueToken {
            email: email.to_string(),
            token_type: TokenType::MagicLink,
            ttl_minutes: None,
            context: TokenContext::default(),
            metadata: json!({}),
        }
    }

    #[tokio::test]
    async fn issue_stores_the_digest_not_the_secret() -> TestResult {
        let Harness { tokens, .. } = harness();

        let issued = tokens.issue(request("a@example.com")).await?;

        assert_eq!(issued.token.token_hash, issued.token_hash);
        assert_eq!(issued.token_hash, issued.secret.digest());
        assert_ne!(issued.token_hash, issued.secret.expose());
        assert_eq!(
            issued.token.expires_at,
            shift_minutes(Timestamp::UNIX_EPOCH, 15)
        );

        Ok(())
    }

    #[tokio::test]
    async fn redeem_succeeds_exactly_once() -> TestResult {
        let Harness { tokens, .. } = harness();
        let issued = tokens.issue(request("a@example.com")).await?;
        let secret = issued.secret.expose();

        let redeemed = tokens
            .redeem("a@example.com", &secret, TokenType::MagicLink)
            .await?;

        assert!(redeemed.used_at.is_some());

        let second = tokens
            .redeem("a@example.com", &secret, TokenType::MagicLink)
            .await;

        assert!(matches!(second, Err(TokensServiceError::Used)));

        Ok(())
    }

    #[tokio::test]
    async fn redeem_after_expiry_fails_and_token_is_not_active() -> TestResult {
        let Harness { clock, tokens } = harness();
        let issued = tokens.issue(request("b@example.com")).await?;

        assert_eq!(tokens.count_active("b@example.com", None).await?, 1);

        clock.advance(SignedDuration::from_mins(16));

        let result = tokens
            .redeem("b@example.com", &issued.secret.expose(), TokenType::MagicLink)
            .await;

        assert!(matches!(result, Err(TokensServiceError::Expired)));
        assert_eq!(tokens.count_active("b@example.com", None).await?, 0);

        Ok(())
    }

    #[tokio::test]
    async fn redeem_rejects_wrong_email_type_or_malformed_secret() -> TestResult {
        let Harness { tokens, .. } = harness();
        let issued = tokens.issue(request("a@example.com")).await?;
        let secret = issued.secret.expose();

        let wrong_email = tokens
            .redeem("z@example.com", &secret, TokenType::MagicLink)
            .await;
        let wrong_type = tokens
            .redeem("a@example.com", &secret, TokenType::VerificationCode)
            .await;
        let malformed = tokens
            .redeem("a@example.com", "not-a-secret", TokenType::MagicLink)
            .await;

        assert!(matches!(wrong_email, Err(TokensServiceError::Invalid)));
        assert!(matches!(wrong_type, Err(TokensServiceError::Invalid)));
        assert!(matches!(malformed, Err(TokensServiceError::Invalid)));

        Ok(())
    }

    #[tokio::test]
    async fn concurrent_redemptions_have_one_winner() -> TestResult {
        let Harness { tokens, .. } = harness();
        let issued = tokens.issue(request("c@example.com")).await?;
        let secret = issued.secret.expose();

        let (first, second) = tokio::join!(
            tokens.redeem("c@example.com", &secret, TokenType::MagicLink),
            tokens.redeem("c@example.com", &secret, TokenType::MagicLink),
        );

        let winners = [&first, &second].iter().filter(|r| r.is_ok()).count();

        assert_eq!(winners, 1, "exactly one redemption should succeed");
        assert!(
            [first, second]
                .into_iter()
                .any(|r| matches!(r, Err(TokensServiceError::Used))),
            "the loser should see the token as used"
        );

        Ok(())
    }

    #[tokio::test]
    async fn lost_conditional_update_reports_used() -> TestResult {
        let now = Timestamp::UNIX_EPOCH;
        let secret = TokenSecret::generate();
        let token = AuthToken {
            id: AuthTokenUuid::new(),
            email: "a@example.com".to_string(),
            token_hash: secret.digest(),
            token_type: TokenType::MagicLink,
            expires_at: shift_minutes(now, 15),
            used_at: None,
            user_agent: None,
            ip_address: None,
            browser_fingerprint: None,
            metadata: json!({}),
            created_at: now,
        };

        let mut store = MockTokenStore::new();

        store
            .expect_find_token()
            .return_once(move |_, _, _| Ok(Some(token)));
        store.expect_mark_used().return_once(|_, _| Ok(false));

        let tokens = StoreTokensService::new(
            Arc::new(store),
            Arc::new(ManualClock::new(now)),
            TokenSettings::default(),
        );

        let result = tokens
            .redeem("a@example.com", &secret.expose(), TokenType::MagicLink)
            .await;

        assert!(matches!(result, Err(TokensServiceError::Used)));

        Ok(())
    }

    #[tokio::test]
    async fn issue_surfaces_store_failures_as_persistence_errors() {
        let mut store = MockTokenStore::new();

        store
            .expect_insert_token()
            .return_once(|_| Err(TokenStoreError::Unavailable("down".to_string())));

        let tokens = StoreTokensService::new(
            Arc::new(store),
            Arc::new(ManualClock::new(Timestamp::UNIX_EPOCH)),
            TokenSettings::default(),
        );

        let result = tokens.issue(request("a@example.com")).await;

        assert!(matches!(result, Err(TokensServiceError::Persistence(_))));
    }

    #[tokio::test]
    async fn invalidate_all_consumes_outstanding_tokens() -> TestResult {
        let Harness { tokens, .. } = harness();

        tokens.issue(request("a@example.com")).await?;
        tokens.issue(request("a@example.com")).await?;

        assert_eq!(tokens.invalidate_all("A@example.com").await?, 2);
        assert_eq!(tokens.count_active("a@example.com", None).await?, 0);

        Ok(())
    }

    #[tokio::test]
    async fn browser_sessions_need_a_fingerprint() -> TestResult {
        let Harness { tokens, .. } = harness();

        let without = tokens
            .record_browser_session("a@example.com", TokenContext::default())
            .await?;
        let with = tokens
            .record_browser_session(
                "A@example.com",
                TokenContext {
                    browser_fingerprint: Some("fp-1".to_string()),
                    ..TokenContext::default()
                },
            )
            .await?;

        assert!(without.is_none());
        assert_eq!(
            with.map(|session| session.email).as_deref(),
            Some("a@example.com")
        );

        Ok(())
    }

    #[tokio::test]
    async fn purge_expired_respects_the_grace_period() -> TestResult {
        let Harness { clock, tokens } = harness();

        tokens.issue(request("a@example.com")).await?;

        clock.advance(SignedDuration::from_mins(30));

        assert_eq!(tokens.purge_expired(SignedDuration::from_hours(1)).await?, 0);

        clock.advance(SignedDuration::from_mins(60));

        assert_eq!(tokens.purge_expired(SignedDuration::from_hours(1)).await?, 1);

        Ok(())
    }
}
