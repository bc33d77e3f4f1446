//! In-memory token store.
//!
//! Mirrors the `PostgreSQL` store's semantics, including the conditional
//! `used_at` update, for local development and database-free tests.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use jiff::Timestamp;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    database::TOKEN_TABLES,
    domain::{
        rate_limits::records::Dimension,
        tokens::{
            data::{BrowserSessionTouch, NewAuthToken},
            errors::TokenStoreError,
            records::{
                AuthToken, AuthTokenUuid, BrowserSession, BrowserSessionUuid, KeyCount,
                StoreHealth, TableStatus, TokenType, VerificationCode, VerificationCodeUuid,
                WindowAttempts,
            },
            store::{TokenStore, VolumeKey},
        },
    },
};

#[derive(Debug, Default)]
struct Tables {
    tokens: Vec<AuthToken>,
    sessions: Vec<BrowserSession>,
    codes: Vec<VerificationCode>,
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tables: Mutex<Tables>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, TokenStoreError> {
        self.tables
            .lock()
            .map_err(|e| TokenStoreError::Unavailable(e.to_string()))
    }
}

fn dimension_value(token: &AuthToken, dimension: Dimension) -> Option<&str> {
    match dimension {
        Dimension::Email => Some(token.email.as_str()),
        Dimension::IpAddress => token.ip_address.as_deref(),
        Dimension::BrowserFingerprint => token.browser_fingerprint.as_deref(),
    }
}

fn sorted_counts(counts: FxHashMap<String, u64>, min: u64) -> Vec<KeyCount> {
    let mut rows: Vec<KeyCount> = counts
        .into_iter()
        .filter(|(_, count)| *count >= min)
        .map(|(key, count)| KeyCount { key, count })
        .collect();

    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));

    rows
}

fn len_u64(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert_token(&self, token: NewAuthToken) -> Result<AuthToken, TokenStoreError> {
        let mut tables = self.tables()?;

        if tables
            .tokens
            .iter()
            .any(|existing| existing.token_hash == token.token_hash)
        {
            return Err(TokenStoreError::InvalidData(
                "token hash already exists".to_string(),
            ));
        }

        let created = AuthToken {
            id: token.id,
            email: token.email,
            token_hash: token.token_hash,
            token_type: token.token_type,
            expires_at: token.expires_at,
            used_at: None,
            user_agent: token.context.user_agent,
            ip_address: token.context.ip_address,
            browser_fingerprint: token.context.browser_fingerprint,
            metadata: token.metadata,
            created_at: token.created_at,
        };

        if created.token_type == TokenType::VerificationCode {
            tables.codes.push(VerificationCode {
                id: VerificationCodeUuid::new(),
                email: created.email.clone(),
                code: created.token_hash.clone(),
                expires_at: created.expires_at,
                used_at: None,
                auth_token_id: created.id,
                created_at: created.created_at,
            });
        }

        tables.tokens.push(created.clone());

        Ok(created)
    }

    async fn find_token(
        &self,
        email: &str,
        token_hash: &str,
        token_type: TokenType,
    ) -> Result<Option<AuthToken>, TokenStoreError> {
        let tables = self.tables()?;

        Ok(tables
            .tokens
            .iter()
            .filter(|token| {
                token.email == email
                    && token.token_hash == token_hash
                    && token.token_type == token_type
            })
            .max_by_key(|token| token.created_at)
            .cloned())
    }

    async fn mark_used(
        &self,
        token: AuthTokenUuid,
        at: Timestamp,
    ) -> Result<bool, TokenStoreError> {
        let mut tables = self.tables()?;

        let Some(row) = tables
            .tokens
            .iter_mut()
            .find(|row| row.id == token && row.used_at.is_none())
        else {
            return Ok(false);
        };

        row.used_at = Some(at);

        for code in tables
            .codes
            .iter_mut()
            .filter(|code| code.auth_token_id == token && code.used_at.is_none())
        {
            code.used_at = Some(at);
        }

        Ok(true)
    }

    async fn count_active(
        &self,
        email: &str,
        token_type: Option<TokenType>,
        now: Timestamp,
    ) -> Result<u64, TokenStoreError> {
        let tables = self.tables()?;

        Ok(len_u64(
            tables
                .tokens
                .iter()
                .filter(|token| token.email == email)
                .filter(|token| token_type.is_none_or(|wanted| token.token_type == wanted))
                .filter(|token| token.is_active_at(now))
                .count(),
        ))
    }

    async fn count_active_all(&self, now: Timestamp) -> Result<u64, TokenStoreError> {
        let tables = self.tables()?;

        Ok(len_u64(
            tables
                .tokens
                .iter()
                .filter(|token| token.is_active_at(now))
                .count(),
        ))
    }

    async fn invalidate_all(&self, email: &str, at: Timestamp) -> Result<u64, TokenStoreError> {
        let mut tables = self.tables()?;
        let mut invalidated = FxHashSet::default();

        for token in tables
            .tokens
            .iter_mut()
            .filter(|token| token.email == email && token.used_at.is_none())
        {
            token.used_at = Some(at);
            invalidated.insert(token.id);
        }

        for code in tables.codes.iter_mut().filter(|code| {
            invalidated.contains(&code.auth_token_id) && code.used_at.is_none()
        }) {
            code.used_at = Some(at);
        }

        Ok(len_u64(invalidated.len()))
    }

    async fn window_attempts(
        &self,
        dimension: Dimension,
        key: &str,
        since: Timestamp,
    ) -> Result<WindowAttempts, TokenStoreError> {
        let tables = self.tables()?;

        let matching = tables
            .tokens
            .iter()
            .filter(|token| dimension_value(token, dimension) == Some(key))
            .filter(|token| token.created_at >= since);

        let attempts = matching.fold(WindowAttempts::default(), |mut acc, token| {
            acc.count += 1;
            acc.oldest = Some(
                acc.oldest
                    .map_or(token.created_at, |oldest| oldest.min(token.created_at)),
            );
            acc
        });

        Ok(attempts)
    }

    async fn count_created_since(&self, since: Timestamp) -> Result<u64, TokenStoreError> {
        let tables = self.tables()?;

        Ok(len_u64(
            tables
                .tokens
                .iter()
                .filter(|token| token.created_at >= since)
                .count(),
        ))
    }

    async fn busiest(
        &self,
        key: VolumeKey,
        since: Timestamp,
        min_attempts: u64,
    ) -> Result<Vec<KeyCount>, TokenStoreError> {
        let tables = self.tables()?;
        let mut counts: FxHashMap<String, u64> = FxHashMap::default();

        for token in tables.tokens.iter().filter(|token| token.created_at >= since) {
            if let Some(key) = dimension_value(token, key.into()) {
                *counts.entry(key.to_string()).or_default() += 1;
            }
        }

        Ok(sorted_counts(counts, min_attempts))
    }

    async fn shared_fingerprints(
        &self,
        since: Timestamp,
        min_emails: u64,
    ) -> Result<Vec<KeyCount>, TokenStoreError> {
        let tables = self.tables()?;
        let mut emails: FxHashMap<&str, FxHashSet<&str>> = FxHashMap::default();

        for token in tables.tokens.iter().filter(|token| token.created_at >= since) {
            if let Some(fingerprint) = token.browser_fingerprint.as_deref() {
                emails
                    .entry(fingerprint)
                    .or_default()
                    .insert(token.email.as_str());
            }
        }

        let counts = emails
            .into_iter()
            .map(|(fingerprint, emails)| (fingerprint.to_string(), len_u64(emails.len())))
            .collect();

        Ok(sorted_counts(counts, min_emails))
    }

    async fn list_for_email(
        &self,
        email: &str,
        since: Timestamp,
    ) -> Result<Vec<AuthToken>, TokenStoreError> {
        let tables = self.tables()?;

        let mut tokens: Vec<AuthToken> = tables
            .tokens
            .iter()
            .filter(|token| token.email == email && token.created_at >= since)
            .cloned()
            .collect();

        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(tokens)
    }

    async fn delete_expired_before(&self, cutoff: Timestamp) -> Result<u64, TokenStoreError> {
        let mut tables = self.tables()?;
        let before = tables.tokens.len();

        tables.tokens.retain(|token| token.expires_at >= cutoff);

        let Tables { tokens, codes, .. } = &mut *tables;
        codes.retain(|code| tokens.iter().any(|token| token.id == code.auth_token_id));

        Ok(len_u64(before - tables.tokens.len()))
    }

    async fn delete_used_before(&self, cutoff: Timestamp) -> Result<u64, TokenStoreError> {
        let mut tables = self.tables()?;
        let before = tables.tokens.len();

        tables
            .tokens
            .retain(|token| token.used_at.is_none_or(|used_at| used_at >= cutoff));

        let Tables { tokens, codes, .. } = &mut *tables;
        codes.retain(|code| tokens.iter().any(|token| token.id == code.auth_token_id));

        Ok(len_u64(before - tables.tokens.len()))
    }

    async fn touch_browser_session(
        &self,
        touch: BrowserSessionTouch,
    ) -> Result<BrowserSession, TokenStoreError> {
        let mut tables = self.tables()?;

        if let Some(session) = tables.sessions.iter_mut().find(|session| {
            session.email == touch.email && session.browser_fingerprint == touch.browser_fingerprint
        }) {
            session.last_activity = touch.at;

            if touch.user_agent.is_some() {
                session.user_agent = touch.user_agent;
            }

            if touch.ip_address.is_some() {
                session.ip_address = touch.ip_address;
            }

            return Ok(session.clone());
        }

        let session = BrowserSession {
            id: BrowserSessionUuid::new(),
            email: touch.email,
            browser_fingerprint: touch.browser_fingerprint,
            user_agent: touch.user_agent,
            ip_address: touch.ip_address,
            is_trusted: false,
            last_activity: touch.at,
            created_at: touch.at,
        };

        tables.sessions.push(session.clone());

        Ok(session)
    }

    async fn list_sessions_for_email(
        &self,
        email: &str,
        since: Timestamp,
    ) -> Result<Vec<BrowserSession>, TokenStoreError> {
        let tables = self.tables()?;

        let mut sessions: Vec<BrowserSession> = tables
            .sessions
            .iter()
            .filter(|session| session.email == email && session.last_activity >= since)
            .cloned()
            .collect();

        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));

        Ok(sessions)
    }

    async fn delete_inactive_sessions(&self, cutoff: Timestamp) -> Result<u64, TokenStoreError> {
        let mut tables = self.tables()?;
        let before = tables.sessions.len();

        tables
            .sessions
            .retain(|session| session.last_activity >= cutoff);

        Ok(len_u64(before - tables.sessions.len()))
    }

    async fn delete_used_codes_before(&self, cutoff: Timestamp) -> Result<u64, TokenStoreError> {
        let mut tables = self.tables()?;
        let before = tables.codes.len();

        tables
            .codes
            .retain(|code| code.used_at.is_none_or(|used_at| used_at >= cutoff));

        Ok(len_u64(before - tables.codes.len()))
    }

    async fn health(&self) -> Result<StoreHealth, TokenStoreError> {
        let tables = self.tables()?;

        Ok(StoreHealth {
            tables: TOKEN_TABLES
                .iter()
                .map(|name| TableStatus {
                    name: (*name).to_string(),
                    exists: true,
                })
                .collect(),
            sample_count: len_u64(tables.tokens.len()),
        })
    }
}
