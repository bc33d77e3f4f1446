//! Token Records

use std::{fmt, str::FromStr};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{domain::tokens::errors::TokenStoreError, uuids::TypedUuid};

/// Auth Token UUID
pub type AuthTokenUuid = TypedUuid<AuthToken>;

/// Browser Session UUID
pub type BrowserSessionUuid = TypedUuid<BrowserSession>;

/// Verification Code UUID
pub type VerificationCodeUuid = TypedUuid<VerificationCode>;

/// Kind of proof a token represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    MagicLink,
    VerificationCode,
}

impl TokenType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MagicLink => "magic_link",
            Self::VerificationCode => "verification_code",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenType {
    type Err = TokenStoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "magic_link" => Ok(Self::MagicLink),
            "verification_code" => Ok(Self::VerificationCode),
            other => Err(TokenStoreError::InvalidData(format!(
                "unknown token type `{other}`"
            ))),
        }
    }
}

/// Request context captured alongside an issuance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenContext {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub browser_fingerprint: Option<String>,
}

/// A single issuance record. Only the digest of the secret is kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthToken {
    pub id: AuthTokenUuid,
    pub email: String,
    pub token_hash: String,
    pub token_type: TokenType,
    pub expires_at: Timestamp,
    pub used_at: Option<Timestamp>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub browser_fingerprint: Option<String>,
    pub metadata: Value,
    pub created_at: Timestamp,
}

impl AuthToken {
    #[must_use]
    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    /// A token stays valid up to and including its expiry instant.
    #[must_use]
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }

    #[must_use]
    pub fn is_active_at(&self, now: Timestamp) -> bool {
        !self.is_used() && self.expires_at > now
    }
}

/// A browser/device that completed a sign-in for an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrowserSession {
    pub id: BrowserSessionUuid,
    pub email: String,
    pub browser_fingerprint: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub is_trusted: bool,
    pub last_activity: Timestamp,
    pub created_at: Timestamp,
}

/// Short code linked to a `verification_code` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationCode {
    pub id: VerificationCodeUuid,
    pub email: String,
    pub code: String,
    pub expires_at: Timestamp,
    pub used_at: Option<Timestamp>,
    pub auth_token_id: AuthTokenUuid,
    pub created_at: Timestamp,
}

/// Attempts recorded for one key inside a trailing window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowAttempts {
    pub count: u64,
    pub oldest: Option<Timestamp>,
}

/// A grouping key and how many rows matched it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyCount {
    pub key: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStatus {
    pub name: String,
    pub exists: bool,
}

/// Connectivity report for the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreHealth {
    pub tables: Vec<TableStatus>,
    pub sample_count: u64,
}

impl StoreHealth {
    #[must_use]
    pub fn all_tables_exist(&self) -> bool {
        self.tables.iter().all(|table| table.exists)
    }
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;
    use serde_json::json;

    use super::*;

    fn token(expires_at: Timestamp, used_at: Option<Timestamp>) -> AuthToken {
        AuthToken {
            id: AuthTokenUuid::new(),
            email: "a@example.com".to_string(),
            token_hash: "abc".to_string(),
            token_type: TokenType::MagicLink,
            expires_at,
            used_at,
            user_agent: None,
            ip_address: None,
            browser_fingerprint: None,
            metadata: json!({}),
            created_at: Timestamp::UNIX_EPOCH,
        }
    }

    #[test]
    fn token_type_parses_its_own_label() {
        for token_type in [TokenType::MagicLink, TokenType::VerificationCode] {
            assert_eq!(token_type.as_str().parse::<TokenType>().ok(), Some(token_type));
        }

        assert!("password".parse::<TokenType>().is_err());
    }

    #[test]
    fn expiry_instant_itself_is_still_valid() {
        let expires_at = Timestamp::UNIX_EPOCH
            .checked_add(SignedDuration::from_mins(15))
            .unwrap_or(Timestamp::UNIX_EPOCH);
        let token = token(expires_at, None);

        assert!(!token.is_expired_at(expires_at));
        assert!(
            token.is_expired_at(
                expires_at
                    .checked_add(SignedDuration::from_secs(1))
                    .unwrap_or(expires_at)
            ),
            "one second past expiry should be expired"
        );
    }

    #[test]
    fn used_tokens_are_never_active() {
        let expires_at = Timestamp::MAX;
        let token = token(expires_at, Some(Timestamp::UNIX_EPOCH));

        assert!(!token.is_active_at(Timestamp::UNIX_EPOCH));
    }
}
