//! Broker request and response types.

use std::fmt;

use jiff::Timestamp;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct PasswordlessEmail {
    pub email: String,
    pub redirect_to: Option<String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeExchange {
    pub code: String,
    pub code_verifier: Option<String>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokens")
            .field("access_token", &"**redacted**")
            .field("refresh_token", &"**redacted**")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerUser {
    pub id: String,
    pub email: Option<String>,
}

/// An authenticated session issued by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub tokens: SessionTokens,
    pub expires_at: Option<Timestamp>,
    pub user: BrokerUser,
}

#[derive(Debug, Error)]
pub enum BrokerError {
    /// Transport, timeout or body decoding failure.
    #[error("broker request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The broker answered with an error status.
    #[error("broker rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected broker response: {0}")]
    UnexpectedResponse(String),
}

impl BrokerError {
    /// Whether the broker refused the credentials rather than failing to answer.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { status, .. } if (400..500).contains(status))
    }
}
