//! Magic link errors.

use thiserror::Error;

use crate::broker::BrokerError;

/// Input rejected before touching the store or the broker.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MagicLinkError {
    #[error("a valid email address is required")]
    InvalidEmail,

    #[error("redirect must be an absolute http(s) URL")]
    InvalidRedirect,

    #[error("metadata must be a JSON object")]
    InvalidMetadata,
}

#[derive(Debug, Error)]
pub enum SignInError {
    #[error("authorization code is missing")]
    MissingCode,

    #[error("session broker refused the sign-in")]
    Broker(#[from] BrokerError),
}

impl SignInError {
    /// Whether the caller presented bad credentials, as opposed to the broker failing.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        match self {
            Self::MissingCode => true,
            Self::Broker(error) => error.is_rejection(),
        }
    }
}
