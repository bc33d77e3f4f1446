//! Token errors.

use std::time::Duration;

use sqlx::error::DatabaseError;
use thiserror::Error;

/// Failures of the backing token store. All of them count as "store unavailable"
/// for rate-limit degradation purposes.
#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("storage error")]
    Sql(#[source] sqlx::Error),

    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("stored data is invalid: {0}")]
    InvalidData(String),
}

impl TokenStoreError {
    /// SQLSTATE reported by the database, when there is one.
    #[must_use]
    pub fn code(&self) -> Option<String> {
        match self {
            Self::Sql(error) => error
                .as_database_error()
                .and_then(DatabaseError::code)
                .map(|code| code.into_owned()),
            Self::Timeout(_) => Some("timeout".to_string()),
            Self::Unavailable(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<sqlx::Error> for TokenStoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::Unavailable(error.to_string())
            }
            error => Self::Sql(error),
        }
    }
}

/// Token issuance and redemption failures.
#[derive(Debug, Error)]
pub enum TokensServiceError {
    #[error("token is invalid")]
    Invalid,

    #[error("token has expired")]
    Expired,

    #[error("token has already been used")]
    Used,

    #[error("token persistence failed")]
    Persistence(#[from] TokenStoreError),
}

impl TokensServiceError {
    /// The store's error code, for persistence failures.
    #[must_use]
    pub fn code(&self) -> Option<String> {
        match self {
            Self::Persistence(source) => source.code(),
            Self::Invalid | Self::Expired | Self::Used => None,
        }
    }
}
