//! Token Data

use jiff::Timestamp;
use serde_json::Value;

use crate::domain::tokens::records::{AuthTokenUuid, TokenContext, TokenType};

/// New Auth Token Data
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuthToken {
    pub id: AuthTokenUuid,
    pub email: String,
    pub token_hash: String,
    pub token_type: TokenType,
    pub expires_at: Timestamp,
    pub context: TokenContext,
    pub metadata: Value,
    pub created_at: Timestamp,
}

/// Browser session touch data. Creates the row or refreshes `last_activity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserSessionTouch {
    pub email: String,
    pub browser_fingerprint: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub at: Timestamp,
}
