//! Magic Link Data

use jiff::Timestamp;
use serde_json::Value;

use crate::{
    broker::Session,
    domain::{rate_limits::records::Dimension, tokens::records::TokenContext},
};

/// A request to email a sign-in link.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MagicLinkRequest {
    pub email: String,
    pub redirect_to: Option<String>,
    pub metadata: Option<Value>,
    pub context: TokenContext,
}

/// How a magic-link request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MagicLinkOutcome {
    /// The broker accepted the email.
    Sent {
        remaining_attempts: u32,
        /// Whether the tracking token was persisted. When it was not, this
        /// attempt does not count against future rate-limit checks.
        tracked: bool,
        /// Store faults tolerated while deciding, for non-production diagnostics.
        diagnostics: Vec<String>,
    },

    /// Denied before any dispatch.
    RateLimited {
        message: String,
        limited_by: Dimension,
        remaining_attempts: u32,
        reset_time: Timestamp,
    },

    /// The broker could not send the email. No token was issued.
    DeliveryFailed,
}

impl MagicLinkOutcome {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Sent { .. } => "sent",
            Self::RateLimited { .. } => "rate_limited",
            Self::DeliveryFailed => "delivery_failed",
        }
    }
}

/// Callback parameters from the emailed link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignInCallback {
    pub code: String,
    pub code_verifier: Option<String>,
    pub context: TokenContext,
}

/// A completed sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedIn {
    pub user_id: String,
    pub email: Option<String>,
    pub session: Session,
}

impl From<Session> for SignedIn {
    fn from(session: Session) -> Self {
        Self {
            user_id: session.user.id.clone(),
            email: session.user.email.clone(),
            session,
        }
    }
}
