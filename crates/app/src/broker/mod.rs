//! Session broker
//!
//! The external identity provider that delivers magic-link emails and turns
//! authorization codes or implicit-flow tokens into sessions.

use async_trait::async_trait;
use mockall::automock;

mod models;
mod supabase;

pub use models::{BrokerError, BrokerUser, CodeExchange, PasswordlessEmail, Session, SessionTokens};
pub use supabase::{SupabaseBroker, SupabaseConfig};

#[automock]
#[async_trait]
pub trait SessionBroker: Send + Sync {
    /// Ask the provider to email a sign-in link.
    async fn dispatch_passwordless_email(
        &self,
        request: PasswordlessEmail,
    ) -> Result<(), BrokerError>;

    /// Trade a callback `code` for a session.
    async fn exchange_authorization_code(
        &self,
        exchange: CodeExchange,
    ) -> Result<Session, BrokerError>;

    /// Build a session from tokens the client already holds.
    async fn establish_session(&self, tokens: SessionTokens) -> Result<Session, BrokerError>;
}
