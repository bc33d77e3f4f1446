//! Magic link orchestration.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use mockall::automock;
use serde_json::Value;
use tracing::{error, warn};
use url::Url;

use crate::{
    broker::{CodeExchange, PasswordlessEmail, SessionBroker, SessionTokens},
    clock::Clock,
    domain::{
        email::{is_valid_email, normalize_email},
        magic_links::{
            audit,
            data::{MagicLinkOutcome, MagicLinkRequest, SignInCallback, SignedIn},
            errors::{MagicLinkError, SignInError},
        },
        rate_limits::{
            RateLimitService, explain,
            records::{Dimension, RateLimitSubject},
        },
        tokens::{
            IssueToken, TokensService,
            records::{TokenContext, TokenType},
        },
    },
};

/// Shown instead of a wait estimate when the denial came from a store fault.
pub const TEMPORARILY_UNAVAILABLE: &str =
    "Sign-in is temporarily unavailable. Please try again in a few minutes.";

#[derive(Clone)]
pub struct DefaultMagicLinkService {
    rate_limits: Arc<dyn RateLimitService>,
    tokens: Arc<dyn TokensService>,
    broker: Arc<dyn SessionBroker>,
    clock: Arc<dyn Clock>,
}

impl DefaultMagicLinkService {
    #[must_use]
    pub fn new(
        rate_limits: Arc<dyn RateLimitService>,
        tokens: Arc<dyn TokensService>,
        broker: Arc<dyn SessionBroker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rate_limits,
            tokens,
            broker,
            clock,
        }
    }
}

impl fmt::Debug for DefaultMagicLinkService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultMagicLinkService")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

/// Validated and normalized request fields.
struct Validated {
    email: String,
    redirect_to: Option<String>,
    metadata: Value,
}

fn validate(request: &MagicLinkRequest) -> Result<Validated, MagicLinkError> {
    let email = normalize_email(&request.email);

    if !is_valid_email(&email) {
        return Err(MagicLinkError::InvalidEmail);
    }

    let redirect_to = match request.redirect_to.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => {
            let url = Url::parse(raw).map_err(|_parse| MagicLinkError::InvalidRedirect)?;

            if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
                return Err(MagicLinkError::InvalidRedirect);
            }

            Some(url.to_string())
        }
    };

    let metadata = match &request.metadata {
        None | Some(Value::Null) => Value::Object(serde_json::Map::new()),
        Some(value @ Value::Object(_)) => value.clone(),
        Some(_) => return Err(MagicLinkError::InvalidMetadata),
    };

    Ok(Validated {
        email,
        redirect_to,
        metadata,
    })
}

#[async_trait]
impl MagicLinkService for DefaultMagicLinkService {
    #[tracing::instrument(
        name = "magic_links.service.send_magic_link",
        skip_all,
        fields(outcome = tracing::field::Empty),
        err
    )]
    async fn send_magic_link(
        &self,
        request: MagicLinkRequest,
    ) -> Result<MagicLinkOutcome, MagicLinkError> {
        let Validated {
            email,
            redirect_to,
            metadata,
        } = validate(&request)?;

        let context = request.context;

        let composite = self
            .rate_limits
            .check_comprehensive(
                RateLimitSubject::new(email.clone())
                    .with_ip_address(context.ip_address.clone())
                    .with_browser_fingerprint(context.browser_fingerprint.clone()),
            )
            .await;

        if !composite.is_allowed {
            let limited_by = composite.limited_by.unwrap_or(Dimension::Email);
            let now = self.clock.now();
            let reset_time = composite.reset_time().unwrap_or(now);

            let degraded = composite
                .verdict(limited_by)
                .is_some_and(|verdict| verdict.is_degraded());

            let message = if degraded {
                TEMPORARILY_UNAVAILABLE.to_string()
            } else {
                explain(false, reset_time, now).unwrap_or_default()
            };

            audit::magic_link_rate_limited(&email, &context, limited_by, reset_time);

            let outcome = MagicLinkOutcome::RateLimited {
                message,
                limited_by,
                remaining_attempts: composite
                    .verdict(limited_by)
                    .map_or(0, |verdict| verdict.remaining_attempts),
                reset_time,
            };

            tracing::Span::current().record("outcome", outcome.label());

            return Ok(outcome);
        }

        let diagnostics: Vec<String> = composite
            .degradations()
            .map(|degradation| degradation.reason.clone())
            .collect();

        if let Err(error) = self
            .broker
            .dispatch_passwordless_email(PasswordlessEmail {
                email: email.clone(),
                redirect_to,
                metadata: metadata.clone(),
            })
            .await
        {
            error!(error = %error, "magic link delivery failed");

            audit::magic_link_delivery_failed(&email, &context);

            tracing::Span::current().record("outcome", "delivery_failed");

            return Ok(MagicLinkOutcome::DeliveryFailed);
        }

        let tracked = match self
            .tokens
            .issue(IssueToken {
                email: email.clone(),
                token_type: TokenType::MagicLink,
                ttl_minutes: None,
                context: context.clone(),
                metadata,
            })
            .await
        {
            Ok(_) => true,
            Err(error) => {
                warn!(
                    error = %error,
                    "magic link was sent but its tracking token could not be stored"
                );

                false
            }
        };

        let remaining = composite.tightest_remaining();
        let remaining_attempts = if tracked {
            remaining.saturating_sub(1)
        } else {
            remaining
        };

        audit::magic_link_sent(&email, &context, tracked);

        tracing::Span::current().record("outcome", "sent");

        Ok(MagicLinkOutcome::Sent {
            remaining_attempts,
            tracked,
            diagnostics,
        })
    }

    #[tracing::instrument(name = "magic_links.service.complete_sign_in", skip_all, err)]
    async fn complete_sign_in(&self, callback: SignInCallback) -> Result<SignedIn, SignInError> {
        let code = callback.code.trim();

        if code.is_empty() {
            audit::sign_in_failed("missing code", &callback.context);

            return Err(SignInError::MissingCode);
        }

        let session = match self
            .broker
            .exchange_authorization_code(CodeExchange {
                code: code.to_string(),
                code_verifier: callback.code_verifier,
            })
            .await
        {
            Ok(session) => session,
            Err(error) => {
                audit::sign_in_failed(&error.to_string(), &callback.context);

                return Err(error.into());
            }
        };

        let signed_in = SignedIn::from(session);

        if let Some(email) = signed_in.email.as_deref() {
            if let Err(error) = self
                .tokens
                .record_browser_session(email, callback.context.clone())
                .await
            {
                warn!(error = %error, "could not record browser session");
            }
        }

        audit::sign_in_completed(
            &signed_in.user_id,
            signed_in.email.as_deref(),
            &callback.context,
        );

        Ok(signed_in)
    }

    #[tracing::instrument(name = "magic_links.service.establish_session", skip_all, err)]
    async fn establish_session(&self, tokens: SessionTokens) -> Result<SignedIn, SignInError> {
        let no_context = TokenContext::default();

        match self.broker.establish_session(tokens).await {
            Ok(session) => {
                let signed_in = SignedIn::from(session);

                audit::sign_in_completed(&signed_in.user_id, signed_in.email.as_deref(), &no_context);

                Ok(signed_in)
            }
            Err(error) => {
                audit::sign_in_failed(&error.to_string(), &no_context);

                Err(error.into())
            }
        }
    }
}

/// The request-facing entry point for passwordless sign-in.
#[automock]
#[async_trait]
pub trait MagicLinkService: Send + Sync {
    /// Rate-limit, dispatch and track a magic-link email.
    ///
    /// Only invalid input is an error; every other result is a [`MagicLinkOutcome`].
    async fn send_magic_link(
        &self,
        request: MagicLinkRequest,
    ) -> Result<MagicLinkOutcome, MagicLinkError>;

    /// Exchange the callback code and record the signing-in browser.
    async fn complete_sign_in(&self, callback: SignInCallback) -> Result<SignedIn, SignInError>;

    /// Build a session from implicit-flow tokens.
    async fn establish_session(&self, tokens: SessionTokens) -> Result<SignedIn, SignInError>;
}
