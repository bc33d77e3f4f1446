//! Supabase (GoTrue) session broker.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::broker::{
    BrokerError, BrokerUser, CodeExchange, PasswordlessEmail, Session, SessionBroker,
    SessionTokens,
};

/// Connection settings for a Supabase project.
#[derive(Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `"https://xyz.supabase.co"`.
    pub url: String,

    /// Public anon key sent as `apikey`.
    pub anon_key: String,

    /// Upper bound for every broker call.
    pub timeout: Duration,
}

impl fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("anon_key", &"**redacted**")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// HTTP client for the Supabase auth API.
#[derive(Debug, Clone)]
pub struct SupabaseBroker {
    config: SupabaseConfig,
    http: Client,
}

impl SupabaseBroker {
    /// Create a new client from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: SupabaseConfig) -> Result<Self, BrokerError> {
        let http = Client::builder().timeout(config.timeout).build()?;

        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.config.url.trim_end_matches('/'))
    }

    fn with_api_key(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("apikey", &self.config.anon_key)
    }

    async fn fetch_user(&self, access_token: &str) -> Result<BrokerUser, BrokerError> {
        let response = self
            .with_api_key(self.http.get(self.endpoint("user")))
            .bearer_auth(access_token)
            .send()
            .await?;

        let user: UserResponse = parse(response, "user").await?;

        Ok(user.into())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, BrokerError> {
        let response = self
            .with_api_key(self.http.post(self.endpoint("token")))
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        let token: TokenResponse = parse(response, "refresh").await?;

        Ok(token.into_session(Timestamp::now()))
    }
}

#[async_trait]
impl SessionBroker for SupabaseBroker {
    #[tracing::instrument(name = "broker.supabase.dispatch", skip_all, err)]
    async fn dispatch_passwordless_email(
        &self,
        request: PasswordlessEmail,
    ) -> Result<(), BrokerError> {
        let mut call = self
            .with_api_key(self.http.post(self.endpoint("otp")))
            .bearer_auth(&self.config.anon_key);

        if let Some(redirect_to) = request.redirect_to.as_deref() {
            call = call.query(&[("redirect_to", redirect_to)]);
        }

        let response = call
            .json(&json!({
                "email": request.email,
                "create_user": true,
                "data": request.metadata,
            }))
            .send()
            .await?;

        ensure_success(response, "otp").await?;

        debug!("dispatched passwordless email");

        Ok(())
    }

    #[tracing::instrument(name = "broker.supabase.exchange_code", skip_all, err)]
    async fn exchange_authorization_code(
        &self,
        exchange: CodeExchange,
    ) -> Result<Session, BrokerError> {
        let response = self
            .with_api_key(self.http.post(self.endpoint("token")))
            .query(&[("grant_type", "pkce")])
            .json(&json!({
                "auth_code": exchange.code,
                "code_verifier": exchange.code_verifier,
            }))
            .send()
            .await?;

        let token: TokenResponse = parse(response, "pkce").await?;

        Ok(token.into_session(Timestamp::now()))
    }

    #[tracing::instrument(name = "broker.supabase.establish_session", skip_all, err)]
    async fn establish_session(&self, tokens: SessionTokens) -> Result<Session, BrokerError> {
        let user = self.fetch_user(&tokens.access_token).await;

        match user {
            Ok(user) => Ok(Session {
                tokens,
                expires_at: None,
                user,
            }),
            Err(error) if error.is_rejection() => {
                warn!(error = %error, "access token rejected, refreshing session");

                self.refresh(&tokens.refresh_token).await
            }
            Err(error) => Err(error),
        }
    }
}

async fn ensure_success(response: Response, operation: &str) -> Result<Response, BrokerError> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();

    Err(BrokerError::Rejected {
        status: status.as_u16(),
        message: error_message(status, &body, operation),
    })
}

async fn parse<T: for<'de> Deserialize<'de>>(
    response: Response,
    operation: &str,
) -> Result<T, BrokerError> {
    let response = ensure_success(response, operation).await?;

    Ok(response.json().await?)
}

/// Pull the most specific message out of a GoTrue error body.
fn error_message(status: StatusCode, body: &str, operation: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(ErrorResponse::into_message)
        .unwrap_or_else(|| format!("{operation} request failed with status {status}"))
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl ErrorResponse {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    email: Option<String>,
}

impl From<UserResponse> for BrokerUser {
    fn from(value: UserResponse) -> Self {
        Self {
            id: value.id,
            email: value.email,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: UserResponse,
}

impl TokenResponse {
    fn into_session(self, now: Timestamp) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|seconds| Timestamp::from_second(seconds).ok())
            .or_else(|| {
                self.expires_in
                    .and_then(|seconds| now.checked_add(SignedDuration::from_secs(seconds)).ok())
            });

        Session {
            tokens: SessionTokens {
                access_token: self.access_token,
                refresh_token: self.refresh_token,
            },
            expires_at,
            user: self.user.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker(url: &str) -> Result<SupabaseBroker, BrokerError> {
        SupabaseBroker::new(SupabaseConfig {
            url: url.to_string(),
            anon_key: "anon".to_string(),
            timeout: Duration::from_secs(1),
        })
    }

    #[test]
    fn endpoints_ignore_trailing_slashes() -> Result<(), BrokerError> {
        let broker = broker("https://project.supabase.co/")?;

        assert_eq!(
            broker.endpoint("otp"),
            "https://project.supabase.co/auth/v1/otp"
        );

        Ok(())
    }

    #[test]
    fn config_debug_hides_the_key() {
        let config = SupabaseConfig {
            url: "https://project.supabase.co".to_string(),
            anon_key: "super-secret".to_string(),
            timeout: Duration::from_secs(1),
        };

        assert!(!format!("{config:?}").contains("super-secret"));
    }

    #[test]
    fn error_message_prefers_the_description() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid Refresh Token"}"#;

        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, body, "refresh"),
            "Invalid Refresh Token"
        );
    }

    #[test]
    fn error_message_falls_back_to_the_status() {
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "<html>", "otp"),
            "otp request failed with status 502 Bad Gateway"
        );
    }

    #[test]
    fn token_response_prefers_absolute_expiry() -> Result<(), serde_json::Error> {
        let response: TokenResponse = serde_json::from_str(
            r#"{
                "access_token": "a",
                "refresh_token": "r",
                "expires_in": 3600,
                "expires_at": 1700000000,
                "user": { "id": "u1", "email": "a@example.com" }
            }"#,
        )?;

        let session = response.into_session(Timestamp::UNIX_EPOCH);

        assert_eq!(session.expires_at.map(Timestamp::as_second), Some(1_700_000_000));
        assert_eq!(session.user.email.as_deref(), Some("a@example.com"));
        assert_eq!(session.tokens.refresh_token, "r");

        Ok(())
    }

    #[test]
    fn client_errors_are_rejections() {
        let rejected = BrokerError::Rejected {
            status: 401,
            message: "bad jwt".to_string(),
        };
        let unavailable = BrokerError::Rejected {
            status: 503,
            message: "down".to_string(),
        };

        assert!(rejected.is_rejection());
        assert!(!unavailable.is_rejection());
    }
}
