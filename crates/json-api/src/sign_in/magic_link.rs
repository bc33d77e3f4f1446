//! Send Magic Link Handler

use salvo::{
    oapi::{ToSchema, extract::JsonBody},
    prelude::*,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use magiclink_app::domain::magic_links::{MagicLinkOutcome, MagicLinkRequest};

use crate::{extensions::*, observability::record_magic_link_outcome};

/// Send Magic Link Request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendMagicLinkRequest {
    /// Address to send the sign-in link to
    pub email: String,

    /// Absolute http(s) URL the link should land on
    pub redirect_to: Option<String>,

    /// Arbitrary JSON object stored with the user
    pub metadata: Option<Value>,
}

/// Magic Link Response
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MagicLinkResponse {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limited: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limited_by: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_attempts: Option<u32>,

    /// RFC 3339 instant the limiting window rolls over
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<String>,

    /// Tolerated store faults, outside production only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Vec<String>>,
}

impl MagicLinkResponse {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

fn outcome_response(outcome: MagicLinkOutcome, verbose: bool) -> (StatusCode, MagicLinkResponse) {
    match outcome {
        MagicLinkOutcome::Sent {
            remaining_attempts,
            diagnostics,
            ..
        } => (
            StatusCode::OK,
            MagicLinkResponse {
                success: true,
                remaining_attempts: Some(remaining_attempts),
                diagnostics: (verbose && !diagnostics.is_empty()).then_some(diagnostics),
                ..MagicLinkResponse::default()
            },
        ),
        MagicLinkOutcome::RateLimited {
            message,
            limited_by,
            remaining_attempts,
            reset_time,
        } => (
            StatusCode::TOO_MANY_REQUESTS,
            MagicLinkResponse {
                error: Some(message),
                rate_limited: Some(true),
                limited_by: Some(limited_by.as_str().to_string()),
                remaining_attempts: Some(remaining_attempts),
                reset_time: Some(reset_time.to_string()),
                ..MagicLinkResponse::default()
            },
        ),
        MagicLinkOutcome::DeliveryFailed => (
            StatusCode::BAD_GATEWAY,
            MagicLinkResponse::failure("delivery failed"),
        ),
    }
}

/// Send Magic Link Handler
///
/// Rate-limits the request per address, IP and browser fingerprint, then asks
/// the session broker to email a sign-in link.
#[endpoint(
    tags("sign-in"),
    summary = "Send Magic Link",
    responses(
        (status_code = StatusCode::OK, description = "Link sent"),
        (status_code = StatusCode::BAD_REQUEST, description = "Invalid request"),
        (status_code = StatusCode::TOO_MANY_REQUESTS, description = "Rate limited"),
        (status_code = StatusCode::BAD_GATEWAY, description = "Delivery failed"),
        (status_code = StatusCode::INTERNAL_SERVER_ERROR, description = "Internal Server Error"),
    ),
)]
pub(crate) async fn handler(
    json: JsonBody<SendMagicLinkRequest>,
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<Json<MagicLinkResponse>, StatusError> {
    let state = depot.state_or_500()?;
    let body = json.into_inner();

    let result = state
        .app
        .magic_links
        .send_magic_link(MagicLinkRequest {
            email: body.email,
            redirect_to: body.redirect_to,
            metadata: body.metadata,
            context: req.token_context(),
        })
        .await;

    let (status, response) = match result {
        Ok(outcome) => {
            record_magic_link_outcome(depot, outcome.label());

            outcome_response(outcome, !state.runtime.is_production())
        }
        Err(error) => {
            record_magic_link_outcome(depot, "invalid");

            info!(reason = %error, "rejected magic link request");

            (
                StatusCode::BAD_REQUEST,
                MagicLinkResponse::failure(error.to_string()),
            )
        }
    };

    res.status_code(status);

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use salvo::test::{ResponseExt, TestClient};
    use serde_json::json;
    use testresult::TestResult;

    use magiclink_app::domain::{magic_links::MagicLinkError, rate_limits::records::Dimension};

    use crate::{
        config::runtime::AppEnv,
        test_helpers::{Mocks, service},
    };

    use super::*;

    fn make_service(mocks: Mocks, environment: AppEnv) -> Service {
        service(
            mocks,
            environment,
            Router::with_path("api/auth/magic-link").post(handler),
        )
    }

    fn expect_outcome(outcome: MagicLinkOutcome) -> Mocks {
        let mut mocks = Mocks::default();

        mocks
            .magic_links
            .expect_send_magic_link()
            .once()
            .return_once(move |_| Ok(outcome));

        mocks
    }

    #[tokio::test]
    async fn test_sent_link_returns_200_with_remaining_attempts() -> TestResult {
        let mut mocks = Mocks::default();

        mocks
            .magic_links
            .expect_send_magic_link()
            .once()
            .withf(|request| {
                request.email == "a@example.com"
                    && request.context.ip_address.as_deref() == Some("203.0.113.9")
                    && request.context.browser_fingerprint.as_deref() == Some("fp-1")
            })
            .return_once(|_| {
                Ok(MagicLinkOutcome::Sent {
                    remaining_attempts: 2,
                    tracked: true,
                    diagnostics: Vec::new(),
                })
            });

        let mut res = TestClient::post("http://example.com/api/auth/magic-link")
            .add_header("x-forwarded-for", "203.0.113.9, 10.0.0.1", true)
            .add_header("x-browser-fingerprint", "fp-1", true)
            .json(&json!({ "email": "a@example.com" }))
            .send(&make_service(mocks, AppEnv::Production))
            .await;

        let body: serde_json::Value = res.take_json().await?;

        assert_eq!(res.status_code, Some(StatusCode::OK));
        assert_eq!(body, json!({ "success": true, "remainingAttempts": 2 }));

        Ok(())
    }

    #[tokio::test]
    async fn test_rate_limited_returns_429() -> TestResult {
        let reset_time = Timestamp::from_second(1_800_000_900)?;

        let mocks = expect_outcome(MagicLinkOutcome::RateLimited {
            message: "Too many sign-in requests. Please try again in 15 minutes.".to_string(),
            limited_by: Dimension::Email,
            remaining_attempts: 0,
            reset_time,
        });

        let mut res = TestClient::post("http://example.com/api/auth/magic-link")
            .json(&json!({ "email": "a@example.com" }))
            .send(&make_service(mocks, AppEnv::Production))
            .await;

        let body: MagicLinkResponse = res.take_json().await?;

        assert_eq!(res.status_code, Some(StatusCode::TOO_MANY_REQUESTS));
        assert!(!body.success);
        assert_eq!(body.rate_limited, Some(true));
        assert_eq!(body.limited_by.as_deref(), Some("email"));
        assert_eq!(body.remaining_attempts, Some(0));
        assert_eq!(body.reset_time, Some(reset_time.to_string()));

        Ok(())
    }

    #[tokio::test]
    async fn test_delivery_failure_returns_502() -> TestResult {
        let mocks = expect_outcome(MagicLinkOutcome::DeliveryFailed);

        let mut res = TestClient::post("http://example.com/api/auth/magic-link")
            .json(&json!({ "email": "a@example.com" }))
            .send(&make_service(mocks, AppEnv::Production))
            .await;

        let body: MagicLinkResponse = res.take_json().await?;

        assert_eq!(res.status_code, Some(StatusCode::BAD_GATEWAY));
        assert_eq!(body.error.as_deref(), Some("delivery failed"));

        Ok(())
    }

    #[tokio::test]
    async fn test_validation_error_returns_400() -> TestResult {
        let mut mocks = Mocks::default();

        mocks
            .magic_links
            .expect_send_magic_link()
            .once()
            .return_once(|_| Err(MagicLinkError::InvalidEmail));

        let res = TestClient::post("http://example.com/api/auth/magic-link")
            .json(&json!({ "email": "nope" }))
            .send(&make_service(mocks, AppEnv::Production))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::BAD_REQUEST));

        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_body_never_reaches_the_service() -> TestResult {
        let mut mocks = Mocks::default();

        mocks.magic_links.expect_send_magic_link().never();

        let res = TestClient::post("http://example.com/api/auth/magic-link")
            .json(&json!({ "redirectTo": "https://app.example.com" }))
            .send(&make_service(mocks, AppEnv::Production))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::BAD_REQUEST));

        Ok(())
    }

    #[tokio::test]
    async fn test_diagnostics_are_hidden_in_production() -> TestResult {
        let outcome = MagicLinkOutcome::Sent {
            remaining_attempts: 3,
            tracked: true,
            diagnostics: vec!["store unavailable".to_string()],
        };

        let mut dev = TestClient::post("http://example.com/api/auth/magic-link")
            .json(&json!({ "email": "a@example.com" }))
            .send(&make_service(
                expect_outcome(outcome.clone()),
                AppEnv::Development,
            ))
            .await;
        let mut prod = TestClient::post("http://example.com/api/auth/magic-link")
            .json(&json!({ "email": "a@example.com" }))
            .send(&make_service(expect_outcome(outcome), AppEnv::Production))
            .await;

        let dev: MagicLinkResponse = dev.take_json().await?;
        let prod: MagicLinkResponse = prod.take_json().await?;

        assert_eq!(dev.diagnostics, Some(vec!["store unavailable".to_string()]));
        assert_eq!(prod.diagnostics, None);

        Ok(())
    }
}
