//! Establish Session Handler

use salvo::{
    oapi::{ToSchema, extract::JsonBody},
    prelude::*,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use magiclink_app::broker::SessionTokens;

use crate::extensions::*;

/// Tokens from an implicit-flow redirect fragment.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EstablishSessionRequest {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for EstablishSessionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EstablishSessionRequest")
            .finish_non_exhaustive()
    }
}

impl From<EstablishSessionRequest> for SessionTokens {
    fn from(request: EstablishSessionRequest) -> Self {
        Self {
            access_token: request.access_token,
            refresh_token: request.refresh_token,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionResponse {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Establish Session Handler
#[endpoint(
    tags("sign-in"),
    summary = "Establish Session",
    responses(
        (status_code = StatusCode::OK, description = "Session established"),
        (status_code = StatusCode::UNAUTHORIZED, description = "Tokens rejected"),
        (status_code = StatusCode::BAD_GATEWAY, description = "Session broker unavailable"),
    ),
)]
pub(crate) async fn handler(
    json: JsonBody<EstablishSessionRequest>,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<Json<SessionResponse>, StatusError> {
    let state = depot.state_or_500()?;

    match state
        .app
        .magic_links
        .establish_session(json.into_inner().into())
        .await
    {
        Ok(signed_in) => Ok(Json(SessionResponse {
            success: true,
            user_id: Some(signed_in.user_id),
            email: signed_in.email,
            error: None,
        })),
        Err(error) => {
            warn!(error = %error, "session could not be established");

            let (status, message) = if error.is_rejection() {
                (StatusCode::UNAUTHORIZED, "invalid session tokens")
            } else {
                (StatusCode::BAD_GATEWAY, "session broker unavailable")
            };

            res.status_code(status);

            Ok(Json(SessionResponse {
                error: Some(message.to_string()),
                ..SessionResponse::default()
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use magiclink_app::{
        broker::{BrokerError, BrokerUser, Session},
        domain::magic_links::{SignInError, SignedIn},
    };
    use salvo::test::{ResponseExt, TestClient};
    use serde_json::json;
    use testresult::TestResult;

    use crate::{
        config::runtime::AppEnv,
        test_helpers::{Mocks, service},
    };

    use super::*;

    fn make_service(mocks: Mocks) -> Service {
        service(
            mocks,
            AppEnv::Production,
            Router::with_path("auth/session").post(handler),
        )
    }

    fn failing_with(error: fn() -> SignInError) -> Mocks {
        let mut mocks = Mocks::default();

        mocks
            .magic_links
            .expect_establish_session()
            .once()
            .return_once(move |_| Err(error()));

        mocks
    }

    #[tokio::test]
    async fn test_valid_tokens_return_the_user() -> TestResult {
        let mut mocks = Mocks::default();

        mocks
            .magic_links
            .expect_establish_session()
            .once()
            .withf(|tokens| tokens.access_token == "access" && tokens.refresh_token == "refresh")
            .return_once(|tokens| {
                Ok(SignedIn::from(Session {
                    tokens,
                    expires_at: None,
                    user: BrokerUser {
                        id: "user-1".to_string(),
                        email: Some("a@example.com".to_string()),
                    },
                }))
            });

        let mut res = TestClient::post("http://example.com/auth/session")
            .json(&json!({ "accessToken": "access", "refreshToken": "refresh" }))
            .send(&make_service(mocks))
            .await;

        let body: serde_json::Value = res.take_json().await?;

        assert_eq!(res.status_code, Some(StatusCode::OK));
        assert_eq!(
            body,
            json!({ "success": true, "userId": "user-1", "email": "a@example.com" })
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_tokens_return_401() -> TestResult {
        let mocks = failing_with(|| {
            SignInError::Broker(BrokerError::Rejected {
                status: 401,
                message: "invalid JWT".to_string(),
            })
        });

        let mut res = TestClient::post("http://example.com/auth/session")
            .json(&json!({ "accessToken": "access", "refreshToken": "refresh" }))
            .send(&make_service(mocks))
            .await;

        let body: SessionResponse = res.take_json().await?;

        assert_eq!(res.status_code, Some(StatusCode::UNAUTHORIZED));
        assert!(!body.success);

        Ok(())
    }

    #[tokio::test]
    async fn test_broker_outage_returns_502() -> TestResult {
        let mocks = failing_with(|| {
            SignInError::Broker(BrokerError::UnexpectedResponse("empty body".to_string()))
        });

        let res = TestClient::post("http://example.com/auth/session")
            .json(&json!({ "accessToken": "access", "refreshToken": "refresh" }))
            .send(&make_service(mocks))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::BAD_GATEWAY));

        Ok(())
    }
}
