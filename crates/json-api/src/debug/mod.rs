//! Debug introspection endpoint.
//!
//! Available outside production only; production requests are refused before
//! any store access.

use jiff::Timestamp;
use salvo::{oapi::extract::QueryParam, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

use magiclink_app::domain::rate_limits::records::{Dimension, DimensionLimit};

use crate::extensions::*;

const SUPPORTED_ACTIONS: [&str; 3] = ["connection", "email", "test"];

const DEFAULT_WINDOW_MINUTES: u32 = 15;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DebugResponse {
    pub action: String,
    /// RFC 3339 time the result was produced
    pub timestamp: String,
    pub result: Value,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DebugError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_actions: Option<Vec<String>>,
}

/// Refuses every request in production.
#[handler]
pub(crate) async fn guard(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
    ctrl: &mut FlowCtrl,
) {
    let state = match depot.state_or_500() {
        Ok(state) => state,
        Err(status) => {
            res.render(status);

            return;
        }
    };

    if state.runtime.is_production() {
        warn!("debug endpoint requested in production");

        res.render(StatusError::forbidden().brief("debug endpoint is disabled in production"));
        ctrl.skip_rest();

        return;
    }

    ctrl.call_next(req, depot, res).await;
}

fn bad_request(res: &mut Response, error: DebugError) {
    res.status_code(StatusCode::BAD_REQUEST);
    res.render(Json(error));
}

/// Reads a positive limit from the query string, `default` when absent.
fn limit_param(req: &Request, name: &str, default: u32) -> Result<u32, DebugError> {
    let Some(raw) = req.query::<String>(name) else {
        return Ok(default);
    };

    match raw.trim().parse::<u32>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(DebugError {
            error: format!("{name} must be a positive integer, got {raw:?}"),
            supported_actions: None,
        }),
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, StatusError> {
    serde_json::to_value(value).or_500("failed to serialize debug result")
}

/// Debug Handler
///
/// Reports store connectivity, dumps rate-limit state for an address, or runs
/// a rate-limit check with explicit limits.
#[endpoint(
    tags("debug"),
    summary = "Rate Limit Introspection",
    responses(
        (status_code = StatusCode::OK, description = "Action result"),
        (status_code = StatusCode::BAD_REQUEST, description = "Unknown action, missing email or invalid limits"),
        (status_code = StatusCode::FORBIDDEN, description = "Disabled in production"),
        (status_code = StatusCode::INTERNAL_SERVER_ERROR, description = "Internal Server Error"),
    ),
)]
pub(crate) async fn handler(
    action: QueryParam<String, false>,
    email: QueryParam<String, false>,
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<(), StatusError> {
    let state = depot.state_or_500()?;
    let action = action.into_inner().unwrap_or_default();
    let email = email.into_inner().filter(|email| !email.trim().is_empty());

    let result = match (action.as_str(), email) {
        ("connection", _) => to_value(&state.app.maintenance.connection_report().await)?,
        ("email" | "test", None) => {
            bad_request(
                res,
                DebugError {
                    error: format!("the {action} action requires an email"),
                    supported_actions: None,
                },
            );

            return Ok(());
        }
        ("email", Some(email)) => {
            let report = state
                .app
                .maintenance
                .email_report(&email)
                .await
                .or_500("failed to build email report")?;

            to_value(&report)?
        }
        ("test", Some(email)) => {
            let limit = match (
                limit_param(req, "windowMinutes", DEFAULT_WINDOW_MINUTES),
                limit_param(req, "maxAttempts", DEFAULT_MAX_ATTEMPTS),
            ) {
                (Ok(window_minutes), Ok(max_attempts)) => {
                    DimensionLimit::new(window_minutes, max_attempts)
                }
                (Err(error), _) | (_, Err(error)) => {
                    bad_request(res, error);

                    return Ok(());
                }
            };

            let verdict = state
                .app
                .rate_limits
                .check_with(Dimension::Email, &email, limit)
                .await;

            to_value(&verdict)?
        }
        _ => {
            error!(action = %action, "unknown debug action");

            bad_request(
                res,
                DebugError {
                    error: format!("unknown action {action:?}"),
                    supported_actions: Some(
                        SUPPORTED_ACTIONS.iter().map(ToString::to_string).collect(),
                    ),
                },
            );

            return Ok(());
        }
    };

    res.render(Json(DebugResponse {
        action,
        timestamp: Timestamp::now().to_string(),
        result,
    }));

    Ok(())
}

pub(crate) fn router() -> Router {
    Router::with_path("api/auth/debug")
        .hoop(guard)
        .get(handler)
}

#[cfg(test)]
mod tests {
    use magiclink_app::domain::{
        maintenance::ConnectionReport,
        rate_limits::records::{RateLimitVerdict, VerdictDetail},
    };
    use salvo::test::{ResponseExt, TestClient};
    use testresult::TestResult;

    use crate::{
        config::runtime::AppEnv,
        test_helpers::{Mocks, service},
    };

    use super::*;

    fn make_service(mocks: Mocks, environment: AppEnv) -> Service {
        service(mocks, environment, router())
    }

    #[tokio::test]
    async fn test_production_is_forbidden() -> TestResult {
        let mut mocks = Mocks::default();

        mocks.maintenance.expect_connection_report().never();

        let res = TestClient::get("http://example.com/api/auth/debug?action=connection")
            .send(&make_service(mocks, AppEnv::Production))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::FORBIDDEN));

        Ok(())
    }

    #[tokio::test]
    async fn test_connection_reports_store_errors() -> TestResult {
        let mut mocks = Mocks::default();

        mocks
            .maintenance
            .expect_connection_report()
            .once()
            .return_once(|| ConnectionReport {
                connected: false,
                health: None,
                error: Some("connection refused".to_string()),
                error_code: Some("08001".to_string()),
            });

        let mut res = TestClient::get("http://example.com/api/auth/debug?action=connection")
            .send(&make_service(mocks, AppEnv::Development))
            .await;

        let body: DebugResponse = res.take_json().await?;

        assert_eq!(res.status_code, Some(StatusCode::OK));
        assert_eq!(body.action, "connection");
        assert_eq!(body.result["connected"], Value::Bool(false));
        assert_eq!(body.result["errorCode"], "08001");

        Ok(())
    }

    #[tokio::test]
    async fn test_runs_a_check_with_explicit_limits() -> TestResult {
        let mut mocks = Mocks::default();

        mocks
            .rate_limits
            .expect_check_with()
            .once()
            .withf(|dimension, key, limit| {
                *dimension == Dimension::Email
                    && key == "a@example.com"
                    && *limit == DimensionLimit::new(5, 1)
            })
            .return_once(|dimension, _, limit| RateLimitVerdict {
                dimension,
                is_allowed: true,
                remaining_attempts: 1,
                reset_time: Timestamp::UNIX_EPOCH,
                detail: VerdictDetail {
                    attempt_count: 0,
                    max_attempts: limit.max_attempts,
                    window_minutes: limit.window_minutes,
                    degradation: None,
                },
            });

        let mut res = TestClient::get(
            "http://example.com/api/auth/debug?action=test&email=a@example.com&windowMinutes=5&maxAttempts=1",
        )
        .send(&make_service(mocks, AppEnv::Development))
        .await;

        let body: DebugResponse = res.take_json().await?;

        assert_eq!(res.status_code, Some(StatusCode::OK));
        assert_eq!(body.result["isAllowed"], Value::Bool(true));
        assert_eq!(body.result["detail"]["windowMinutes"], 5);

        Ok(())
    }

    async fn rejected_limits(query: &str) -> TestResult {
        let mut mocks = Mocks::default();

        mocks.rate_limits.expect_check_with().never();

        let mut res = TestClient::get(format!(
            "http://example.com/api/auth/debug?action=test&email=a@example.com&{query}"
        ))
        .send(&make_service(mocks, AppEnv::Development))
        .await;

        let body: DebugError = res.take_json().await?;

        assert_eq!(res.status_code, Some(StatusCode::BAD_REQUEST), "{query}");
        assert!(body.error.contains("positive integer"), "{}", body.error);

        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_limits_are_rejected() -> TestResult {
        rejected_limits("windowMinutes=soon").await?;
        rejected_limits("maxAttempts=-1").await
    }

    #[tokio::test]
    async fn test_zero_limits_are_rejected() -> TestResult {
        rejected_limits("windowMinutes=0").await?;
        rejected_limits("windowMinutes=5&maxAttempts=0").await
    }

    #[tokio::test]
    async fn test_email_action_requires_an_email() -> TestResult {
        let mut mocks = Mocks::default();

        mocks.maintenance.expect_email_report().never();

        let res = TestClient::get("http://example.com/api/auth/debug?action=email")
            .send(&make_service(mocks, AppEnv::Development))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::BAD_REQUEST));

        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_action_lists_supported_actions() -> TestResult {
        let mut res = TestClient::get("http://example.com/api/auth/debug?action=drop")
            .send(&make_service(Mocks::default(), AppEnv::Development))
            .await;

        let body: DebugError = res.take_json().await?;

        assert_eq!(res.status_code, Some(StatusCode::BAD_REQUEST));
        assert_eq!(
            body.supported_actions,
            Some(vec![
                "connection".to_string(),
                "email".to_string(),
                "test".to_string()
            ])
        );

        Ok(())
    }
}
