//! Failure mapping for handlers.

use std::fmt::Display;

use salvo::prelude::StatusError;
use tracing::error;

pub(crate) trait ResultExt<T> {
    /// Logs the error under `context` and fails the request with a 500 whose
    /// brief is `context`. The error itself never reaches the client.
    fn or_500(self, context: &'static str) -> Result<T, StatusError>;
}

impl<T, E: Display> ResultExt<T> for Result<T, E> {
    fn or_500(self, context: &'static str) -> Result<T, StatusError> {
        self.map_err(|source| {
            error!(error = %source, "{context}");

            StatusError::internal_server_error().brief(context)
        })
    }
}

#[cfg(test)]
mod tests {
    use salvo::{
        prelude::*,
        test::{ResponseExt, TestClient},
    };
    use testresult::TestResult;

    use super::*;

    #[handler]
    async fn failing() -> Result<&'static str, StatusError> {
        Err::<&'static str, _>("connection reset by peer").or_500("failed to load report")
    }

    #[tokio::test]
    async fn errors_become_500_without_leaking_the_source() -> TestResult {
        let mut res = TestClient::get("http://example.com")
            .add_header("accept", "application/json", true)
            .send(&Service::new(Router::new().get(failing)))
            .await;

        let body = res.take_string().await?;

        assert_eq!(res.status_code, Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(body.contains("failed to load report"), "missing brief in {body}");
        assert!(!body.contains("connection reset"), "source leaked in {body}");

        Ok(())
    }
}
