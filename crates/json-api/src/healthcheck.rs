//! Healthcheck Handler

use salvo::{oapi::ToSchema, prelude::*};
use serde::{Deserialize, Serialize};

use crate::extensions::*;

/// Healthcheck response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status, `ok` or `degraded`
    pub status: String,

    /// Whether the token store answered
    pub store: bool,
}

/// Healthcheck handler
///
/// Reports whether the token store is reachable; 503 when it is not.
#[endpoint(tags("health"), summary = "Health check endpoint")]
pub(crate) async fn handler(
    depot: &mut Depot,
    res: &mut Response,
) -> Result<Json<HealthResponse>, StatusError> {
    let state = depot.state_or_500()?;
    let store = state.app.maintenance.connection_report().await.connected;

    if !store {
        res.status_code(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(HealthResponse {
        status: if store { "ok" } else { "degraded" }.to_string(),
        store,
    }))
}
