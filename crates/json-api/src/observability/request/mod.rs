//! Access logging: one span per request carrying the request id, the client
//! and the sign-in outcome, closed by a single event sized by status.

mod parent_context;
mod query;
mod request_ids;
mod routes;

use std::time::Instant;

use opentelemetry::global;
use salvo::{
    Request, handler,
    prelude::{Depot, FlowCtrl, Response},
};
use tracing::{Instrument as _, error, field::Empty, info, warn};
use tracing_opentelemetry::OpenTelemetrySpanExt as _;

use crate::extensions::*;

use super::{metrics, settings};

const REQUEST_ID_DEPOT_KEY: &str = "request_id";
const MAGIC_LINK_OUTCOME_DEPOT_KEY: &str = "magic_link_outcome";

/// Counts a magic-link outcome and tags the current request's span with it.
pub(crate) fn record_magic_link_outcome(depot: &mut Depot, outcome: &'static str) {
    metrics::record_magic_link_outcome(outcome);

    depot.insert(MAGIC_LINK_OUTCOME_DEPOT_KEY, outcome);
}

#[handler]
pub(crate) async fn request_logging(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
    ctrl: &mut FlowCtrl,
) {
    let route = routes::route_label(req.uri().path());

    if route == "/metrics" {
        ctrl.call_next(req, depot, res).await;

        return;
    }

    let started = Instant::now();
    let _in_flight = metrics::InFlightRequestGuard::track();

    let request_id =
        request_ids::resolve_request_id(req.header::<String>(request_ids::REQUEST_ID_HEADER));

    depot.insert(REQUEST_ID_DEPOT_KEY, request_id.clone());
    request_ids::set_request_id_header(res, &request_id);

    let method = req.method().to_string();
    let client_ip = req
        .client_ip()
        .unwrap_or_else(|| req.remote_addr().to_string());

    let span = tracing::info_span!(
        parent: None,
        "http.request",
        otel.name = %format!("{method} {route}"),
        otel.kind = "server",
        request_id = %request_id,
        method = %method,
        path = %req.uri().path(),
        query = %req.uri().query().map(query::redact).unwrap_or_default(),
        client_ip = %client_ip,
        fingerprint = req.header_str(FINGERPRINT_HEADER).is_some(),
        magic_link.outcome = Empty,
        status = Empty,
        duration_ms = Empty,
    );

    if settings::trace_parent_propagation()
        && let Some(parent) = global::get_text_map_propagator(|propagator| {
            parent_context::remote_parent(req.headers(), propagator)
        })
        && let Err(source) = span.set_parent(parent)
    {
        warn!("failed to attach remote parent to request span: {source}");
    }

    ctrl.call_next(req, depot, res)
        .instrument(span.clone())
        .await;

    let elapsed = started.elapsed();
    let status = request_ids::response_status_or_ok(res.status_code).as_u16();
    let duration_ms = elapsed.as_millis();

    metrics::observe_request(&method, route, status, elapsed.as_secs_f64());

    if let Ok(outcome) = depot.get::<&'static str>(MAGIC_LINK_OUTCOME_DEPOT_KEY) {
        span.record("magic_link.outcome", *outcome);
    }

    span.record("status", status);
    span.record("duration_ms", duration_ms);

    let threshold_ms = u128::from(settings::slow_request_threshold_ms());

    span.in_scope(|| {
        match status {
            500.. => error!(status, duration_ms, "request failed"),
            400..=499 => warn!(status, duration_ms, "request rejected"),
            _ => info!(status, duration_ms, "request completed"),
        }

        if duration_ms > threshold_ms {
            warn!(duration_ms, threshold_ms, "slow request");
        }
    });
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
    async fn sent(depot: &mut Depot, res: &mut Response) {
        record_magic_link_outcome(depot, "sent");

        res.render("ok");
    }

    #[handler]
    async fn echo_request_id(depot: &mut Depot, res: &mut Response) {
        let request_id = depot
            .get::<String>(REQUEST_ID_DEPOT_KEY)
            .cloned()
            .unwrap_or_default();

        res.render(request_id);
    }

    fn service() -> Service {
        Service::new(
            Router::new()
                .hoop(request_logging)
                .push(Router::with_path("api/auth/magic-link").post(sent))
                .push(Router::with_path("echo").get(echo_request_id)),
        )
    }

    #[tokio::test]
    async fn supplied_request_id_is_echoed_and_shared() -> TestResult {
        let mut res = TestClient::get("http://example.com/echo")
            .add_header(request_ids::REQUEST_ID_HEADER, "req-42", true)
            .send(&service())
            .await;

        let header = res
            .headers()
            .get(request_ids::REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        assert_eq!(header.as_deref(), Some("req-42"));
        assert_eq!(res.take_string().await?, "req-42");

        Ok(())
    }

    #[tokio::test]
    async fn outcome_reaches_the_counter() -> TestResult {
        let res = TestClient::post("http://example.com/api/auth/magic-link?email=a%40example.com")
            .add_header(FINGERPRINT_HEADER, "fp-1", true)
            .send(&service())
            .await;

        assert_eq!(res.status_code, Some(StatusCode::OK));

        let exposition = TestClient::get("http://example.com/metrics")
            .send(&Service::new(
                Router::with_path("metrics").get(metrics::metrics_handler),
            ))
            .await
            .take_string()
            .await?;

        assert!(
            exposition.contains("magiclink_json_magic_link_outcomes_total{outcome=\"sent\"}"),
            "expected the sent outcome to be counted"
        );

        Ok(())
    }
}
