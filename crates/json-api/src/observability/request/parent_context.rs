//! Remote parent from W3C trace context headers.

use opentelemetry::{
    Context,
    propagation::{Extractor, TextMapPropagator},
    trace::TraceContextExt as _,
};
use salvo::http::HeaderMap;

const TRACE_CONTEXT_HEADERS: [&str; 2] = ["traceparent", "tracestate"];

/// Exposes only the trace context headers to the propagator.
#[derive(Debug)]
struct TraceContextHeaders<'a>(&'a HeaderMap);

impl Extractor for TraceContextHeaders<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        if !TRACE_CONTEXT_HEADERS.contains(&key) {
            return None;
        }

        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        TRACE_CONTEXT_HEADERS
            .into_iter()
            .filter(|key| self.0.contains_key(*key))
            .collect()
    }
}

/// The caller's span as a parent context, when it sent a valid `traceparent`.
///
/// Extraction starts from an empty context so a request without trace
/// headers starts a new trace.
pub(super) fn remote_parent(
    headers: &HeaderMap,
    propagator: &dyn TextMapPropagator,
) -> Option<Context> {
    let context = propagator.extract_with_context(&Context::new(), &TraceContextHeaders(headers));
    let is_valid = context.span().span_context().is_valid();

    is_valid.then_some(context)
}

#[cfg(test)]
mod tests {
    use opentelemetry_sdk::propagation::TraceContextPropagator;
    use salvo::http::header::HeaderValue;

    use super::*;

    const TRACE_ID: &str = "4bf92f3577b34da6a3ce929d0e0e4736";

    fn headers(traceparent: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert("traceparent", HeaderValue::from_static(traceparent));

        headers
    }

    #[test]
    fn valid_traceparent_is_continued() {
        let parent = remote_parent(
            &headers("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"),
            &TraceContextPropagator::new(),
        );

        assert_eq!(
            parent.map(|context| context.span().span_context().trace_id().to_string()),
            Some(TRACE_ID.to_string())
        );
    }

    #[test]
    fn malformed_traceparent_starts_a_new_trace() {
        let parent = remote_parent(&headers("00-not-a-trace-01"), &TraceContextPropagator::new());

        assert!(parent.is_none(), "expected no remote parent");
    }

    #[test]
    fn missing_headers_start_a_new_trace() {
        let parent = remote_parent(&HeaderMap::new(), &TraceContextPropagator::new());

        assert!(parent.is_none(), "expected no remote parent");
    }
}
