//! Bounded route labels for span names and metrics.

const ROUTES: [&str; 7] = [
    "/api/auth/magic-link",
    "/api/auth/debug",
    "/auth/callback",
    "/auth/session",
    "/healthcheck",
    "/metrics",
    "/api-doc/openapi.json",
];

const DOCS_PREFIX: &str = "/docs";
const UNMATCHED: &str = "{unmatched}";

/// The route `path` belongs to; anything unknown collapses into one label.
pub(super) fn route_label(path: &str) -> &'static str {
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    if let Some(route) = ROUTES.into_iter().find(|route| *route == path) {
        return route;
    }

    if path == DOCS_PREFIX || path.starts_with("/docs/") {
        return DOCS_PREFIX;
    }

    UNMATCHED
}
