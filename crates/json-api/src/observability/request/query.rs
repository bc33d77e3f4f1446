//! Query strings as written to the access log.

use url::form_urlencoded;

/// Parameters carrying an address or a sign-in secret.
const REDACTED_PARAMS: [&str; 3] = ["email", "code", "code_verifier"];
const MASK: &str = "***";

/// Re-encodes `query` with the values of sensitive parameters masked.
pub(super) fn redact(query: &str) -> String {
    let pairs = form_urlencoded::parse(query.as_bytes()).map(|(key, value)| {
        if REDACTED_PARAMS.iter().any(|param| key == *param) {
            (key, MASK.into())
        } else {
            (key, value)
        }
    });

    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}
