//! Email address handling shared by every service.

use std::sync::LazyLock;

use regex::Regex;

static EMAIL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Canonical form used for storage and every rate-limit key.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Shallow syntax check; deliverability is the broker's concern.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254
        && EMAIL_PATTERN
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(email))
}
