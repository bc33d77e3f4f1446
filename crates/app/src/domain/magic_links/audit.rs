//! Authentication audit events.
//!
//! Emitted on the `magiclink::audit` target so they can be routed separately
//! from operational logs.

use jiff::Timestamp;
use tracing::{info, warn};

use crate::domain::{rate_limits::records::Dimension, tokens::records::TokenContext};

pub const AUDIT_TARGET: &str = "magiclink::audit";

pub(crate) fn magic_link_sent(email: &str, context: &TokenContext, tracked: bool) {
    info!(
        target: AUDIT_TARGET,
        event = "magic_link_sent",
        email,
        ip_address = context.ip_address.as_deref(),
        browser_fingerprint = context.browser_fingerprint.as_deref(),
        tracked,
    );
}

pub(crate) fn magic_link_rate_limited(
    email: &str,
    context: &TokenContext,
    limited_by: Dimension,
    reset_time: Timestamp,
) {
    warn!(
        target: AUDIT_TARGET,
        event = "magic_link_rate_limited",
        email,
        ip_address = context.ip_address.as_deref(),
        browser_fingerprint = context.browser_fingerprint.as_deref(),
        limited_by = limited_by.as_str(),
        reset_time = %reset_time,
    );
}

pub(crate) fn magic_link_delivery_failed(email: &str, context: &TokenContext) {
    warn!(
        target: AUDIT_TARGET,
        event = "magic_link_delivery_failed",
        email,
        ip_address = context.ip_address.as_deref(),
    );
}

pub(crate) fn sign_in_completed(user_id: &str, email: Option<&str>, context: &TokenContext) {
    info!(
        target: AUDIT_TARGET,
        event = "sign_in_completed",
        user_id,
        email,
        ip_address = context.ip_address.as_deref(),
        browser_fingerprint = context.browser_fingerprint.as_deref(),
    );
}

pub(crate) fn sign_in_failed(reason: &str, context: &TokenContext) {
    warn!(
        target: AUDIT_TARGET,
        event = "sign_in_failed",
        reason,
        ip_address = context.ip_address.as_deref(),
    );
}
