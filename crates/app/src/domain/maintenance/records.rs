//! Maintenance Records

use jiff::Timestamp;
use serde::Serialize;

use crate::domain::{
    rate_limits::records::RateLimitVerdict,
    tokens::records::{AuthToken, BrowserSession, KeyCount, StoreHealth},
};

/// A cleanup category that could not be completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupFailure {
    pub category: &'static str,
    pub message: String,
}

/// What a cleanup pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub expired_tokens: u64,
    pub used_tokens: u64,
    pub inactive_sessions: u64,
    pub used_codes: u64,
    pub errors: Vec<CleanupFailure>,
    pub processing_time_ms: u64,
}

impl CleanupReport {
    #[must_use]
    pub fn total_deleted(&self) -> u64 {
        self.expired_tokens + self.used_tokens + self.inactive_sessions + self.used_codes
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Aggregate counters and anomaly signals over recent issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringData {
    pub active_tokens: u64,
    pub attempts_last_hour: u64,
    pub attempts_last_day: u64,
    pub attempts_last_week: u64,

    /// Addresses with a burst of requests in the last 15 minutes.
    pub rate_limited_emails: Vec<KeyCount>,

    /// IP addresses with heavy traffic in the last hour.
    pub high_volume_ips: Vec<KeyCount>,

    /// Fingerprints used with several addresses in the last day.
    pub shared_fingerprints: Vec<KeyCount>,

    pub generated_at: Timestamp,
}

impl MonitoringData {
    #[must_use]
    pub fn has_suspicious_activity(&self) -> bool {
        !self.rate_limited_emails.is_empty()
            || !self.high_volume_ips.is_empty()
            || !self.shared_fingerprints.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub cleanup: CleanupReport,
    pub monitoring: Option<MonitoringData>,
}

/// Recent activity for one address.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailHistory {
    pub email: String,
    pub days: u32,
    pub tokens: Vec<AuthToken>,
    pub sessions: Vec<BrowserSession>,
}

/// Store connectivity as seen by the debug endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<StoreHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSummary {
    pub total: u64,
    pub active: u64,
    pub expired: u64,
    pub used: u64,
    pub last_15_minutes: u64,
    pub last_hour: u64,
    pub last_day: u64,
}

impl EmailSummary {
    /// Tally `tokens` relative to `now`.
    #[must_use]
    pub fn tally(tokens: &[AuthToken], now: Timestamp) -> Self {
        let within = |token: &AuthToken, minutes: i64| {
            token.created_at >= crate::clock::shift_minutes(now, -minutes)
        };

        tokens.iter().fold(Self::default(), |mut summary, token| {
            summary.total += 1;

            if token.is_used() {
                summary.used += 1;
            } else if token.is_expired_at(now) {
                summary.expired += 1;
            } else {
                summary.active += 1;
            }

            summary.last_15_minutes += u64::from(within(token, 15));
            summary.last_hour += u64::from(within(token, 60));
            summary.last_day += u64::from(within(token, 24 * 60));

            summary
        })
    }
}

/// Rate-limit state dump for one address.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailReport {
    pub email: String,
    pub tokens: Vec<AuthToken>,
    pub summary: EmailSummary,
    pub rate_limit: RateLimitVerdict,
}
