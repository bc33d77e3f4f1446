//! Rate Limit Records

use std::{fmt, str::FromStr};

use jiff::Timestamp;
use serde::Serialize;
use smallvec::SmallVec;
use thiserror::Error;

/// A key space attempts are counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Dimension {
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "ip")]
    IpAddress,
    #[serde(rename = "fingerprint")]
    BrowserFingerprint,
}

impl Dimension {
    /// Precedence order used when attributing a denial.
    pub const ALL: [Self; 3] = [Self::Email, Self::IpAddress, Self::BrowserFingerprint];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::IpAddress => "ip",
            Self::BrowserFingerprint => "fingerprint",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Window length and attempt ceiling for one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionLimit {
    pub window_minutes: u32,
    pub max_attempts: u32,
}

impl DimensionLimit {
    #[must_use]
    pub const fn new(window_minutes: u32, max_attempts: u32) -> Self {
        Self {
            window_minutes,
            max_attempts,
        }
    }

    #[must_use]
    pub fn window_start(self, now: Timestamp) -> Timestamp {
        crate::clock::shift_minutes(now, -i64::from(self.window_minutes))
    }

    #[must_use]
    pub fn window_end(self, from: Timestamp) -> Timestamp {
        crate::clock::shift_minutes(from, i64::from(self.window_minutes))
    }
}

/// Per-dimension limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicy {
    pub email: DimensionLimit,
    pub ip_address: DimensionLimit,
    pub browser_fingerprint: DimensionLimit,
}

impl RateLimitPolicy {
    #[must_use]
    pub const fn limit_for(&self, dimension: Dimension) -> DimensionLimit {
        match dimension {
            Dimension::Email => self.email,
            Dimension::IpAddress => self.ip_address,
            Dimension::BrowserFingerprint => self.browser_fingerprint,
        }
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            email: DimensionLimit::new(15, 3),
            ip_address: DimensionLimit::new(60, 10),
            browser_fingerprint: DimensionLimit::new(30, 5),
        }
    }
}

/// What to decide when the store cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DegradationPolicy {
    FailOpen,
    FailClosed,
}

impl DegradationPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FailOpen => "fail-open",
            Self::FailClosed => "fail-closed",
        }
    }
}

impl fmt::Display for DegradationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown degradation policy `{0}`, expected `fail-open` or `fail-closed`")]
pub struct UnknownDegradationPolicy(String);

impl FromStr for DegradationPolicy {
    type Err = UnknownDegradationPolicy;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fail-open" | "open" => Ok(Self::FailOpen),
            "fail-closed" | "closed" => Ok(Self::FailClosed),
            _ => Err(UnknownDegradationPolicy(value.to_string())),
        }
    }
}

/// Why a verdict was produced without a store answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Degradation {
    pub policy: DegradationPolicy,
    pub reason: String,
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictDetail {
    pub attempt_count: u64,
    pub max_attempts: u32,
    pub window_minutes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degradation: Option<Degradation>,
}

/// Decision for a single dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitVerdict {
    pub dimension: Dimension,
    pub is_allowed: bool,
    pub remaining_attempts: u32,
    pub reset_time: Timestamp,
    pub detail: VerdictDetail,
}

impl RateLimitVerdict {
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.detail.degradation.is_some()
    }
}

/// Combined decision across every evaluated dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeVerdict {
    pub is_allowed: bool,
    pub limited_by: Option<Dimension>,
    pub verdicts: SmallVec<[RateLimitVerdict; 3]>,
}

impl CompositeVerdict {
    /// Deny wins; the first denying dimension in precedence order is blamed.
    #[must_use]
    pub fn compose(mut verdicts: SmallVec<[RateLimitVerdict; 3]>) -> Self {
        verdicts.sort_by_key(|verdict| verdict.dimension);

        let limited_by = verdicts
            .iter()
            .find(|verdict| !verdict.is_allowed)
            .map(|verdict| verdict.dimension);

        Self {
            is_allowed: limited_by.is_none(),
            limited_by,
            verdicts,
        }
    }

    #[must_use]
    pub fn verdict(&self, dimension: Dimension) -> Option<&RateLimitVerdict> {
        self.verdicts
            .iter()
            .find(|verdict| verdict.dimension == dimension)
    }

    /// The verdict callers should report: the limiting one, else the email one.
    #[must_use]
    pub fn primary(&self) -> Option<&RateLimitVerdict> {
        self.limited_by
            .and_then(|dimension| self.verdict(dimension))
            .or_else(|| self.verdict(Dimension::Email))
            .or_else(|| self.verdicts.first())
    }

    /// Smallest remaining allowance across every evaluated dimension.
    #[must_use]
    pub fn tightest_remaining(&self) -> u32 {
        self.verdicts
            .iter()
            .map(|verdict| verdict.remaining_attempts)
            .min()
            .unwrap_or(0)
    }

    /// Latest reset among the denying dimensions, or the primary reset when allowed.
    #[must_use]
    pub fn reset_time(&self) -> Option<Timestamp> {
        if self.is_allowed {
            return self.primary().map(|verdict| verdict.reset_time);
        }

        self.verdicts
            .iter()
            .filter(|verdict| !verdict.is_allowed)
            .map(|verdict| verdict.reset_time)
            .max()
    }

    #[must_use]
    pub fn degradations(&self) -> impl Iterator<Item = &Degradation> {
        self.verdicts
            .iter()
            .filter_map(|verdict| verdict.detail.degradation.as_ref())
    }
}

/// Keys available for one attempt. Email is always present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitSubject {
    pub email: String,
    pub ip_address: Option<String>,
    pub browser_fingerprint: Option<String>,
}

impl RateLimitSubject {
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_ip_address(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address.filter(|value| !value.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_browser_fingerprint(mut self, fingerprint: Option<String>) -> Self {
        self.browser_fingerprint = fingerprint.filter(|value| !value.trim().is_empty());
        self
    }

    /// Dimensions to evaluate with their keys, in precedence order.
    #[must_use]
    pub fn dimensions(&self) -> SmallVec<[(Dimension, &str); 3]> {
        let mut dimensions = SmallVec::new();

        dimensions.push((Dimension::Email, self.email.as_str()));

        if let Some(ip_address) = self.ip_address.as_deref() {
            dimensions.push((Dimension::IpAddress, ip_address));
        }

        if let Some(fingerprint) = self.browser_fingerprint.as_deref() {
            dimensions.push((Dimension::BrowserFingerprint, fingerprint));
        }

        dimensions
    }
}
