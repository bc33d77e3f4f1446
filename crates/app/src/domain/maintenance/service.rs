//! Maintenance and monitoring service.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use jiff::SignedDuration;
use mockall::automock;
use tracing::{error, info, warn};

use crate::{
    clock::{Clock, shift_minutes},
    domain::{
        email::normalize_email,
        maintenance::records::{
            CleanupFailure, CleanupReport, ConnectionReport, EmailHistory, EmailReport,
            EmailSummary, MaintenanceReport, MonitoringData,
        },
        rate_limits::{RateLimitService, records::Dimension},
        tokens::{
            TokensService,
            errors::{TokenStoreError, TokensServiceError},
            store::{TokenStore, VolumeKey, bounded},
        },
    },
};

const HOUR: i64 = 60;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;

/// Expired tokens are kept this long before deletion.
pub const EXPIRED_TOKEN_GRACE_MINUTES: i64 = HOUR;

/// Used tokens and codes are kept this long.
pub const USED_RETENTION_MINUTES: i64 = WEEK;

/// Browser sessions idle this long are deleted.
pub const INACTIVE_SESSION_MINUTES: i64 = 30 * DAY;

/// Requests per address within 15 minutes that flag the address.
pub const BURST_EMAIL_THRESHOLD: u64 = 3;

/// Requests per IP within an hour that flag the IP.
pub const HIGH_VOLUME_IP_THRESHOLD: u64 = 10;

/// Distinct addresses per fingerprint within a day that flag the fingerprint.
pub const SHARED_FINGERPRINT_THRESHOLD: u64 = 3;

#[derive(Clone)]
pub struct StoreMaintenanceService {
    store: Arc<dyn TokenStore>,
    tokens: Arc<dyn TokensService>,
    rate_limits: Arc<dyn RateLimitService>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl StoreMaintenanceService {
    #[must_use]
    pub fn new(
        store: Arc<dyn TokenStore>,
        tokens: Arc<dyn TokensService>,
        rate_limits: Arc<dyn RateLimitService>,
        clock: Arc<dyn Clock>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            tokens,
            rate_limits,
            clock,
            store_timeout,
        }
    }

    async fn delete<F>(&self, call: F) -> Result<u64, TokensServiceError>
    where
        F: Future<Output = Result<u64, TokenStoreError>>,
    {
        Ok(bounded(self.store_timeout, call).await?)
    }

    /// Run one deletion category, recording its failure instead of aborting.
    async fn sweep<F>(&self, category: &'static str, call: F, report: &mut CleanupReport) -> u64
    where
        F: Future<Output = Result<u64, TokensServiceError>>,
    {
        match call.await {
            Ok(deleted) => deleted,
            Err(source) => {
                let message = match &source {
                    TokensServiceError::Persistence(store) => store.to_string(),
                    other => other.to_string(),
                };

                error!(category, error = %message, code = source.code(), "cleanup step failed");

                report.errors.push(CleanupFailure { category, message });

                0
            }
        }
    }
}

impl fmt::Debug for StoreMaintenanceService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreMaintenanceService")
            .field("clock", &self.clock)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MaintenanceService for StoreMaintenanceService {
    #[tracing::instrument(name = "maintenance.service.perform_cleanup", skip(self))]
    async fn perform_cleanup(&self) -> CleanupReport {
        let started = std::time::Instant::now();
        let now = self.clock.now();
        let mut report = CleanupReport::default();

        report.expired_tokens = self
            .sweep(
                "expired_tokens",
                self.tokens
                    .purge_expired(SignedDuration::from_mins(EXPIRED_TOKEN_GRACE_MINUTES)),
                &mut report,
            )
            .await;

        report.used_tokens = self
            .sweep(
                "used_tokens",
                self.delete(self.store.delete_used_before(shift_minutes(now, -USED_RETENTION_MINUTES))),
                &mut report,
            )
            .await;

        report.inactive_sessions = self
            .sweep(
                "inactive_sessions",
                self.delete(self.store.delete_inactive_sessions(shift_minutes(now, -INACTIVE_SESSION_MINUTES))),
                &mut report,
            )
            .await;

        report.used_codes = self
            .sweep(
                "used_codes",
                self.delete(self.store.delete_used_codes_before(shift_minutes(now, -USED_RETENTION_MINUTES))),
                &mut report,
            )
            .await;

        report.processing_time_ms =
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            deleted = report.total_deleted(),
            failures = report.errors.len(),
            processing_time_ms = report.processing_time_ms,
            "cleanup finished"
        );

        report
    }

    #[tracing::instrument(name = "maintenance.service.monitoring", skip(self), err)]
    async fn monitoring(&self) -> Result<MonitoringData, TokenStoreError> {
        let now = self.clock.now();
        let limit = self.store_timeout;

        let active_tokens = bounded(limit, self.store.count_active_all(now)).await?;
        let attempts_last_hour = bounded(
            limit,
            self.store.count_created_since(shift_minutes(now, -HOUR)),
        )
        .await?;
        let attempts_last_day =
            bounded(limit, self.store.count_created_since(shift_minutes(now, -DAY))).await?;
        let attempts_last_week = bounded(
            limit,
            self.store.count_created_since(shift_minutes(now, -WEEK)),
        )
        .await?;

        let rate_limited_emails = bounded(
            limit,
            self.store.busiest(
                VolumeKey::Email,
                shift_minutes(now, -15),
                BURST_EMAIL_THRESHOLD,
            ),
        )
        .await?;
        let high_volume_ips = bounded(
            limit,
            self.store.busiest(
                VolumeKey::IpAddress,
                shift_minutes(now, -HOUR),
                HIGH_VOLUME_IP_THRESHOLD,
            ),
        )
        .await?;
        let shared_fingerprints = bounded(
            limit,
            self.store
                .shared_fingerprints(shift_minutes(now, -DAY), SHARED_FINGERPRINT_THRESHOLD),
        )
        .await?;

        Ok(MonitoringData {
            active_tokens,
            attempts_last_hour,
            attempts_last_day,
            attempts_last_week,
            rate_limited_emails,
            high_volume_ips,
            shared_fingerprints,
            generated_at: now,
        })
    }

    #[tracing::instrument(name = "maintenance.service.run_maintenance", skip(self))]
    async fn run_maintenance(&self) -> MaintenanceReport {
        let cleanup = self.perform_cleanup().await;

        let monitoring = match self.monitoring().await {
            Ok(data) => {
                if data.has_suspicious_activity() {
                    warn!(
                        rate_limited_emails = data.rate_limited_emails.len(),
                        high_volume_ips = data.high_volume_ips.len(),
                        shared_fingerprints = data.shared_fingerprints.len(),
                        "suspicious sign-in activity detected"
                    );
                }

                Some(data)
            }
            Err(source) => {
                error!(error = %source, code = source.code(), "monitoring failed");

                None
            }
        };

        MaintenanceReport {
            cleanup,
            monitoring,
        }
    }

    #[tracing::instrument(name = "maintenance.service.email_history", skip(self, email), err)]
    async fn email_history(&self, email: &str, days: u32) -> Result<EmailHistory, TokenStoreError> {
        let email = normalize_email(email);
        let since = shift_minutes(self.clock.now(), -(i64::from(days) * DAY));

        let tokens = bounded(self.store_timeout, self.store.list_for_email(&email, since)).await?;
        let sessions = bounded(
            self.store_timeout,
            self.store.list_sessions_for_email(&email, since),
        )
        .await?;

        Ok(EmailHistory {
            email,
            days,
            tokens,
            sessions,
        })
    }

    #[tracing::instrument(name = "maintenance.service.connection_report", skip(self))]
    async fn connection_report(&self) -> ConnectionReport {
        match bounded(self.store_timeout, self.store.health()).await {
            Ok(health) => ConnectionReport {
                connected: true,
                health: Some(health),
                error: None,
                error_code: None,
            },
            Err(source) => {
                error!(error = %source, code = source.code(), "store health check failed");

                ConnectionReport {
                    connected: false,
                    health: None,
                    error: Some(source.to_string()),
                    error_code: source.code(),
                }
            }
        }
    }

    #[tracing::instrument(name = "maintenance.service.email_report", skip(self, email), err)]
    async fn email_report(&self, email: &str) -> Result<EmailReport, TokenStoreError> {
        let email = normalize_email(email);
        let now = self.clock.now();

        let tokens = bounded(
            self.store_timeout,
            self.store.list_for_email(&email, shift_minutes(now, -DAY)),
        )
        .await?;

        let summary = EmailSummary::tally(&tokens, now);
        let rate_limit = self.rate_limits.check(Dimension::Email, &email).await;

        Ok(EmailReport {
            email,
            tokens,
            summary,
            rate_limit,
        })
    }
}

/// Scheduled housekeeping and operator introspection over the token store.
#[automock]
#[async_trait]
pub trait MaintenanceService: Send + Sync {
    /// Delete stale rows. Each category runs even when another fails.
    async fn perform_cleanup(&self) -> CleanupReport;

    /// Aggregate counters and anomaly signals.
    async fn monitoring(&self) -> Result<MonitoringData, TokenStoreError>;

    /// Cleanup followed by monitoring, warning on suspicious activity.
    async fn run_maintenance(&self) -> MaintenanceReport;

    /// Tokens and browser sessions of `email` from the last `days` days.
    async fn email_history(&self, email: &str, days: u32) -> Result<EmailHistory, TokenStoreError>;

    async fn connection_report(&self) -> ConnectionReport;

    /// The last day of tokens for `email` and its current email verdict.
    async fn email_report(&self, email: &str) -> Result<EmailReport, TokenStoreError>;
}
