//! Rate limit service.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use mockall::automock;
use smallvec::SmallVec;
use tracing::{debug, error, warn};

use crate::{
    clock::Clock,
    domain::{
        rate_limits::records::{
            CompositeVerdict, Degradation, DegradationPolicy, Dimension, DimensionLimit,
            RateLimitPolicy, RateLimitSubject, RateLimitVerdict, VerdictDetail,
        },
        tokens::{
            errors::TokenStoreError,
            store::{TokenStore, bounded},
        },
    },
};

#[derive(Clone)]
pub struct StoreRateLimitService {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    policy: RateLimitPolicy,
    degradation: DegradationPolicy,
    store_timeout: Duration,
}

impl StoreRateLimitService {
    #[must_use]
    pub fn new(
        store: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
        policy: RateLimitPolicy,
        degradation: DegradationPolicy,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
            degradation,
            store_timeout,
        }
    }

    fn degraded(
        &self,
        dimension: Dimension,
        limit: DimensionLimit,
        error: &TokenStoreError,
    ) -> RateLimitVerdict {
        let now = self.clock.now();
        let code = error.code();

        error!(
            dimension = %dimension,
            policy = %self.degradation,
            code = code.as_deref().unwrap_or("none"),
            error = %error,
            "rate limit store query failed"
        );

        let (is_allowed, remaining_attempts) = match self.degradation {
            DegradationPolicy::FailOpen => {
                warn!(
                    dimension = %dimension,
                    "allowing attempt without a rate limit decision; check the database connection"
                );

                (true, limit.max_attempts)
            }
            DegradationPolicy::FailClosed => (false, 0),
        };

        RateLimitVerdict {
            dimension,
            is_allowed,
            remaining_attempts,
            reset_time: limit.window_end(now),
            detail: VerdictDetail {
                attempt_count: 0,
                max_attempts: limit.max_attempts,
                window_minutes: limit.window_minutes,
                degradation: Some(Degradation {
                    policy: self.degradation,
                    reason: error.to_string(),
                    code,
                }),
            },
        }
    }
}

impl fmt::Debug for StoreRateLimitService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRateLimitService")
            .field("clock", &self.clock)
            .field("policy", &self.policy)
            .field("degradation", &self.degradation)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RateLimitService for StoreRateLimitService {
    fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    fn degradation(&self) -> DegradationPolicy {
        self.degradation
    }

    async fn check(&self, dimension: Dimension, key: &str) -> RateLimitVerdict {
        self.check_with(dimension, key, self.policy.limit_for(dimension))
            .await
    }

    #[tracing::instrument(
        name = "rate_limits.service.check",
        skip(self, key),
        fields(dimension = %dimension, window_minutes = limit.window_minutes, max_attempts = limit.max_attempts)
    )]
    async fn check_with(
        &self,
        dimension: Dimension,
        key: &str,
        limit: DimensionLimit,
    ) -> RateLimitVerdict {
        let now = self.clock.now();

        let attempts = match bounded(
            self.store_timeout,
            self.store
                .window_attempts(dimension, key, limit.window_start(now)),
        )
        .await
        {
            Ok(attempts) => attempts,
            Err(error) => return self.degraded(dimension, limit, &error),
        };

        let max_attempts = u64::from(limit.max_attempts);
        let is_allowed = attempts.count < max_attempts;
        let remaining_attempts =
            u32::try_from(max_attempts.saturating_sub(attempts.count)).unwrap_or(0);

        let reset_time = limit.window_end(attempts.oldest.unwrap_or(now));

        debug!(
            attempt_count = attempts.count,
            is_allowed, remaining_attempts, "evaluated rate limit"
        );

        RateLimitVerdict {
            dimension,
            is_allowed,
            remaining_attempts,
            reset_time,
            detail: VerdictDetail {
                attempt_count: attempts.count,
                max_attempts: limit.max_attempts,
                window_minutes: limit.window_minutes,
                degradation: None,
            },
        }
    }

    #[tracing::instrument(
        name = "rate_limits.service.check_comprehensive",
        skip(self, subject),
        fields(dimensions = tracing::field::Empty, limited_by = tracing::field::Empty)
    )]
    async fn check_comprehensive(&self, subject: RateLimitSubject) -> CompositeVerdict {
        let dimensions = subject.dimensions();

        tracing::Span::current().record("dimensions", dimensions.len());

        let mut verdicts = SmallVec::new();

        for (dimension, key) in dimensions {
            verdicts.push(self.check(dimension, key).await);
        }

        let composite = CompositeVerdict::compose(verdicts);

        if let Some(limited_by) = composite.limited_by {
            tracing::Span::current().record("limited_by", limited_by.as_str());
        }

        composite
    }
}

/// Sliding-window attempt limiting over the token store.
///
/// Checks never fail: store errors are folded into the verdict according to
/// the configured [`DegradationPolicy`].
#[automock]
#[async_trait]
pub trait RateLimitService: Send + Sync {
    /// Configured per-dimension limits.
    fn policy(&self) -> RateLimitPolicy;

    /// How store failures are decided.
    fn degradation(&self) -> DegradationPolicy;

    /// Check one dimension with its configured limit.
    async fn check(&self, dimension: Dimension, key: &str) -> RateLimitVerdict;

    /// Check one dimension with an explicit limit.
    async fn check_with(
        &self,
        dimension: Dimension,
        key: &str,
        limit: DimensionLimit,
    ) -> RateLimitVerdict;

    /// Check every dimension the subject carries. Deny wins.
    async fn check_comprehensive(&self, subject: RateLimitSubject) -> CompositeVerdict;
}
