use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::auth::UserId;
use crate::clock::{Clock, ReferenceTimezone, SystemClock};
use crate::error::{Error, ErrorDetails};
use crate::quota::store::QuotaStore;
use crate::quota::QuotaStatus;

/// Metrics for the quota service
#[derive(Debug, Default)]
pub struct QuotaServiceMetrics {
    pub checks_allowed: AtomicU64,
    pub checks_denied: AtomicU64,
    pub checks_unauthenticated: AtomicU64,
    pub views_recorded: AtomicU64,
    pub store_errors: AtomicU64,
}

impl QuotaServiceMetrics {
    fn record_check(&self, status: &QuotaStatus) {
        let result = if status.can_view {
            self.checks_allowed.fetch_add(1, Ordering::Relaxed);
            "allowed"
        } else {
            self.checks_denied.fetch_add(1, Ordering::Relaxed);
            "limit_reached"
        };
        metrics::counter!("contact_quota_checks_total", "result" => result).increment(1);
    }

    fn record_unauthenticated(&self) {
        self.checks_unauthenticated.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("contact_quota_checks_total", "result" => "unauthenticated")
            .increment(1);
    }

    fn record_view(&self) {
        self.views_recorded.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("contact_views_recorded_total").increment(1);
    }

    fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "checks_allowed": self.checks_allowed.load(Ordering::Relaxed),
            "checks_denied": self.checks_denied.load(Ordering::Relaxed),
            "checks_unauthenticated": self.checks_unauthenticated.load(Ordering::Relaxed),
            "views_recorded": self.views_recorded.load(Ordering::Relaxed),
            "store_errors": self.store_errors.load(Ordering::Relaxed),
        })
    }
}

/// Daily contact-view quota.
///
/// The only component that reads or writes view counters. `check_limit` is a pure
/// read and `record_view` a single atomic increment; the two are not
/// combined, so concurrent requests can both pass a check with one credit left and
/// push the count one past the limit.
pub struct QuotaService {
    store: Arc<dyn QuotaStore>,
    clock: Arc<dyn Clock>,
    timezone: ReferenceTimezone,
    daily_limit: u64,
    metrics: QuotaServiceMetrics,
}

impl QuotaService {
    pub fn new(store: Arc<dyn QuotaStore>, timezone: ReferenceTimezone, daily_limit: u64) -> Self {
        Self::new_with_clock(store, Arc::new(SystemClock), timezone, daily_limit)
    }

    pub fn new_with_clock(
        store: Arc<dyn QuotaStore>,
        clock: Arc<dyn Clock>,
        timezone: ReferenceTimezone,
        daily_limit: u64,
    ) -> Self {
        info!(
            "Contact view quota: {daily_limit} per day, day boundary at UTC{}",
            timezone.offset()
        );
        Self {
            store,
            clock,
            timezone,
            daily_limit,
            metrics: QuotaServiceMetrics::default(),
        }
    }

    pub fn daily_limit(&self) -> u64 {
        self.daily_limit
    }

    pub fn metrics(&self) -> &QuotaServiceMetrics {
        &self.metrics
    }

    /// The current quota day in the reference timezone.
    pub fn today(&self) -> NaiveDate {
        self.timezone.view_date(self.clock.now())
    }

    /// Today's usage for `user`. Without a user this returns a denied status and does
    /// not touch the store.
    pub async fn check_limit(&self, user: Option<&UserId>) -> Result<QuotaStatus, Error> {
        let Some(user) = user else {
            self.metrics.record_unauthenticated();
            return Ok(QuotaStatus::denied());
        };

        let today = self.today();
        let viewed_today = self
            .store
            .get_view_count(user, today)
            .await
            .inspect_err(|_| self.metrics.record_store_error())?;

        let status = QuotaStatus::from_usage(viewed_today, self.daily_limit);
        self.metrics.record_check(&status);
        debug!(
            "Quota check for user {user} on {today}: viewed_today={}, remaining={}",
            status.viewed_today, status.remaining
        );
        Ok(status)
    }

    /// Charge one view credit to `user` for today and return the new count.
    ///
    /// No clamp is applied: calling this after the limit was reached still increments.
    pub async fn record_view(&self, user: Option<&UserId>) -> Result<u64, Error> {
        let Some(user) = user else {
            return Err(Error::new(ErrorDetails::Unauthorized {
                message: "Cannot record a contact view without a user id".to_string(),
            }));
        };

        let today = self.today();
        let count = self
            .store
            .increment_view_count(user, today)
            .await
            .inspect_err(|_| self.metrics.record_store_error())?;

        self.metrics.record_view();
        debug!("Recorded contact view for user {user} on {today}: count={count}");
        Ok(count)
    }
}
