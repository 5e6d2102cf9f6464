use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;
use tracing::{debug, warn};

use crate::auth::UserId;
use crate::error::{Error, ErrorDetails};
use crate::listing::{listing_unavailable, total_pages, Contact, ContactFilter, ListingService};
use crate::quota::{QuotaService, QuotaStatus};

/// Only the first page of contacts is ever unlocked on the free tier.
pub const UNLOCKED_PAGES: u64 = 1;

/// What the caller is told about its quota and the requested page.
///
/// `remaining` and `viewed_today` are the values observed before this request was
/// charged, matching the usage indicator rendered alongside the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecision {
    pub can_view: bool,
    pub remaining: u64,
    pub viewed_today: u64,
    pub is_page_locked: bool,
    pub effective_total: u64,
}

impl AccessDecision {
    fn from_status(status: QuotaStatus, is_page_locked: bool, effective_total: u64) -> Self {
        Self {
            can_view: status.can_view,
            remaining: status.remaining,
            viewed_today: status.viewed_today,
            is_page_locked,
            effective_total,
        }
    }
}

/// Terminal state of one gated listing request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AccessOutcome {
    Denied {
        decision: AccessDecision,
    },
    LimitReached {
        decision: AccessDecision,
        upgrade_url: String,
    },
    PageLocked {
        decision: AccessDecision,
        total: u64,
        total_pages: u64,
        unlocked_pages: u64,
    },
    Served {
        decision: AccessDecision,
        contacts: Vec<Contact>,
        total: u64,
        total_pages: u64,
    },
}

impl AccessOutcome {
    pub fn decision(&self) -> &AccessDecision {
        match self {
            AccessOutcome::Denied { decision }
            | AccessOutcome::LimitReached { decision, .. }
            | AccessOutcome::PageLocked { decision, .. }
            | AccessOutcome::Served { decision, .. } => decision,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AccessOutcome::Denied { .. } => "denied",
            AccessOutcome::LimitReached { .. } => "limit_reached",
            AccessOutcome::PageLocked { .. } => "page_locked",
            AccessOutcome::Served { .. } => "served",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AccessOutcome::Denied { .. } => StatusCode::UNAUTHORIZED,
            AccessOutcome::LimitReached { .. } => StatusCode::PAYMENT_REQUIRED,
            AccessOutcome::PageLocked { .. } => StatusCode::FORBIDDEN,
            AccessOutcome::Served { .. } => StatusCode::OK,
        }
    }
}

impl IntoResponse for AccessOutcome {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

/// Combines the daily quota with the requested page number.
pub struct AccessGate {
    quota: Arc<QuotaService>,
    listing: Arc<dyn ListingService>,
    page_size: u64,
    upgrade_url: String,
}

impl AccessGate {
    pub fn new(
        quota: Arc<QuotaService>,
        listing: Arc<dyn ListingService>,
        page_size: u64,
        upgrade_url: String,
    ) -> Self {
        Self {
            quota,
            listing,
            page_size,
            upgrade_url,
        }
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Resolve one request for `page` of the contact listing.
    ///
    /// A quota store failure is returned as `StoreUnavailable` and never becomes
    /// `LimitReached` or `Served`. A listing failure is returned the same way and leaves
    /// the quota untouched. The view is charged exactly once, only after the page and the
    /// total were both fetched.
    pub async fn evaluate(
        &self,
        user: Option<&UserId>,
        page: i64,
        filter: &ContactFilter,
    ) -> Result<AccessOutcome, Error> {
        let page = u64::try_from(page)
            .ok()
            .filter(|p| *p >= 1)
            .ok_or_else(|| {
                Error::new(ErrorDetails::InvalidRequest {
                    message: format!("Page must be a positive integer, got {page}"),
                })
            })?;

        let outcome = match user {
            None => {
                let status = self.quota.check_limit(None).await?;
                AccessOutcome::Denied {
                    decision: AccessDecision::from_status(status, false, 0),
                }
            }
            Some(user) => self.evaluate_for_user(user, page, filter).await?,
        };

        metrics::counter!("contact_access_outcomes_total", "outcome" => outcome.label())
            .increment(1);
        Ok(outcome)
    }

    async fn evaluate_for_user(
        &self,
        user: &UserId,
        page: u64,
        filter: &ContactFilter,
    ) -> Result<AccessOutcome, Error> {
        let status = self.quota.check_limit(Some(user)).await?;

        if !status.can_view {
            debug!(
                "User {user} reached the daily contact limit ({} views)",
                status.viewed_today
            );
            return Ok(AccessOutcome::LimitReached {
                decision: AccessDecision::from_status(status, false, 0),
                upgrade_url: self.upgrade_url.clone(),
            });
        }

        if page > UNLOCKED_PAGES {
            let total = self
                .listing
                .count_contacts(filter)
                .await
                .map_err(listing_unavailable)?;
            return Ok(AccessOutcome::PageLocked {
                decision: AccessDecision::from_status(status, true, total.min(self.page_size)),
                total,
                total_pages: total_pages(total, self.page_size),
                unlocked_pages: UNLOCKED_PAGES,
            });
        }

        let (contacts, total) = tokio::try_join!(
            self.listing.fetch_contacts(filter, page, self.page_size),
            self.listing.count_contacts(filter),
        )
        .map_err(listing_unavailable)?;

        if let Err(e) = self.quota.record_view(Some(user)).await {
            // The fetch succeeded, so the page is served even when the charge fails
            warn!("Serving contacts page to user {user} without charging a view: {e}");
        }

        Ok(AccessOutcome::Served {
            decision: AccessDecision::from_status(status, false, total.min(self.page_size)),
            contacts,
            total,
            total_pages: total_pages(total, self.page_size),
        })
    }
}
