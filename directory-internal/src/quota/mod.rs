pub mod redis_store;
pub mod service;
pub mod store;

pub use redis_store::RedisQuotaStore;
pub use service::{QuotaService, QuotaServiceMetrics};
pub use store::{InMemoryQuotaStore, QuotaStore};

use serde::Serialize;

/// Today's contact-view usage for one user.
///
/// Serialized with the field names the listing pages and the limit endpoint expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub can_view: bool,
    pub remaining: u64,
    pub viewed_today: u64,
}

impl QuotaStatus {
    /// Status reported when there is no user to look up.
    pub fn denied() -> Self {
        Self {
            can_view: false,
            remaining: 0,
            viewed_today: 0,
        }
    }

    pub fn from_usage(viewed_today: u64, daily_limit: u64) -> Self {
        Self {
            can_view: viewed_today < daily_limit,
            remaining: daily_limit.saturating_sub(viewed_today),
            viewed_today,
        }
    }
}
