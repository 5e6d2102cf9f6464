use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;

use crate::auth::UserId;
use crate::error::Error;

/// Persistent counter of contact views keyed by (user, calendar day).
///
/// Implementations must make `increment_view_count` a single atomic upsert: concurrent
/// increments for the same key may never be lost.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Views recorded for `user` on `date`, or 0 if no counter exists yet.
    async fn get_view_count(&self, user: &UserId, date: NaiveDate) -> Result<u64, Error>;

    /// Create the counter with a count of 1, or add 1 to it. Returns the new count.
    async fn increment_view_count(&self, user: &UserId, date: NaiveDate) -> Result<u64, Error>;
}

/// Process-local store. Counters do not survive a restart.
#[derive(Debug, Default)]
pub struct InMemoryQuotaStore {
    counters: DashMap<(UserId, NaiveDate), u64>,
}

impl InMemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn get_view_count(&self, user: &UserId, date: NaiveDate) -> Result<u64, Error> {
        Ok(self
            .counters
            .get(&(user.clone(), date))
            .map(|entry| *entry.value())
            .unwrap_or(0))
    }

    async fn increment_view_count(&self, user: &UserId, date: NaiveDate) -> Result<u64, Error> {
        // The entry guard holds the shard lock for the whole read-modify-write.
        let mut entry = self.counters.entry((user.clone(), date)).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }
}
