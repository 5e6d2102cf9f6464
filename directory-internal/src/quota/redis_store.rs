use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError, Script};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::auth::UserId;
use crate::error::{Error, ErrorDetails, StoreKind};
use crate::quota::store::QuotaStore;

const COUNTER_KEY_PREFIX: &str = "contact_views:";

fn store_unavailable(message: String) -> Error {
    metrics::counter!("quota_store_errors_total", "store" => "quota").increment(1);
    Error::new(ErrorDetails::StoreUnavailable {
        store: StoreKind::Quota,
        message,
    })
}

/// Redis key holding the counter for one (user, day) pair.
///
/// The date is the fixed-width last segment, so user ids containing `:` cannot collide.
pub fn counter_key(user: &UserId, date: NaiveDate) -> String {
    format!("{COUNTER_KEY_PREFIX}{}:{}", user.as_str(), date.format("%Y-%m-%d"))
}

/// Quota store backed by Redis counters.
///
/// Each counter is a plain integer key. Increments run as a Lua script so the
/// create-or-increment and the retention TTL happen in one server-side step.
pub struct RedisQuotaStore {
    client: redis::Client,
    connection: Arc<RwLock<Option<MultiplexedConnection>>>,
    timeout: Duration,
    retention_seconds: u64,
    increment_script: Script,
}

impl RedisQuotaStore {
    /// Create the store. An unreachable server is not fatal here: every call retries
    /// the connection and reports `StoreUnavailable` until it succeeds.
    pub async fn new(redis_url: &str, timeout_ms: u64, retention_days: u32) -> Result<Self, Error> {
        let client = redis::Client::open(redis_url).map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Failed to create Redis client for contact view quotas: {e}"),
            })
        })?;
        let request_timeout = Duration::from_millis(timeout_ms);

        let connection =
            match timeout(request_timeout, client.get_multiplexed_async_connection()).await {
                Ok(Ok(conn)) => {
                    info!("Connected to Redis for contact view quotas");
                    Some(conn)
                }
                Ok(Err(e)) => {
                    warn!("Failed to connect to Redis for contact view quotas: {e}");
                    None
                }
                Err(_) => {
                    warn!("Timed out connecting to Redis for contact view quotas");
                    None
                }
            };

        let increment_script = Script::new(
            r#"
            local count = redis.call('INCR', KEYS[1])
            if count == 1 then
                redis.call('EXPIRE', KEYS[1], ARGV[1])
            end
            return count
            "#,
        );

        Ok(Self {
            client,
            connection: Arc::new(RwLock::new(connection)),
            timeout: request_timeout,
            retention_seconds: u64::from(retention_days.max(1)) * 24 * 60 * 60,
            increment_script,
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, Error> {
        if let Some(conn) = self.connection.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let mut guard = self.connection.write().await;
        // Another request may have reconnected while we waited for the lock
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = timeout(self.timeout, self.client.get_multiplexed_async_connection())
            .await
            .map_err(|_| store_unavailable("Timed out connecting to Redis".to_string()))?
            .map_err(|e| store_unavailable(format!("Failed to connect to Redis: {e}")))?;
        info!("Reconnected to Redis for contact view quotas");
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn handle_redis_error(&self, operation: &str, e: RedisError) -> Error {
        if e.is_connection_dropped() || e.is_io_error() || e.is_connection_refusal() {
            debug!("Dropping Redis connection after {operation} failure");
            *self.connection.write().await = None;
        }
        store_unavailable(format!("Redis {operation} failed: {e}"))
    }
}

#[async_trait]
impl QuotaStore for RedisQuotaStore {
    async fn get_view_count(&self, user: &UserId, date: NaiveDate) -> Result<u64, Error> {
        let mut conn = self.connection().await?;
        let key = counter_key(user, date);

        match timeout(self.timeout, conn.get::<_, Option<u64>>(&key)).await {
            Ok(Ok(count)) => Ok(count.unwrap_or(0)),
            Ok(Err(e)) => Err(self.handle_redis_error("GET", e).await),
            Err(_) => Err(store_unavailable(format!(
                "Redis GET timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    async fn increment_view_count(&self, user: &UserId, date: NaiveDate) -> Result<u64, Error> {
        let mut conn = self.connection().await?;
        let key = counter_key(user, date);

        let mut invocation = self.increment_script.key(&key);
        invocation.arg(self.retention_seconds);
        let result: Result<Result<u64, RedisError>, _> =
            timeout(self.timeout, invocation.invoke_async(&mut conn)).await;

        match result {
            Ok(Ok(count)) => Ok(count),
            Ok(Err(e)) => Err(self.handle_redis_error("increment", e).await),
            // The script may still have run; the caller treats the view as uncharged
            Err(_) => Err(store_unavailable(format!(
                "Redis increment timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Nothing listens on port 1, so connections are refused immediately.
    const UNREACHABLE_REDIS: &str = "redis://127.0.0.1:1";

    #[test]
    fn test_counter_key_format() {
        let user = UserId::new("user_2abc").unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 1, 9).unwrap();
        assert_eq!(counter_key(&user, date), "contact_views:user_2abc:2025-01-09");
    }

    #[test]
    fn test_counter_keys_do_not_collide_on_separator() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 9).unwrap();
        let next = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        let tricky = UserId::new("a:2025-01-09").unwrap();
        let plain = UserId::new("a").unwrap();
        assert_ne!(counter_key(&tricky, next), counter_key(&plain, date));
    }

    #[tokio::test]
    async fn test_invalid_url_is_config_error() {
        let err = RedisQuotaStore::new("not a url", 100, 7)
            .await
            .err()
            .unwrap();
        assert!(matches!(err.get_details(), ErrorDetails::Config { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_store_unavailable() {
        let store = RedisQuotaStore::new(UNREACHABLE_REDIS, 200, 7).await.unwrap();
        let user = UserId::new("user_a").unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 1, 9).unwrap();

        let err = store.get_view_count(&user, date).await.unwrap_err();
        assert!(matches!(
            err.get_details(),
            ErrorDetails::StoreUnavailable {
                store: StoreKind::Quota,
                ..
            }
        ));

        let err = store.increment_view_count(&user, date).await.unwrap_err();
        assert!(err.is_store_unavailable());
    }
}
