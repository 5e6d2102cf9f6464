use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use directory_internal::auth::UserId;
use directory_internal::clock::ReferenceTimezone;
use directory_internal::config_parser::REDIS_URL_ENV_VAR;
use directory_internal::quota::redis_store::counter_key;
use directory_internal::quota::{QuotaService, QuotaStore, RedisQuotaStore};

const RETENTION_DAYS: u32 = 7;
const RETENTION_SECONDS: i64 = RETENTION_DAYS as i64 * 24 * 60 * 60;

fn redis_url() -> String {
    std::env::var(REDIS_URL_ENV_VAR).unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// A user id no other test run has written counters for.
fn fresh_user(name: &str) -> UserId {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    UserId::new(format!("e2e_{name}_{}_{nanos}_{n}", std::process::id())).unwrap()
}

fn test_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 5, 1).unwrap()
}

async fn make_store() -> RedisQuotaStore {
    RedisQuotaStore::new(&redis_url(), 1_000, RETENTION_DAYS)
        .await
        .unwrap()
}

async fn raw_connection() -> redis::aio::MultiplexedConnection {
    redis::Client::open(redis_url())
        .unwrap()
        .get_multiplexed_async_connection()
        .await
        .unwrap()
}

async fn ttl(conn: &mut redis::aio::MultiplexedConnection, key: &str) -> i64 {
    redis::cmd("TTL").arg(key).query_async::<i64>(conn).await.unwrap()
}

async fn delete(conn: &mut redis::aio::MultiplexedConnection, key: &str) {
    redis::cmd("DEL").arg(key).query_async::<i64>(conn).await.unwrap();
}

#[tokio::test]
async fn test_missing_counter_reads_as_zero() {
    let store = make_store().await;
    let user = fresh_user("missing");
    assert_eq!(store.get_view_count(&user, test_date()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_first_increment_creates_counter_with_ttl() {
    let store = make_store().await;
    let mut conn = raw_connection().await;
    let user = fresh_user("first");
    let key = counter_key(&user, test_date());

    assert_eq!(store.increment_view_count(&user, test_date()).await.unwrap(), 1);
    let remaining = ttl(&mut conn, &key).await;
    assert!(
        remaining > 0 && remaining <= RETENTION_SECONDS,
        "unexpected TTL {remaining}"
    );

    assert_eq!(store.increment_view_count(&user, test_date()).await.unwrap(), 2);
    assert_eq!(store.get_view_count(&user, test_date()).await.unwrap(), 2);

    delete(&mut conn, &key).await;
}

#[tokio::test]
async fn test_later_increments_keep_existing_ttl() {
    let store = make_store().await;
    let mut conn = raw_connection().await;
    let user = fresh_user("ttl");
    let key = counter_key(&user, test_date());

    store.increment_view_count(&user, test_date()).await.unwrap();
    // Shorten the expiry so a reset to the full retention would be visible
    redis::cmd("EXPIRE")
        .arg(&key)
        .arg(100)
        .query_async::<i64>(&mut conn)
        .await
        .unwrap();

    assert_eq!(store.increment_view_count(&user, test_date()).await.unwrap(), 2);
    let remaining = ttl(&mut conn, &key).await;
    assert!(
        remaining > 0 && remaining <= 100,
        "increment reset the TTL to {remaining}"
    );

    delete(&mut conn, &key).await;
}

#[tokio::test]
async fn test_counters_are_per_day() {
    let store = make_store().await;
    let mut conn = raw_connection().await;
    let user = fresh_user("days");
    let next_day = test_date().succ_opt().unwrap();

    store.increment_view_count(&user, test_date()).await.unwrap();
    store.increment_view_count(&user, test_date()).await.unwrap();
    assert_eq!(store.get_view_count(&user, next_day).await.unwrap(), 0);
    assert_eq!(store.increment_view_count(&user, next_day).await.unwrap(), 1);

    delete(&mut conn, &counter_key(&user, test_date())).await;
    delete(&mut conn, &counter_key(&user, next_day)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_increments_are_never_lost() {
    const INCREMENTS: u64 = 64;
    let store = Arc::new(make_store().await);
    let mut conn = raw_connection().await;
    let user = fresh_user("concurrent");

    let handles: Vec<_> = (0..INCREMENTS)
        .map(|_| {
            let store = store.clone();
            let user = user.clone();
            tokio::spawn(async move { store.increment_view_count(&user, test_date()).await })
        })
        .collect();

    let mut returned = BTreeSet::new();
    for handle in handles {
        returned.insert(handle.await.unwrap().unwrap());
    }

    // Every increment observed a distinct post-increment value
    assert_eq!(returned, (1..=INCREMENTS).collect::<BTreeSet<_>>());
    assert_eq!(
        store.get_view_count(&user, test_date()).await.unwrap(),
        INCREMENTS
    );

    delete(&mut conn, &counter_key(&user, test_date())).await;
}

#[tokio::test]
async fn test_quota_service_over_redis() {
    let service = QuotaService::new(Arc::new(make_store().await), ReferenceTimezone::utc(), 50);
    let mut conn = raw_connection().await;
    let user = fresh_user("service");

    let status = service.check_limit(Some(&user)).await.unwrap();
    assert!(status.can_view);
    assert_eq!(status.remaining, 50);
    assert_eq!(status.viewed_today, 0);

    assert_eq!(service.record_view(Some(&user)).await.unwrap(), 1);
    assert_eq!(service.record_view(Some(&user)).await.unwrap(), 2);

    let status = service.check_limit(Some(&user)).await.unwrap();
    assert_eq!(status.viewed_today, 2);
    assert_eq!(status.remaining, 48);

    delete(&mut conn, &counter_key(&user, service.today())).await;
}
