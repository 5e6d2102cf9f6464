#![cfg(test)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::access_gate::AccessGate;
use crate::auth::{AuthenticationInfo, UserId};
use crate::clock::{Clock, ReferenceTimezone};
use crate::config_parser::Config;
use crate::error::{Error, ErrorDetails, StoreKind};
use crate::gateway_util::AppStateData;
use crate::listing::memory::ContactRecord;
use crate::listing::{
    Agency, AgencyFilter, Contact, ContactFilter, DirectoryFixture, DirectoryStats,
    InMemoryListingService, ListingService,
};
use crate::quota::{InMemoryQuotaStore, QuotaService, QuotaStore};

pub const TEST_NOW: &str = "2025-05-01T09:00:00Z";

fn parse_instant(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .unwrap()
        .with_timezone(&Utc)
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(rfc3339: &str) -> Self {
        Self {
            now: Mutex::new(parse_instant(rfc3339)),
        }
    }

    pub fn set(&self, rfc3339: &str) {
        *self.now.lock().unwrap() = parse_instant(rfc3339);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

fn quota_down() -> Error {
    Error::new(ErrorDetails::StoreUnavailable {
        store: StoreKind::Quota,
        message: "connection refused".to_string(),
    })
}

fn listing_down() -> Error {
    Error::new(ErrorDetails::StoreUnavailable {
        store: StoreKind::Listing,
        message: "connection refused".to_string(),
    })
}

/// Quota store whose every call fails as if the backend were unreachable.
pub struct FailingQuotaStore;

#[async_trait]
impl QuotaStore for FailingQuotaStore {
    async fn get_view_count(&self, _user: &UserId, _date: NaiveDate) -> Result<u64, Error> {
        Err(quota_down())
    }

    async fn increment_view_count(&self, _user: &UserId, _date: NaiveDate) -> Result<u64, Error> {
        Err(quota_down())
    }
}

/// In-memory quota store that counts increments and can be told to fail only writes.
#[derive(Default)]
pub struct CountingQuotaStore {
    inner: InMemoryQuotaStore,
    pub increments: AtomicUsize,
    pub fail_increments: bool,
}

impl CountingQuotaStore {
    pub fn failing_increments() -> Self {
        Self {
            fail_increments: true,
            ..Self::default()
        }
    }

    pub fn increments(&self) -> usize {
        self.increments.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuotaStore for CountingQuotaStore {
    async fn get_view_count(&self, user: &UserId, date: NaiveDate) -> Result<u64, Error> {
        self.inner.get_view_count(user, date).await
    }

    async fn increment_view_count(&self, user: &UserId, date: NaiveDate) -> Result<u64, Error> {
        self.increments.fetch_add(1, Ordering::SeqCst);
        if self.fail_increments {
            return Err(quota_down());
        }
        self.inner.increment_view_count(user, date).await
    }
}

/// Wraps the in-memory listing and records how it was called.
pub struct RecordingListingService {
    inner: InMemoryListingService,
    pub fail: bool,
    pub contact_fetches: AtomicUsize,
    pub contact_counts: AtomicUsize,
}

impl RecordingListingService {
    pub fn new(contacts: usize) -> Self {
        Self {
            inner: InMemoryListingService::new(sample_fixture(contacts)),
            fail: false,
            contact_fetches: AtomicUsize::new(0),
            contact_counts: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(0)
        }
    }

    pub fn contact_fetches(&self) -> usize {
        self.contact_fetches.load(Ordering::SeqCst)
    }

    pub fn contact_counts(&self) -> usize {
        self.contact_counts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListingService for RecordingListingService {
    async fn count_contacts(&self, filter: &ContactFilter) -> Result<u64, Error> {
        self.contact_counts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(listing_down());
        }
        self.inner.count_contacts(filter).await
    }

    async fn fetch_contacts(
        &self,
        filter: &ContactFilter,
        page: u64,
        page_size: u64,
    ) -> Result<Vec<Contact>, Error> {
        self.contact_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(listing_down());
        }
        self.inner.fetch_contacts(filter, page, page_size).await
    }

    async fn count_agencies(&self, filter: &AgencyFilter) -> Result<u64, Error> {
        if self.fail {
            return Err(listing_down());
        }
        self.inner.count_agencies(filter).await
    }

    async fn fetch_agencies(
        &self,
        filter: &AgencyFilter,
        page: u64,
        page_size: u64,
    ) -> Result<Vec<Agency>, Error> {
        if self.fail {
            return Err(listing_down());
        }
        self.inner.fetch_agencies(filter, page, page_size).await
    }

    async fn directory_stats(&self) -> Result<DirectoryStats, Error> {
        if self.fail {
            return Err(listing_down());
        }
        self.inner.directory_stats().await
    }
}

/// Two agencies (TX and IL) and `contacts` contacts split between them.
pub fn sample_fixture(contacts: usize) -> DirectoryFixture {
    let agencies = vec![
        Agency {
            id: "agency_springfield".to_string(),
            name: "Springfield City Clerk".to_string(),
            state: "Illinois".to_string(),
            state_code: "IL".to_string(),
            agency_type: "city".to_string(),
            county: Some("Sangamon".to_string()),
            website: Some("https://springfield.il.us".to_string()),
            population: Some(114_394),
        },
        Agency {
            id: "agency_austin".to_string(),
            name: "Austin Public Works".to_string(),
            state: "Texas".to_string(),
            state_code: "TX".to_string(),
            agency_type: "city".to_string(),
            county: Some("Travis".to_string()),
            website: None,
            population: Some(961_855),
        },
    ];

    let first_names = ["Maria", "James", "Aisha", "Chen", "Olga"];
    let contacts = (0..contacts)
        .map(|i| ContactRecord {
            id: format!("contact_{i:04}"),
            first_name: first_names[i % first_names.len()].to_string(),
            // Reverse order so that fixture order differs from sorted order
            last_name: format!("Lastname{:04}", contacts - i),
            email: Some(format!("person{i}@example.gov")),
            phone: None,
            title: Some(if i % 3 == 0 { "Director" } else { "Analyst" }.to_string()),
            department: Some(if i % 2 == 0 { "Finance" } else { "Parks" }.to_string()),
            agency_id: Some(agencies[i % agencies.len()].id.clone()),
        })
        .collect();

    DirectoryFixture { agencies, contacts }
}

pub fn test_user() -> UserId {
    UserId::new("user_test").unwrap()
}

pub fn quota_service(store: Arc<dyn QuotaStore>) -> Arc<QuotaService> {
    Arc::new(QuotaService::new_with_clock(
        store,
        Arc::new(ManualClock::at(TEST_NOW)),
        ReferenceTimezone::utc(),
        50,
    ))
}

pub fn get_unit_test_app_state_data(
    quota_store: Arc<dyn QuotaStore>,
    listing: Arc<dyn ListingService>,
) -> AppStateData {
    let config = Arc::new(Config::default());
    let quota = quota_service(quota_store);
    let access_gate = Arc::new(AccessGate::new(
        quota.clone(),
        listing.clone(),
        config.quota.page_size,
        config.quota.upgrade_url.clone(),
    ));
    AppStateData {
        config,
        quota,
        listing,
        access_gate,
        authentication_info: AuthenticationInfo::Disabled,
    }
}
