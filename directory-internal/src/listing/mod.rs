pub mod memory;

pub use memory::{DirectoryFixture, InMemoryListingService};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorDetails, StoreKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agency {
    pub id: String,
    pub name: String,
    pub state: String,
    pub state_code: String,
    #[serde(rename = "type")]
    pub agency_type: String,
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub population: Option<u64>,
}

/// The slice of an agency shown next to each contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgencySummary {
    pub name: String,
    pub state_code: String,
}

impl From<&Agency> for AgencySummary {
    fn from(agency: &Agency) -> Self {
        Self {
            name: agency.name.clone(),
            state_code: agency.state_code.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub agency: Option<AgencySummary>,
}

fn contains_ignore_case(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn normalized(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Contact query: `search` is a case-insensitive substring over name, email and title;
/// `state_code` and `department` are exact matches. Empty strings mean "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContactFilter {
    pub search: Option<String>,
    pub state_code: Option<String>,
    pub department: Option<String>,
}

impl ContactFilter {
    pub fn new(
        search: Option<String>,
        state_code: Option<String>,
        department: Option<String>,
    ) -> Self {
        Self {
            search: normalized(search),
            state_code: normalized(state_code),
            department: normalized(department),
        }
    }

    pub fn matches(&self, contact: &Contact) -> bool {
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let hit = contains_ignore_case(&contact.first_name, &needle)
                || contains_ignore_case(&contact.last_name, &needle)
                || contact
                    .email
                    .as_deref()
                    .is_some_and(|e| contains_ignore_case(e, &needle))
                || contact
                    .title
                    .as_deref()
                    .is_some_and(|t| contains_ignore_case(t, &needle));
            if !hit {
                return false;
            }
        }
        if let Some(state_code) = &self.state_code {
            if contact.agency.as_ref().map(|a| &a.state_code) != Some(state_code) {
                return false;
            }
        }
        if let Some(department) = &self.department {
            if contact.department.as_ref() != Some(department) {
                return false;
            }
        }
        true
    }
}

/// Agency query: `search` covers name and county.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AgencyFilter {
    pub search: Option<String>,
    pub state_code: Option<String>,
    pub agency_type: Option<String>,
}

impl AgencyFilter {
    pub fn new(
        search: Option<String>,
        state_code: Option<String>,
        agency_type: Option<String>,
    ) -> Self {
        Self {
            search: normalized(search),
            state_code: normalized(state_code),
            agency_type: normalized(agency_type),
        }
    }

    pub fn matches(&self, agency: &Agency) -> bool {
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let hit = contains_ignore_case(&agency.name, &needle)
                || agency
                    .county
                    .as_deref()
                    .is_some_and(|c| contains_ignore_case(c, &needle));
            if !hit {
                return false;
            }
        }
        if self
            .state_code
            .as_ref()
            .is_some_and(|s| *s != agency.state_code)
        {
            return false;
        }
        if self
            .agency_type
            .as_ref()
            .is_some_and(|t| *t != agency.agency_type)
        {
            return false;
        }
        true
    }
}

/// Map a failed listing call to `StoreUnavailable { store: listing }`. Bad paging input
/// keeps its `InvalidRequest` so it is not reported as an outage.
pub fn listing_unavailable(e: Error) -> Error {
    if matches!(e.get_details(), ErrorDetails::InvalidRequest { .. }) {
        return e;
    }
    metrics::counter!("quota_store_errors_total", "store" => "listing").increment(1);
    if matches!(e.get_details(), ErrorDetails::StoreUnavailable { .. }) {
        return e;
    }
    Error::new(ErrorDetails::StoreUnavailable {
        store: StoreKind::Listing,
        message: e.to_string(),
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryStats {
    pub agencies: u64,
    pub contacts: u64,
    pub states: u64,
}

/// `ceil(total / page_size)`; zero records means zero pages.
pub fn total_pages(total: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}

/// Read-only access to the agency/contact directory.
///
/// Pages are 1-indexed. Implementations must return records in a deterministic order so
/// that repeated requests for the same page within a day see the same records.
#[async_trait]
pub trait ListingService: Send + Sync {
    async fn count_contacts(&self, filter: &ContactFilter) -> Result<u64, Error>;

    async fn fetch_contacts(
        &self,
        filter: &ContactFilter,
        page: u64,
        page_size: u64,
    ) -> Result<Vec<Contact>, Error>;

    async fn count_agencies(&self, filter: &AgencyFilter) -> Result<u64, Error>;

    async fn fetch_agencies(
        &self,
        filter: &AgencyFilter,
        page: u64,
        page_size: u64,
    ) -> Result<Vec<Agency>, Error>;

    async fn directory_stats(&self) -> Result<DirectoryStats, Error>;
}
