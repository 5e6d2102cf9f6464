use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Error, ErrorDetails};
use crate::listing::{
    Agency, AgencyFilter, AgencySummary, Contact, ContactFilter, DirectoryStats, ListingService,
};

/// A contact as stored in a fixture file, linked to its agency by id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
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
    pub agency_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryFixture {
    #[serde(default)]
    pub agencies: Vec<Agency>,
    #[serde(default)]
    pub contacts: Vec<ContactRecord>,
}

/// Directory held entirely in memory, sorted once at construction.
#[derive(Debug, Default)]
pub struct InMemoryListingService {
    agencies: Vec<Agency>,
    contacts: Vec<Contact>,
}

fn page_bounds(len: usize, page: u64, page_size: u64) -> Result<(usize, usize), Error> {
    if page == 0 {
        return Err(Error::new(ErrorDetails::InvalidRequest {
            message: "Pages are numbered from 1".to_string(),
        }));
    }
    let skip = usize::try_from((page - 1).saturating_mul(page_size)).unwrap_or(usize::MAX);
    let take = usize::try_from(page_size).unwrap_or(usize::MAX);
    let start = skip.min(len);
    let end = start.saturating_add(take).min(len);
    Ok((start, end))
}

impl InMemoryListingService {
    pub fn new(fixture: DirectoryFixture) -> Self {
        let DirectoryFixture {
            mut agencies,
            contacts,
        } = fixture;
        agencies.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        let summaries: HashMap<&str, AgencySummary> = agencies
            .iter()
            .map(|a| (a.id.as_str(), AgencySummary::from(a)))
            .collect();

        let mut contacts: Vec<Contact> = contacts
            .into_iter()
            .map(|record| {
                let agency = record.agency_id.as_deref().and_then(|id| {
                    let summary = summaries.get(id).cloned();
                    if summary.is_none() {
                        warn!(
                            "Contact `{}` references unknown agency `{id}`",
                            record.id
                        );
                    }
                    summary
                });
                Contact {
                    id: record.id,
                    first_name: record.first_name,
                    last_name: record.last_name,
                    email: record.email,
                    phone: record.phone,
                    title: record.title,
                    department: record.department,
                    agency,
                }
            })
            .collect();
        contacts.sort_by(|a, b| {
            a.last_name
                .cmp(&b.last_name)
                .then_with(|| a.first_name.cmp(&b.first_name))
                .then_with(|| a.id.cmp(&b.id))
        });

        Self { agencies, contacts }
    }

    pub async fn load(path: &Path) -> Result<Self, Error> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Failed to read directory fixture `{}`: {e}", path.display()),
            })
        })?;
        let fixture: DirectoryFixture = serde_json::from_str(&contents).map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!(
                    "Failed to parse directory fixture `{}`: {e}",
                    path.display()
                ),
            })
        })?;
        let service = Self::new(fixture);
        info!(
            "Loaded {} agencies and {} contacts from `{}`",
            service.agencies.len(),
            service.contacts.len(),
            path.display()
        );
        Ok(service)
    }
}

#[async_trait]
impl ListingService for InMemoryListingService {
    async fn count_contacts(&self, filter: &ContactFilter) -> Result<u64, Error> {
        Ok(self.contacts.iter().filter(|c| filter.matches(c)).count() as u64)
    }

    async fn fetch_contacts(
        &self,
        filter: &ContactFilter,
        page: u64,
        page_size: u64,
    ) -> Result<Vec<Contact>, Error> {
        let matching: Vec<&Contact> = self.contacts.iter().filter(|c| filter.matches(c)).collect();
        let (start, end) = page_bounds(matching.len(), page, page_size)?;
        Ok(matching[start..end].iter().map(|c| (*c).clone()).collect())
    }

    async fn count_agencies(&self, filter: &AgencyFilter) -> Result<u64, Error> {
        Ok(self.agencies.iter().filter(|a| filter.matches(a)).count() as u64)
    }

    async fn fetch_agencies(
        &self,
        filter: &AgencyFilter,
        page: u64,
        page_size: u64,
    ) -> Result<Vec<Agency>, Error> {
        let matching: Vec<&Agency> = self.agencies.iter().filter(|a| filter.matches(a)).collect();
        let (start, end) = page_bounds(matching.len(), page, page_size)?;
        Ok(matching[start..end].iter().map(|a| (*a).clone()).collect())
    }

    async fn directory_stats(&self) -> Result<DirectoryStats, Error> {
        let states: BTreeSet<&str> = self
            .agencies
            .iter()
            .map(|a| a.state_code.as_str())
            .collect();
        Ok(DirectoryStats {
            agencies: self.agencies.len() as u64,
            contacts: self.contacts.len() as u64,
            states: states.len() as u64,
        })
    }
}
