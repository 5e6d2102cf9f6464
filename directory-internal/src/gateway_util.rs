use std::sync::Arc;

use tracing::{info, warn};

use crate::access_gate::AccessGate;
use crate::auth::AuthenticationInfo;
use crate::clock::ReferenceTimezone;
use crate::config_parser::{Config, ListingConfig, QuotaStoreConfig};
use crate::error::Error;
use crate::listing::{InMemoryListingService, ListingService};
use crate::quota::{InMemoryQuotaStore, QuotaService, QuotaStore, RedisQuotaStore};

/// State for the gateway
#[derive(Clone)]
pub struct AppStateData {
    pub config: Arc<Config>,
    pub quota: Arc<QuotaService>,
    pub listing: Arc<dyn ListingService>,
    pub access_gate: Arc<AccessGate>,
    pub authentication_info: AuthenticationInfo,
}
pub type AppState = axum::extract::State<AppStateData>;

impl AppStateData {
    pub async fn new(config: Arc<Config>) -> Result<Self, Error> {
        let quota_store = setup_quota_store(&config.quota.store).await?;
        let listing = setup_listing(&config.listing).await?;
        let authentication_info = AuthenticationInfo::from_config(&config.auth)?;

        let timezone = ReferenceTimezone::from_offset_seconds(config.quota.utc_offset_seconds)?;
        let quota = Arc::new(QuotaService::new(
            quota_store,
            timezone,
            config.quota.daily_limit,
        ));
        let access_gate = Arc::new(AccessGate::new(
            quota.clone(),
            listing.clone(),
            config.quota.page_size,
            config.quota.upgrade_url.clone(),
        ));

        Ok(Self {
            config,
            quota,
            listing,
            access_gate,
            authentication_info,
        })
    }
}

pub async fn setup_quota_store(config: &QuotaStoreConfig) -> Result<Arc<dyn QuotaStore>, Error> {
    match config {
        QuotaStoreConfig::Memory => {
            warn!("Using the in-memory quota store: contact view counts reset on restart and are not shared between replicas");
            Ok(Arc::new(InMemoryQuotaStore::new()))
        }
        QuotaStoreConfig::Redis {
            url,
            timeout_ms,
            retention_days,
        } => {
            let store = RedisQuotaStore::new(url, *timeout_ms, *retention_days).await?;
            info!("Using the redis quota store (timeout {timeout_ms}ms, retention {retention_days} days)");
            Ok(Arc::new(store))
        }
    }
}

pub async fn setup_listing(config: &ListingConfig) -> Result<Arc<dyn ListingService>, Error> {
    match config {
        ListingConfig::Memory {
            fixture_path: Some(path),
        } => Ok(Arc::new(InMemoryListingService::load(path).await?)),
        ListingConfig::Memory { fixture_path: None } => {
            warn!("No `listing.fixture_path` configured, so the directory is empty");
            Ok(Arc::new(InMemoryListingService::default()))
        }
    }
}
