use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, ErrorDetails};

/// Free-tier contact views per calendar day.
pub const DAILY_CONTACT_LIMIT: u64 = 50;

/// Records per page of the gated contact listing.
pub const FREE_TIER_PAGE_SIZE: u64 = 50;

/// Overrides `quota.store.url` when the redis backend is configured.
pub const REDIS_URL_ENV_VAR: &str = "DIRECTORY_REDIS_URL";

const MAX_UTC_OFFSET_SECONDS: i32 = 24 * 60 * 60;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub bind_address: Option<SocketAddr>,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaConfig {
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// Offset of the reference timezone that defines a "day" for every user.
    #[serde(default)]
    pub utc_offset_seconds: i32,
    #[serde(default = "default_upgrade_url")]
    pub upgrade_url: String,
    #[serde(default)]
    pub store: QuotaStoreConfig,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            page_size: default_page_size(),
            utc_offset_seconds: 0,
            upgrade_url: default_upgrade_url(),
            store: QuotaStoreConfig::default(),
        }
    }
}

fn default_daily_limit() -> u64 {
    DAILY_CONTACT_LIMIT
}

fn default_page_size() -> u64 {
    FREE_TIER_PAGE_SIZE
}

fn default_upgrade_url() -> String {
    "/upgrade".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuotaStoreConfig {
    #[default]
    Memory,
    Redis {
        url: String,
        #[serde(default = "default_redis_timeout_ms")]
        timeout_ms: u64,
        #[serde(default = "default_retention_days")]
        retention_days: u32,
    },
}

fn default_redis_timeout_ms() -> u64 {
    100
}

fn default_retention_days() -> u32 {
    7
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ListingConfig {
    Memory {
        /// JSON file with `agencies` and `contacts` arrays loaded at startup.
        #[serde(default)]
        fixture_path: Option<PathBuf>,
    },
}

impl Default for ListingConfig {
    fn default() -> Self {
        ListingConfig::Memory { fixture_path: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    #[serde(default = "default_auth_enabled")]
    pub enabled: bool,
    /// Header carrying the user id, set by an upstream identity proxy.
    pub trusted_header: Option<String>,
    /// SHA-256 API key hash -> user id.
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: default_auth_enabled(),
            trusted_header: None,
            api_keys: HashMap::new(),
        }
    }
}

fn default_auth_enabled() -> bool {
    true
}

impl Config {
    pub async fn load_and_verify_from_path(path: &Path) -> Result<Config, Error> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Failed to read config file `{}`: {e}", path.display()),
            })
        })?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides(std::env::var(REDIS_URL_ENV_VAR).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Config, Error> {
        toml::from_str(contents).map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Failed to parse config: {e}"),
            })
        })
    }

    fn apply_env_overrides(&mut self, redis_url: Option<String>) {
        if let (Some(env_url), QuotaStoreConfig::Redis { url, .. }) =
            (redis_url, &mut self.quota.store)
        {
            tracing::info!("Using redis URL from `{REDIS_URL_ENV_VAR}`");
            *url = env_url;
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        // Both values may only tighten the free tier.
        if !(1..=DAILY_CONTACT_LIMIT).contains(&self.quota.daily_limit) {
            return Err(Error::new(ErrorDetails::Config {
                message: format!(
                    "`quota.daily_limit` must be between 1 and {DAILY_CONTACT_LIMIT}, got {}",
                    self.quota.daily_limit
                ),
            }));
        }
        if !(1..=FREE_TIER_PAGE_SIZE).contains(&self.quota.page_size) {
            return Err(Error::new(ErrorDetails::Config {
                message: format!(
                    "`quota.page_size` must be between 1 and {FREE_TIER_PAGE_SIZE}, got {}",
                    self.quota.page_size
                ),
            }));
        }
        if self.quota.utc_offset_seconds.abs() >= MAX_UTC_OFFSET_SECONDS {
            return Err(Error::new(ErrorDetails::Config {
                message: format!(
                    "`quota.utc_offset_seconds` must be within +/-{MAX_UTC_OFFSET_SECONDS}, got {}",
                    self.quota.utc_offset_seconds
                ),
            }));
        }
        if let QuotaStoreConfig::Redis { timeout_ms, .. } = &self.quota.store {
            if *timeout_ms == 0 {
                return Err(Error::new(ErrorDetails::Config {
                    message: "`quota.store.timeout_ms` must be greater than zero".to_string(),
                }));
            }
        }
        if let Some(header) = &self.auth.trusted_header {
            if http::HeaderName::from_bytes(header.as_bytes()).is_err() {
                return Err(Error::new(ErrorDetails::Config {
                    message: format!("`auth.trusted_header` is not a valid header name: {header}"),
                }));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.quota.daily_limit, 50);
        assert_eq!(config.quota.page_size, 50);
        assert_eq!(config.quota.utc_offset_seconds, 0);
        assert_eq!(config.quota.upgrade_url, "/upgrade");
        assert!(matches!(config.quota.store, QuotaStoreConfig::Memory));
        assert!(matches!(
            config.listing,
            ListingConfig::Memory { fixture_path: None }
        ));
        assert!(config.auth.enabled);
        assert!(config.gateway.bind_address.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_redis_store_config() {
        let config = Config::parse(
            r#"
[quota]
utc_offset_seconds = -18000

[quota.store]
type = "redis"
url = "redis://localhost:6379"
"#,
        )
        .unwrap();

        assert_eq!(config.quota.utc_offset_seconds, -18000);
        match config.quota.store {
            QuotaStoreConfig::Redis {
                url,
                timeout_ms,
                retention_days,
            } => {
                assert_eq!(url, "redis://localhost:6379");
                assert_eq!(timeout_ms, 100);
                assert_eq!(retention_days, 7);
            }
            QuotaStoreConfig::Memory => panic!("expected redis store"),
        }
    }

    #[test]
    fn test_env_override_only_applies_to_redis() {
        let mut config = Config::parse(
            r#"
[quota.store]
type = "redis"
url = "redis://from-file:6379"
"#,
        )
        .unwrap();
        config.apply_env_overrides(Some("redis://from-env:6379".to_string()));
        assert!(matches!(
            &config.quota.store,
            QuotaStoreConfig::Redis { url, .. } if url == "redis://from-env:6379"
        ));

        let mut memory = Config::default();
        memory.apply_env_overrides(Some("redis://from-env:6379".to_string()));
        assert!(matches!(memory.quota.store, QuotaStoreConfig::Memory));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = Config::parse(
            r#"
[quota]
daily_limt = 10
"#,
        )
        .unwrap_err();
        assert!(matches!(err.get_details(), ErrorDetails::Config { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.quota.daily_limit = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.quota.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.quota.utc_offset_seconds = 86_400;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.auth.trusted_header = Some("bad header".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_caps_free_tier_values() {
        let mut config = Config::default();
        config.quota.page_size = FREE_TIER_PAGE_SIZE + 50;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("quota.page_size"));

        let mut config = Config::default();
        config.quota.daily_limit = DAILY_CONTACT_LIMIT + 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.quota.daily_limit = 3;
        config.quota.page_size = 10;
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[gateway]
bind_address = "127.0.0.1:4000"

[auth]
trusted_header = "x-user-id"

[auth.api_keys]
abc123 = "user_1"
"#
        )
        .unwrap();

        let config = Config::load_and_verify_from_path(file.path())
            .await
            .unwrap();
        assert_eq!(
            config.gateway.bind_address,
            Some("127.0.0.1:4000".parse().unwrap())
        );
        assert_eq!(config.auth.trusted_header.as_deref(), Some("x-user-id"));
        assert_eq!(
            config.auth.api_keys.get("abc123").map(String::as_str),
            Some("user_1")
        );
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config = Config::parse(include_str!("../../config/directory.toml")).unwrap();
        config.validate().unwrap();
        assert!(matches!(config.quota.store, QuotaStoreConfig::Redis { .. }));
        assert_eq!(config.auth.api_keys.len(), 1);
        // Identity from a request header is opt-in for deployments behind a proxy
        assert!(config.auth.trusted_header.is_none());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = Config::load_and_verify_from_path(Path::new("/nonexistent/directory.toml"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
