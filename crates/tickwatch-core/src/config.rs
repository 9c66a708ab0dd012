//! Application configuration: an optional JSON file overlaid with
//! `TICKWATCH_*` environment variables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CacheMode;
use crate::http_client::DEFAULT_TIMEOUT_MS;
use crate::provider_policy::UsagePolicy;
use crate::retry::RetrySettings;
use crate::ProviderId;

pub const ENV_ALPHAVANTAGE_API_KEY: &str = "TICKWATCH_ALPHAVANTAGE_API_KEY";
pub const ENV_COINGECKO_API_KEY: &str = "TICKWATCH_COINGECKO_API_KEY";
pub const ENV_TIMEOUT_MS: &str = "TICKWATCH_TIMEOUT_MS";
pub const ENV_WATCHLIST_PATH: &str = "TICKWATCH_WATCHLIST_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("environment variable {name} has invalid value '{value}'")]
    InvalidEnv { name: &'static str, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub providers: ProvidersConfig,
    /// Per-provider quota overrides; providers left out keep their defaults.
    pub usage: HashMap<ProviderId, UsagePolicy>,
    pub cache: CacheConfig,
    pub retry: RetrySettings,
    pub watchlist_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProvidersConfig {
    pub alphavantage_api_key: Option<String>,
    pub alphavantage_base_url: Option<String>,
    pub coingecko_api_key: Option<String>,
    pub coingecko_base_url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            alphavantage_api_key: None,
            alphavantage_base_url: None,
            coingecko_api_key: None,
            coingecko_base_url: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    pub mode: CacheMode,
    pub search_ttl_secs: u64,
    pub details_ttl_secs: u64,
    pub chart_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mode: CacheMode::Use,
            search_ttl_secs: 300,
            details_ttl_secs: 60,
            chart_ttl_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn search_ttl(&self) -> Duration {
        Duration::from_secs(self.search_ttl_secs)
    }

    pub fn details_ttl(&self) -> Duration {
        Duration::from_secs(self.details_ttl_secs)
    }

    pub fn chart_ttl(&self) -> Duration {
        Duration::from_secs(self.chart_ttl_secs)
    }
}

impl AppConfig {
    /// Reads `path` (when given) and applies the process environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlays values found through `lookup`; blank values are ignored.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(key) = lookup(ENV_ALPHAVANTAGE_API_KEY) {
            self.providers.alphavantage_api_key = Some(key);
        }
        if let Some(key) = lookup(ENV_COINGECKO_API_KEY) {
            self.providers.coingecko_api_key = Some(key);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            self.providers.timeout_ms = raw
                .trim()
                .parse()
                .ok()
                .filter(|timeout: &u64| *timeout > 0)
                .ok_or(ConfigError::InvalidEnv {
                    name: ENV_TIMEOUT_MS,
                    value: raw,
                })?;
        }
        if let Some(path) = lookup(ENV_WATCHLIST_PATH) {
            self.watchlist_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Default quotas with any configured overrides applied.
    pub fn usage_policies(&self) -> HashMap<ProviderId, UsagePolicy> {
        let mut policies = UsagePolicy::defaults();
        policies.extend(self.usage.iter().map(|(provider, policy)| (*provider, *policy)));
        policies
    }
}
