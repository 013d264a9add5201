//! Data layer configuration.
//!
//! Nothing here is read from ambient globals at call time: a `Config` is
//! loaded once at process start and handed to [`Resolver::new`](crate::Resolver::new).
//!
//! The file lives at `~/.config/cohortcache/config.json`; every section falls
//! back to defaults, and credentials can be supplied through the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config directory paths
const APP_NAME: &str = "cohortcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const ENV_API_KEY: &str = "COHORTCACHE_API_KEY";
const ENV_BASE_ID: &str = "COHORTCACHE_BASE_ID";
const ENV_BASE_URL: &str = "COHORTCACHE_BASE_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub tables: TableNames,
    pub throttle: ThrottleConfig,
    pub retry: RetryConfig,
    pub cache: CacheTtls,
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub base_id: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Per-request HTTP timeout.
    /// 30s matches the service's own gateway timeout.
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.airtable.com/v0".to_string(),
            base_id: String::new(),
            api_key: String::new(),
            request_timeout_secs: 30,
        }
    }
}

/// External table names. Renamed tables only need a config change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
    pub contacts: String,
    pub institutions: String,
    pub initiatives: String,
    pub cohorts: String,
    pub topics: String,
    pub classes: String,
    pub teams: String,
    pub members: String,
    pub participation: String,
    pub submissions: String,
    pub milestones: String,
    pub events: String,
    pub partnerships: String,
    pub rewards: String,
    pub claimed_rewards: String,
    pub achievements: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            contacts: "Contacts".to_string(),
            institutions: "Institutions".to_string(),
            initiatives: "Initiatives".to_string(),
            cohorts: "Cohorts".to_string(),
            topics: "Topics".to_string(),
            classes: "Classes".to_string(),
            teams: "Teams".to_string(),
            members: "Members".to_string(),
            participation: "Participation".to_string(),
            submissions: "Submissions".to_string(),
            milestones: "Milestones".to_string(),
            events: "Events".to_string(),
            partnerships: "Partnerships".to_string(),
            rewards: "Rewards".to_string(),
            claimed_rewards: "Claimed Rewards".to_string(),
            achievements: "Earned Achievements".to_string(),
        }
    }
}

/// Outbound request ceiling.
/// The service allows 5 requests per second per base; exceeding it earns a
/// 30 second lockout, so the default sits exactly at the documented limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub max_concurrent: usize,
    pub requests_per_second: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            requests_per_second: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts for a rate-limited request, first attempt included.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Extra random delay, as a fraction of the current backoff.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 250,
            max_backoff_ms: 2000,
            jitter: 0.25,
        }
    }
}

/// Cache lifetimes by entity volatility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtls {
    /// Institutions, initiatives, cohorts, topics, classes, milestones, rewards.
    pub slow_secs: u64,
    pub events_secs: u64,
    /// Teams, points, participation, submissions, partnerships, contacts.
    pub volatile_secs: u64,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            slow_secs: 30 * 60,
            events_secs: 5 * 60,
            volatile_secs: 2 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Budget for a read resolver before it degrades to a partial result.
    pub read_budget_ms: u64,
    /// Budget for a mutation before it fails with a timeout.
    pub mutation_budget_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_budget_ms: 8000,
            mutation_budget_ms: 15000,
        }
    }
}

impl TimeoutConfig {
    pub fn read_budget(&self) -> Duration {
        Duration::from_millis(self.read_budget_ms)
    }

    pub fn mutation_budget(&self) -> Duration {
        Duration::from_millis(self.mutation_budget_ms)
    }
}

impl Config {
    /// Load from the default location, falling back to defaults when absent.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Override credentials and endpoint from the environment.
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(ENV_API_KEY) {
            self.api.api_key = key;
        }
        if let Some(base) = lookup(ENV_BASE_ID) {
            self.api.base_id = base;
        }
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.api.base_url = url;
        }
    }

    /// Fail early on settings the HTTP backend cannot work without.
    pub fn validate(&self) -> Result<()> {
        if self.api.api_key.is_empty() {
            anyhow::bail!("No API key configured (set {})", ENV_API_KEY);
        }
        if self.api.base_id.is_empty() {
            anyhow::bail!("No base id configured (set {})", ENV_BASE_ID);
        }
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let json = r#"{"throttle": {"requests_per_second": 2.5}, "tables": {"events": "Program Events"}}"#;
        let config: Config = serde_json::from_str(json).expect("parse config");
        assert_eq!(config.throttle.requests_per_second, 2.5);
        assert_eq!(config.throttle.max_concurrent, 5);
        assert_eq!(config.tables.events, "Program Events");
        assert_eq!(config.tables.contacts, "Contacts");
        assert_eq!(config.timeouts.read_budget(), Duration::from_secs(8));
        assert_eq!(config.retry.max_attempts, 4);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        assert!(config.validate().is_err());
        config.apply_vars(|name| match name {
            ENV_API_KEY => Some("pat123".to_string()),
            ENV_BASE_ID => Some("appXYZ".to_string()),
            _ => None,
        });
        assert_eq!(config.api.api_key, "pat123");
        assert_eq!(config.api.base_id, "appXYZ");
        assert_eq!(config.api.base_url, "https://api.airtable.com/v0");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_api_key_never_serialized() {
        let mut config = Config::default();
        config.api.api_key = "secret".to_string();
        let json = serde_json::to_string(&config).expect("serialize");
        assert!(!json.contains("secret"));
    }
}
