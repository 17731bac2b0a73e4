//! Runtime configuration for Jotter clients.
//!
//! Values come from an optional JSON file, then environment overrides. Secret
//! credentials never live in the file; the session token is read from the
//! environment only.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{has_http_scheme, non_blank};

pub const ENV_DB_PATH: &str = "JOTTER_DB_PATH";
pub const ENV_GRAPHQL_URL: &str = "JOTTER_GRAPHQL_URL";
pub const ENV_SESSION_TOKEN: &str = "JOTTER_SESSION_TOKEN";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Local database file; callers pick a platform default when absent
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    /// GraphQL endpoint; sync is disabled without one
    #[serde(default)]
    pub graphql_url: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            graphql_url: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl RemoteConfig {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Tuning for the sync engine and worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    /// Attempts after which an entry is reported as stalled
    pub retry_ceiling: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Period of the full pull; 0 disables it
    pub pull_interval_secs: u64,
    /// Concurrent remote calls per cycle, across distinct notes
    pub max_in_flight: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            retry_ceiling: 5,
            backoff_base_ms: 500,
            backoff_max_ms: 60_000,
            pull_interval_secs: 60,
            max_in_flight: 4,
        }
    }
}

impl SyncSettings {
    pub const fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub const fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub const fn pull_interval(&self) -> Option<Duration> {
        if self.pull_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.pull_interval_secs))
        }
    }

    fn validate(&self) -> Result<()> {
        if self.retry_ceiling == 0 {
            return Err(Error::Config("sync.retry_ceiling must be at least 1".to_string()));
        }
        if self.max_in_flight == 0 {
            return Err(Error::Config("sync.max_in_flight must be at least 1".to_string()));
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(Error::Config(
                "sync.backoff_max_ms must not be below sync.backoff_base_ms".to_string(),
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load a config file; a missing file yields defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|error| Error::Config(format!("invalid config JSON: {error}")))?;
        config.normalized()
    }

    /// Apply `JOTTER_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (testable without touching the process env).
    pub fn apply_env_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(path) = non_blank(lookup(ENV_DB_PATH)) {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(url) = non_blank(lookup(ENV_GRAPHQL_URL)) {
            self.remote.graphql_url = Some(url);
        }
        self.normalized()
    }

    /// Whether a remote endpoint is configured
    pub const fn sync_enabled(&self) -> bool {
        self.remote.graphql_url.is_some()
    }

    fn normalized(mut self) -> Result<Self> {
        self.remote.graphql_url = match non_blank(self.remote.graphql_url.take()) {
            Some(url) => Some(normalize_http_url(url, "remote.graphql_url")?),
            None => None,
        };
        self.sync.validate()?;
        Ok(self)
    }
}

/// Session token from the environment, if any.
pub fn session_token_from_env() -> Option<String> {
    non_blank(std::env::var(ENV_SESSION_TOKEN).ok())
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn normalize_http_url(value: String, field: &str) -> Result<String> {
    if has_http_scheme(&value) {
        Ok(value.trim_end_matches('/').to_string())
    } else {
        Err(Error::Config(format!(
            "config field '{field}' must include http:// or https://"
        )))
    }
}
