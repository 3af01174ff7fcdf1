//! # Engine Configuration
//!
//! Configuration for the server, the database and both remote APIs.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     MERIDIAN_REMOTE_API_KEY=key...                                     │
//! │     MERIDIAN_POS_TOKEN=token...                                        │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/meridian/meridian.toml (Linux)                           │
//! │     ~/Library/Application Support/com.meridian.sync/meridian.toml      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [server]
//! bind_addr = "127.0.0.1:8080"
//!
//! [database]
//! path = "meridian.db"
//! max_connections = 25
//!
//! [remote]
//! base_url = "https://api.airtable.com/v0"
//! base_id = "appXXXXXXXXXXXXXX"
//! min_request_interval_ms = 200
//!
//! [pos]
//! base_url = "https://api.loyverse.com/v1.0"
//! page_size = 250
//!
//! [sync]
//! run_deadline_secs = 1800
//! advance_on_fetch_failure = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{EngineResult, SyncError};
use crate::retry::RetryPolicy;

const CONFIG_FILE_NAME: &str = "meridian.toml";

// =============================================================================
// Server Settings
// =============================================================================

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Socket address the HTTP surface listens on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_addr: default_bind_addr(),
        }
    }
}

// =============================================================================
// Database Settings
// =============================================================================

/// Local SQLite store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Path to the SQLite file.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Upper bound on pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("com", "meridian", "sync")
        .map(|dirs| dirs.data_dir().join("meridian.db"))
        .unwrap_or_else(|| PathBuf::from("meridian.db"))
}

fn default_max_connections() -> u32 {
    25
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Remote (Collaboration API) Settings
// =============================================================================

/// Settings for the record-oriented collaboration API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// API root; tables live under `{base_url}/{base_id}/{table}`.
    #[serde(default = "default_remote_url")]
    pub base_url: String,

    /// Bearer token.
    #[serde(default)]
    pub api_key: String,

    /// Base that holds every configured table.
    #[serde(default)]
    pub base_id: String,

    /// Minimum spacing between two requests (milliseconds).
    #[serde(default = "default_min_request_interval")]
    pub min_request_interval_ms: u64,

    /// How many `429` responses one request absorbs before failing.
    #[serde(default = "default_rate_limit_retries")]
    pub max_rate_limit_retries: u32,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_remote_url() -> String {
    "https://api.airtable.com/v0".to_string()
}

fn default_min_request_interval() -> u64 {
    200
}

fn default_rate_limit_retries() -> u32 {
    3
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            base_url: default_remote_url(),
            api_key: String::new(),
            base_id: String::new(),
            min_request_interval_ms: default_min_request_interval(),
            max_rate_limit_retries: default_rate_limit_retries(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl RemoteSettings {
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// POS Settings
// =============================================================================

/// Settings for the point-of-sale API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosSettings {
    /// API root; datasets live under `{base_url}/inventory` and `{base_url}/receipts`.
    #[serde(default = "default_pos_url")]
    pub base_url: String,

    /// Bearer token.
    #[serde(default)]
    pub token: String,

    /// Records requested per page; each page is one write batch.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Timeout for a single page request (seconds).
    #[serde(default = "default_page_timeout")]
    pub page_timeout_secs: u64,
}

fn default_pos_url() -> String {
    "https://api.loyverse.com/v1.0".to_string()
}

fn default_page_size() -> usize {
    meridian_core::DEFAULT_BATCH_SIZE
}

fn default_page_timeout() -> u64 {
    60
}

impl Default for PosSettings {
    fn default() -> Self {
        PosSettings {
            base_url: default_pos_url(),
            token: String::new(),
            page_size: default_page_size(),
            page_timeout_secs: default_page_timeout(),
        }
    }
}

impl PosSettings {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }
}

// =============================================================================
// Sync Behaviour Settings
// =============================================================================

/// Run-level behaviour shared by table syncs and POS ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Overall deadline for one run (seconds, 0 = none).
    #[serde(default = "default_run_deadline")]
    pub run_deadline_secs: u64,

    /// Advance `last_sync_time` even when the remote listing failed outright.
    #[serde(default = "default_true")]
    pub advance_on_fetch_failure: bool,

    /// Attempts per remote mutation (1 = no retry).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff between attempts (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff between attempts (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_run_deadline() -> u64 {
    30 * 60
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    1
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    30
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            run_deadline_secs: default_run_deadline(),
            advance_on_fetch_failure: default_true(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl SyncSettings {
    /// `None` when runs are unbounded.
    pub fn run_deadline(&self) -> Option<Duration> {
        (self.run_deadline_secs > 0).then(|| Duration::from_secs(self.run_deadline_secs))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub pos: PosSettings,

    #[serde(default)]
    pub sync: SyncSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (meridian.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.server.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(SyncError::InvalidConfig(format!(
                "server.bind_addr is not a socket address: {}",
                self.server.bind_addr
            )));
        }

        if self.database.max_connections == 0 {
            return Err(SyncError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        validate_http_url("remote.base_url", &self.remote.base_url)?;
        validate_http_url("pos.base_url", &self.pos.base_url)?;

        if self.pos.page_size == 0 {
            return Err(SyncError::InvalidConfig(
                "pos.page_size must be greater than 0".into(),
            ));
        }

        if self.sync.max_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "sync.max_attempts must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Applies `MERIDIAN_*` overrides read through `lookup`.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("MERIDIAN_BIND_ADDR") {
            debug!(bind_addr = %addr, "Overriding bind address from environment");
            self.server.bind_addr = addr;
        }

        if let Some(path) = lookup("MERIDIAN_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(url) = lookup("MERIDIAN_REMOTE_URL") {
            self.remote.base_url = url;
        }

        if let Some(key) = lookup("MERIDIAN_REMOTE_API_KEY") {
            self.remote.api_key = key;
        }

        if let Some(base) = lookup("MERIDIAN_REMOTE_BASE_ID") {
            self.remote.base_id = base;
        }

        if let Some(url) = lookup("MERIDIAN_POS_URL") {
            self.pos.base_url = url;
        }

        if let Some(token) = lookup("MERIDIAN_POS_TOKEN") {
            self.pos.token = token;
        }

        if let Some(secs) = lookup("MERIDIAN_RUN_DEADLINE_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.sync.run_deadline_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring non-numeric MERIDIAN_RUN_DEADLINE_SECS"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "meridian", "sync")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// True when credentials for the collaboration API are present.
    pub fn remote_configured(&self) -> bool {
        !self.remote.api_key.is_empty() && !self.remote.base_id.is_empty()
    }

    /// True when a POS token is present.
    pub fn pos_configured(&self) -> bool {
        !self.pos.token.is_empty()
    }
}

fn validate_http_url(field: &str, raw: &str) -> EngineResult<()> {
    let url = Url::parse(raw).map_err(|e| SyncError::InvalidUrl(format!("{}: {}", field, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(SyncError::InvalidUrl(format!(
            "{} must use http or https, got: {}",
            field, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.database.max_connections, 25);
        assert_eq!(config.pos.page_size, 250);
        assert_eq!(config.remote.min_request_interval(), Duration::from_millis(200));
        assert!(config.sync.advance_on_fetch_failure);
        assert_eq!(config.sync.retry_policy().max_attempts, 1);
        assert!(!config.remote_configured());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();

        config.remote.base_url = "ftp://example.com".to_string();
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.remote.base_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.remote.base_url = "http://localhost:9000".to_string();
        assert!(config.validate().is_ok());

        config.pos.page_size = 0;
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));

        config.pos.page_size = 100;
        config.server.bind_addr = "localhost".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MERIDIAN_REMOTE_API_KEY", "secret"),
            ("MERIDIAN_REMOTE_BASE_ID", "app123"),
            ("MERIDIAN_POS_TOKEN", "pos-token"),
            ("MERIDIAN_DATABASE_PATH", "/tmp/meridian-test.db"),
            ("MERIDIAN_RUN_DEADLINE_SECS", "0"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert!(config.remote_configured());
        assert!(config.pos_configured());
        assert_eq!(config.database.path, PathBuf::from("/tmp/meridian-test.db"));
        assert_eq!(config.sync.run_deadline(), None);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [remote]
            base_id = "appABC"

            [sync]
            advance_on_fetch_failure = false
            "#,
        )
        .unwrap();

        assert_eq!(config.remote.base_id, "appABC");
        assert_eq!(config.remote.max_rate_limit_retries, 3);
        assert!(!config.sync.advance_on_fetch_failure);
        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
    }

    #[test]
    fn test_toml_serialization() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[remote]"));
        assert!(toml_str.contains("[sync]"));
    }
}
