//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::LadderFilter;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream RPC endpoint and transport behavior
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Pagination and pacing settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Default ladder filters for `ingest`
    #[serde(default)]
    pub ladder: LadderFilter,

    /// Persisted store location
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.rpc.endpoint.trim().is_empty() {
            return Err(AppError::validation("rpc.endpoint is empty"));
        }
        url::Url::parse(&self.rpc.endpoint)?;
        if self.rpc.action.trim().is_empty() {
            return Err(AppError::validation("rpc.action is empty"));
        }
        if self.rpc.user_agent.trim().is_empty() {
            return Err(AppError::validation("rpc.user_agent is empty"));
        }
        if self.rpc.timeout_secs == 0 {
            return Err(AppError::validation("rpc.timeout_secs must be > 0"));
        }
        if self.rpc.max_attempts == 0 {
            return Err(AppError::validation("rpc.max_attempts must be > 0"));
        }
        if self.rpc.username.is_some() != self.rpc.password.is_some() {
            return Err(AppError::validation(
                "rpc.username and rpc.password must be set together",
            ));
        }
        if self.crawler.page_limit == 0 {
            return Err(AppError::validation("crawler.page_limit must be > 0"));
        }
        if self.crawler.batch_size == 0 {
            return Err(AppError::validation("crawler.batch_size must be > 0"));
        }
        if self.crawler.max_ladder_pages == Some(0) {
            return Err(AppError::validation(
                "crawler.max_ladder_pages must be > 0 when set",
            ));
        }
        Ok(())
    }
}

/// RPC transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Full URL of the RPC router
    #[serde(default = "defaults::endpoint")]
    pub endpoint: String,

    /// Server (realm) selector sent as the `realm` query parameter
    #[serde(default = "defaults::realm")]
    pub realm: String,

    /// Envelope `action` value
    #[serde(default = "defaults::action")]
    pub action: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Attempts per call for connection-level failures
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Backoff unit; the wait after attempt `n` is `2^n` units
    #[serde(default = "defaults::backoff_base")]
    pub backoff_base_ms: u64,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::endpoint(),
            realm: defaults::realm(),
            action: defaults::action(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_attempts: defaults::max_attempts(),
            backoff_base_ms: defaults::backoff_base(),
            username: None,
            password: None,
        }
    }
}

/// Crawl pagination and pacing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Records requested per page
    #[serde(default = "defaults::page_limit")]
    pub page_limit: usize,

    /// Pause after each roster page in milliseconds
    #[serde(default = "defaults::roster_delay")]
    pub roster_delay_ms: u64,

    /// Stop the ladder crawl after this many pages
    #[serde(default)]
    pub max_ladder_pages: Option<usize>,

    /// Raids handed to the resolver per batch
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            page_limit: defaults::page_limit(),
            roster_delay_ms: defaults::roster_delay(),
            max_ladder_pages: None,
            batch_size: defaults::batch_size(),
        }
    }
}

/// Persisted store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "defaults::database_path")]
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: defaults::database_path(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // RPC defaults
    pub fn endpoint() -> String {
        "https://panel.example.org/api/router".into()
    }
    pub fn realm() -> String {
        "1".into()
    }
    pub fn action() -> String {
        "wow_Services".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; raidlog/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn backoff_base() -> u64 {
        1000
    }

    // Crawler defaults
    pub fn page_limit() -> usize {
        25
    }
    pub fn roster_delay() -> u64 {
        300
    }
    pub fn batch_size() -> usize {
        25
    }

    // Storage defaults
    pub fn database_path() -> PathBuf {
        PathBuf::from("data/raidlog.db")
    }
}
