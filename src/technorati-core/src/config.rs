use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::options::OptionPolicy;

#[derive(Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    pub api_key: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub option_policy: OptionPolicy,
    #[serde(default)]
    pub cache: CacheConfig,
}

// Keeps the API key out of logs.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("user_agent", &self.user_agent)
            .field("timeout_secs", &self.timeout_secs)
            .field("option_policy", &self.option_policy)
            .field("cache", &self.cache)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Lifetime of a cached response in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Entries kept by the in-memory cache
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
    /// Persist to this SQLite file instead of memory
    #[serde(default)]
    pub sqlite_path: Option<String>,
}

fn default_api_url() -> String {
    "http://api.technorati.com".to_string()
}

fn default_user_agent() -> String {
    format!("technorati-rs/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

/// Longest accepted cache lifetime: 100 years.
pub const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

fn default_ttl_secs() -> u64 {
    3600
}

fn default_memory_capacity() -> usize {
    1000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: default_ttl_secs(),
            memory_capacity: default_memory_capacity(),
            sqlite_path: None,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: default_api_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            option_policy: OptionPolicy::default(),
            cache: CacheConfig::default(),
        }
    }

    pub fn load(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ClientConfig = serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("{path}: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Config("api_key must not be empty".to_string()));
        }
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "api_url must be an http(s) URL, got {:?}",
                self.api_url
            )));
        }
        if self.cache.ttl_secs > MAX_TTL_SECS {
            return Err(Error::Config(format!(
                "cache.ttl_secs must be at most {MAX_TTL_SECS}, got {}",
                self.cache.ttl_secs
            )));
        }
        if self.cache.enabled && self.cache.sqlite_path.is_none() && self.cache.memory_capacity == 0
        {
            return Err(Error::Config(
                "cache.memory_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Endpoint for a query, e.g. `http://api.technorati.com/cosmos`.
    pub fn endpoint(&self, query: &str) -> String {
        format!("{}/{}", self.api_url.trim_end_matches('/'), query)
    }
}
