//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::builder::is_http_url;
use crate::error::ConfigError;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Settings shared by every call a `ServiceClient` makes.
///
/// Missing fields take their defaults when deserialized, so `{}` is a valid
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Prefix for every service base path that is not itself absolute.
    pub api_url: Option<String>,
    /// Per-call timeout; `None` waits indefinitely.
    pub timeout_ms: Option<u64>,
    /// Sent as `User-Agent` unless a request sets its own.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            timeout_ms: Some(DEFAULT_TIMEOUT_MS),
            user_agent: format!("declhttp/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    pub fn new(api_url: &str) -> Self {
        Self {
            api_url: Some(api_url.to_string()),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_ms = timeout.map(|d| d.as_millis() as u64);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.api_url {
            Some(url) if !is_http_url(url) => Err(ConfigError::ApiUrl(url.clone())),
            _ => Ok(()),
        }
    }
}
