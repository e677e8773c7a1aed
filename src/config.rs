//! Configuration for backend endpoints, task timeouts and cache sizes.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for a synchronization session.
///
/// Typically loaded from a `flowsync.toml` file or from the environment.
///
/// # Example Configuration File
///
/// ```toml
/// api_url = "https://flow.example.com/api"
/// ws_url = "wss://flow.example.com/ws"
/// task_timeout_ms = 600000
///
/// file_cache_size = 20
/// result_cache_size = 30
/// result_basic_duration_ms = 60000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the REST backend.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Base URL of the task streaming endpoint.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Fixed wall-clock ceiling per task, not renewed by activity.
    #[serde(default = "default_task_timeout")]
    pub task_timeout_ms: u64,

    /// Timeout applied to every HTTP request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Maximum number of cached file contents.
    #[serde(default = "default_file_cache_size")]
    pub file_cache_size: usize,

    /// Maximum number of cached node results.
    #[serde(default = "default_result_cache_size")]
    pub result_cache_size: usize,

    /// Base duration `D` of the result cache's adaptive TTL (`hit_count * D`).
    #[serde(default = "default_result_basic_duration")]
    pub result_basic_duration_ms: u64,
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_ws_url() -> String {
    "ws://localhost:8000".to_string()
}

fn default_task_timeout() -> u64 {
    600_000 // 10 minutes
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_file_cache_size() -> usize {
    20
}

fn default_result_cache_size() -> usize {
    30
}

fn default_result_basic_duration() -> u64 {
    60_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            ws_url: default_ws_url(),
            task_timeout_ms: default_task_timeout(),
            request_timeout_ms: default_request_timeout(),
            file_cache_size: default_file_cache_size(),
            result_cache_size: default_result_cache_size(),
            result_basic_duration_ms: default_result_basic_duration(),
        }
    }
}

impl SyncConfig {
    /// Create a configuration with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate configuration from a TOML file.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = SyncConfig::from_file("flowsync.toml")?;
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load configuration from environment variables on top of the defaults.
    ///
    /// Recognized variables:
    /// - `FLOWSYNC_API_URL`, `FLOWSYNC_WS_URL`
    /// - `FLOWSYNC_TASK_TIMEOUT_MS`, `FLOWSYNC_REQUEST_TIMEOUT_MS`
    /// - `FLOWSYNC_FILE_CACHE_SIZE`, `FLOWSYNC_RESULT_CACHE_SIZE`
    /// - `FLOWSYNC_RESULT_BASIC_DURATION_MS`
    ///
    /// Values that fail to parse are ignored.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Same as [`from_env`](Self::from_env) over an explicit variable list.
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = Self::default();
        for (key, value) in vars {
            let Some(name) = key.strip_prefix("FLOWSYNC_") else {
                continue;
            };
            match name {
                "API_URL" => config.api_url = value,
                "WS_URL" => config.ws_url = value,
                "TASK_TIMEOUT_MS" => set_parsed(&mut config.task_timeout_ms, &value),
                "REQUEST_TIMEOUT_MS" => set_parsed(&mut config.request_timeout_ms, &value),
                "FILE_CACHE_SIZE" => set_parsed(&mut config.file_cache_size, &value),
                "RESULT_CACHE_SIZE" => set_parsed(&mut config.result_cache_size, &value),
                "RESULT_BASIC_DURATION_MS" => {
                    set_parsed(&mut config.result_basic_duration_ms, &value)
                },
                _ => {},
            }
        }
        config
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.file_cache_size == 0 || self.result_cache_size == 0 {
            return Err(Error::Config(
                "cache sizes must be at least 1".to_string(),
            ));
        }
        if self.task_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(Error::Config("timeouts must be positive".to_string()));
        }
        url::Url::parse(&self.api_url)
            .map_err(|e| Error::Config(format!("invalid api_url {}: {}", self.api_url, e)))?;
        url::Url::parse(&self.ws_url)
            .map_err(|e| Error::Config(format!("invalid ws_url {}: {}", self.ws_url, e)))?;
        Ok(())
    }

    /// Task timeout as a [`Duration`].
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Base duration of the result cache TTL as a [`Duration`].
    pub fn result_basic_duration(&self) -> Duration {
        Duration::from_millis(self.result_basic_duration_ms)
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, value: &str) {
    if let Ok(parsed) = value.trim().parse() {
        *slot = parsed;
    }
}
