//! Client proxy configuration.
//!
//! Loaded from TOML with serde defaults for every field, so an empty file is
//! a valid configuration:
//!
//! ```toml
//! communication_mode = "sync"
//! response_timeout_ms = 60000
//! get_retries = 1
//! record = "/var/log/swss/sairedis.rec"
//!
//! [channel]
//! url = "redis://127.0.0.1:6379/1"
//! prefix = "SAIREDIS"
//! ```

use crate::error::{Result, SairedisError};
use crate::proto::CorrelationId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the proxy waits for responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationMode {
    /// Every call blocks until its response arrives or the timeout expires.
    #[default]
    Sync,
    /// Calls return a pending handle right after the request is sent.
    Async,
    /// Only notifications are consumed; data calls are rejected.
    NotifyOnly,
}

/// Channel settings shared by the client and the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisChannelConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379/1`.
    #[serde(default = "default_url")]
    pub url: String,

    /// Prefix of every key and pubsub channel.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Lifetime of an unconsumed response list.
    #[serde(default = "default_response_ttl_secs")]
    pub response_ttl_secs: u64,
}

impl RedisChannelConfig {
    pub fn request_key(&self) -> String {
        format!("{}:REQUESTS", self.prefix)
    }

    pub fn response_key(&self, id: CorrelationId) -> String {
        format!("{}:RESPONSE:{}", self.prefix, id)
    }

    pub fn notification_channel(&self) -> String {
        format!("{}:NOTIFICATIONS", self.prefix)
    }
}

/// Client proxy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub communication_mode: CommunicationMode,

    /// How long a single hardware operation may legitimately run.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    /// Extra attempts for GET calls after a transport error or timeout.
    #[serde(default = "default_get_retries")]
    pub get_retries: u32,

    /// Record log path; recording is off when unset.
    #[serde(default)]
    pub record: Option<PathBuf>,

    #[serde(default)]
    pub channel: RedisChannelConfig,
}

fn default_url() -> String {
    "redis://127.0.0.1:6379/1".to_string()
}

fn default_prefix() -> String {
    "SAIREDIS".to_string()
}

fn default_response_ttl_secs() -> u64 {
    60
}

fn default_response_timeout_ms() -> u64 {
    60_000
}

fn default_get_retries() -> u32 {
    1
}

impl Default for RedisChannelConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            prefix: default_prefix(),
            response_ttl_secs: default_response_ttl_secs(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            communication_mode: CommunicationMode::default(),
            response_timeout_ms: default_response_timeout_ms(),
            get_retries: default_get_retries(),
            record: None,
            channel: RedisChannelConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| SairedisError::Config(format!("failed to parse client config: {e}")))
    }

    /// Loads a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            SairedisError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Response timeout as Duration.
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn with_mode(mut self, mode: CommunicationMode) -> Self {
        self.communication_mode = mode;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }
}
