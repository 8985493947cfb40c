//! Daemon configuration.
//!
//! ```toml
//! notification_queue_limit = 4096
//! state_dir = "/var/lib/sonic/syncd"
//! catalog = "/etc/sonic/sai_catalog.yaml"
//!
//! [channel]
//! url = "redis://127.0.0.1:6379/1"
//! prefix = "SAIREDIS"
//! ```

use crate::error::{Result, SyncdError};
use serde::{Deserialize, Serialize};
use sonic_sairedis::RedisChannelConfig;
use std::fs;
use std::path::{Path, PathBuf};

/// syncd settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncdConfig {
    /// Driver events buffered ahead of the publisher; events beyond are
    /// dropped and show up as sequence gaps.
    #[serde(default = "default_notification_queue_limit")]
    pub notification_queue_limit: usize,

    /// Directory holding warm-restart images.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Attribute catalog; calls are not validated when unset.
    #[serde(default)]
    pub catalog: Option<PathBuf>,

    #[serde(default)]
    pub channel: RedisChannelConfig,
}

fn default_notification_queue_limit() -> usize {
    4096
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/sonic/syncd")
}

impl Default for SyncdConfig {
    fn default() -> Self {
        Self {
            notification_queue_limit: default_notification_queue_limit(),
            state_dir: default_state_dir(),
            catalog: None,
            channel: RedisChannelConfig::default(),
        }
    }
}

impl SyncdConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SyncdConfig = toml::from_str(content)
            .map_err(|e| SyncdError::Config(format!("failed to parse syncd config: {e}")))?;
        if config.notification_queue_limit == 0 {
            return Err(SyncdError::Config(
                "notification_queue_limit must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| SyncdError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn with_notification_queue_limit(mut self, limit: usize) -> Self {
        self.notification_queue_limit = limit.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = SyncdConfig::from_toml_str("").unwrap();
        assert_eq!(config, SyncdConfig::default());
        assert_eq!(config.notification_queue_limit, 4096);
        assert_eq!(config.state_dir, PathBuf::from("/var/lib/sonic/syncd"));
    }

    #[test]
    fn test_parse() {
        let config = SyncdConfig::from_toml_str(
            r#"
            notification_queue_limit = 8
            state_dir = "/tmp/syncd"
            catalog = "/etc/sai.yaml"

            [channel]
            prefix = "ASIC"
            "#,
        )
        .unwrap();
        assert_eq!(config.notification_queue_limit, 8);
        assert_eq!(config.catalog, Some(PathBuf::from("/etc/sai.yaml")));
        assert_eq!(config.channel.prefix, "ASIC");
        assert_eq!(config.channel.url, "redis://127.0.0.1:6379/1");
    }

    #[test]
    fn test_zero_queue_rejected() {
        let err = SyncdConfig::from_toml_str("notification_queue_limit = 0").unwrap_err();
        assert!(matches!(err, SyncdError::Config(_)));
    }

    #[test]
    fn test_load_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "state_dir = \"/run/syncd\"").unwrap();
        let config = SyncdConfig::load(file.path()).unwrap();
        assert_eq!(config.state_dir, PathBuf::from("/run/syncd"));

        assert!(SyncdConfig::load("/nonexistent/syncd.toml").is_err());
    }

    #[test]
    fn test_shipped_files_load() {
        let etc = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("etc");
        let config = SyncdConfig::load(etc.join("syncd.toml")).unwrap();
        assert_eq!(
            config,
            SyncdConfig {
                catalog: Some(PathBuf::from("/etc/sonic/sai_catalog.yaml")),
                ..SyncdConfig::default()
            }
        );

        let catalog = sonic_sai::Catalog::load(etc.join("sai_catalog.yaml")).unwrap();
        assert!(catalog.knows(sonic_sai::ObjectType::ROUTER_INTERFACE));
        assert!(catalog.knows(sonic_sai::ObjectType::ROUTE_ENTRY));
    }
}
