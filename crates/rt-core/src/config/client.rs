//! Top-level client configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use rt_protocol::WireFormat;

use super::serde_utils::duration_secs;
use super::{ExecConfig, StreamConfig, TransferConfig};
use crate::error::ConfigError;

/// Configuration for the client engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay connection settings
    pub relay: RelayConfig,
    /// Terminal stream settings
    pub stream: StreamConfig,
    /// Non-streaming command execution settings
    pub exec: ExecConfig,
    /// File transfer settings
    pub transfer: TransferConfig,
}

/// How to reach the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Relay address (`host:port`)
    pub address: String,

    /// API key presented on every call
    ///
    /// Also the credential for per-part connections in split transfers.
    pub api_key: Option<String>,

    /// TCP connect timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Idle period after which the relay drops a silent stream
    #[serde(with = "duration_secs")]
    pub idle_timeout: Duration,

    /// Outbound encoding expected by the relay
    pub wire_format: WireFormat,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:7450".to_string(),
            api_key: None,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(30),
            wire_format: WireFormat::default(),
        }
    }
}

impl ClientConfig {
    /// Load from a TOML file and validate
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = super::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file is absent
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.keepalive_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "stream.keepalive_interval must be non-zero".to_string(),
            ));
        }
        if self.stream.keepalive_interval >= self.relay.idle_timeout {
            return Err(ConfigError::Invalid(format!(
                "stream.keepalive_interval ({:?}) must be shorter than relay.idle_timeout ({:?})",
                self.stream.keepalive_interval, self.relay.idle_timeout
            )));
        }
        if self.stream.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "stream.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.transfer.chunk_size == 0 || self.transfer.max_parallel_parts == 0 {
            return Err(ConfigError::Invalid(
                "transfer.chunk_size and transfer.max_parallel_parts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stream.keepalive_interval, Duration::from_secs(25));
        assert_eq!(config.relay.idle_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_keepalive_must_beat_idle_timeout() {
        let mut config = ClientConfig::default();
        config.stream.keepalive_interval = Duration::from_secs(30);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.stream.keepalive_interval = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [relay]
            address = "relay.example.com:443"
            wire_format = "legacy"

            [exec]
            poll_interval = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.relay.address, "relay.example.com:443");
        assert_eq!(config.relay.wire_format, WireFormat::Legacy);
        assert_eq!(config.exec.poll_interval, Duration::from_millis(500));
        assert_eq!(config.transfer.chunk_size, 1024 * 1024);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ClientConfig::default();
        config.relay.api_key = Some("k".to_string());
        super::super::save_config(&path, &config).unwrap();

        let loaded = ClientConfig::load(&path).unwrap();
        assert_eq!(loaded.relay.api_key.as_deref(), Some("k"));
        assert_eq!(loaded.transfer.part_size, config.transfer.part_size);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.relay.address, RelayConfig::default().address);
    }
}
