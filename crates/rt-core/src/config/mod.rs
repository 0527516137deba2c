//! Configuration management for relayterm
//!
//! Settings live in one TOML file with a section per concern. Every
//! section defaults field by field, so a partial file is valid.

mod client;
pub mod serde_utils;
mod stream;
mod transfer;

pub use client::{ClientConfig, RelayConfig};
pub use stream::{ExecConfig, StreamConfig};
pub use transfer::{BackoffConfig, TransferConfig};

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ConfigError;

/// `<platform config dir>/relayterm`, or `./relayterm` without one
pub fn default_config_dir() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("relayterm")
}

/// `config.toml` inside [`default_config_dir`]
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Read and parse a TOML file
///
/// A missing file is reported as `ConfigError::NotFound` so callers can
/// fall back to defaults.
pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ConfigError::NotFound(path.to_path_buf()))
        }
        Err(e) => {
            return Err(ConfigError::Invalid(format!(
                "cannot read {}: {}",
                path.display(),
                e
            )))
        }
    };
    Ok(toml::from_str(&content)?)
}

/// Write `config` as TOML, creating missing parent directories
pub fn save_config<T: Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    let io_error = |what: &str, e: std::io::Error| {
        ConfigError::Invalid(format!("cannot {} {}: {}", what, path.display(), e))
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_error("create parent of", e))?;
    }
    std::fs::write(path, content).map_err(|e| io_error("write", e))
}
