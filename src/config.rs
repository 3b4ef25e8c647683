//! Application configuration
//!
//! Loaded once from a TOML file (all sections optional), then overridden by
//! command line flags. The result is passed by value to each component's
//! `init` and never changed afterwards.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::constants::{DEFAULT_BUFFER_CAPACITY, DEFAULT_READ_BUFFER_SIZE};
use crate::error::ConfigError;
use crate::source::SourceSettings;
use crate::upload::UploaderSettings;

/// Chunk buffer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Maximum bytes held between encoder and uploader
    pub capacity_bytes: usize,

    /// Initial size of the consumer read buffer
    pub read_buffer_size: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_BUFFER_CAPACITY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub uploader: UploaderSettings,
    pub buffer: BufferConfig,
    pub source: SourceSettings,
}

impl AppConfig {
    /// Default config file location, e.g. `~/.config/webmlive/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "webmproject", "webmlive")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Load `path` if given, else the default file if it exists, else
    /// defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::debug!("loading config from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer.capacity_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "buffer.capacity_bytes",
                reason: "must be greater than zero".into(),
            });
        }
        if self.buffer.read_buffer_size == 0 {
            return Err(ConfigError::Invalid {
                field: "buffer.read_buffer_size",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

/// Split a `name:value` entry at the first colon
pub fn parse_name_value(entry: &str) -> Result<(String, String), ConfigError> {
    let (name, value) = entry
        .split_once(':')
        .ok_or_else(|| ConfigError::BadEntry(entry.to_string()))?;
    if name.is_empty() {
        return Err(ConfigError::BadEntry(entry.to_string()));
    }
    Ok((name.to_string(), value.to_string()))
}

/// Parse `name:value` entries into `map`. Later entries replace earlier
/// ones with the same name.
pub fn store_entries<'a>(
    entries: impl IntoIterator<Item = &'a String>,
    map: &mut BTreeMap<String, String>,
) -> Result<(), ConfigError> {
    for entry in entries {
        let (name, value) = parse_name_value(entry)?;
        map.insert(name, value);
    }
    Ok(())
}
