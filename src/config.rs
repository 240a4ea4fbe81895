//! Configuration for the ledger-state layer.
//!
//! Loaded from TOML. Every section has defaults so a partial file (or none at
//! all) yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants;
use crate::error::{LedgerError, LedgerResult};

/// Platform-specific default data directory
pub fn get_data_dir() -> PathBuf {
    if cfg!(windows) {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("utxo-ledger")
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".utxo-ledger")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LedgerConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    Sled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Sled only: remove the database files when the handle is dropped
    #[serde(default)]
    pub temporary: bool,
}

fn default_db_path() -> String {
    get_data_dir().join("ledger").to_string_lossy().to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_db_path(),
            temporary: false,
        }
    }
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            backend: StorageBackend::Memory,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Upper bound on cached input references
    #[serde(default = "default_max_reference_size")]
    pub max_reference_size: usize,
    /// Upper bound on transactions kept by the unspent index's tx cache
    #[serde(default = "default_tx_cache_volume")]
    pub tx_cache_volume: usize,
}

fn default_max_reference_size() -> usize {
    constants::cache::MAX_REFERENCE_SIZE
}

fn default_tx_cache_volume() -> usize {
    constants::cache::TX_CACHE_VOLUME
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_reference_size: default_max_reference_size(),
            tx_cache_volume: default_tx_cache_volume(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LedgerConfig {
    pub fn from_toml_str(contents: &str) -> LedgerResult<Self> {
        let config: LedgerConfig =
            toml::from_str(contents).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> LedgerResult<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| LedgerError::Config(e.to_string()))?;
        fs::write(path.as_ref(), contents)
            .map_err(|e| LedgerError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        Ok(())
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.cache.max_reference_size == 0 {
            return Err(LedgerError::Config(
                "cache.max_reference_size must be positive".to_string(),
            ));
        }
        if self.cache.tx_cache_volume == 0 {
            return Err(LedgerError::Config(
                "cache.tx_cache_volume must be positive".to_string(),
            ));
        }
        if self.storage.backend == StorageBackend::Sled
            && !self.storage.temporary
            && self.storage.path.is_empty()
        {
            return Err(LedgerError::Config("storage.path is empty".to_string()));
        }
        Ok(())
    }
}
