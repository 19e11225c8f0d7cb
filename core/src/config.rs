//! Configuration types for modux

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application configuration, as loaded by the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Name used in log output
    pub name: String,

    /// Directory holding the on-disk persistence backend
    pub data_dir: PathBuf,

    /// Logging level (overridden by `RUST_LOG`)
    pub log_level: String,

    /// Store engine configuration
    pub store: StoreConfig,

    /// Persistence manager configuration
    pub persistence: PersistenceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "modux".to_string(),
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            store: StoreConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }
}

/// Store engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Reject direct state writes that bypass mutations
    pub strict: bool,

    /// Record snapshots on commit and allow undo/redo
    pub enable_time_travel: bool,

    /// Maximum number of snapshots kept in history
    pub max_history_size: usize,

    /// Drop snapshots older than this many milliseconds
    pub max_history_age_ms: Option<u64>,

    /// Emit a debug event for every commit and dispatch
    pub devtools: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            strict: false,
            enable_time_travel: true,
            max_history_size: 50,
            max_history_age_ms: None,
            devtools: false,
        }
    }
}

/// Persistence manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Prefix prepended to every persisted module key
    pub key_prefix: String,

    /// Dotted key globs to persist (empty means everything)
    pub paths: Vec<String>,

    /// Dotted key globs never persisted; wins over `paths`
    pub exclude_paths: Vec<String>,

    /// Encrypt serialized state before writing
    pub encrypt: bool,

    /// Key used when `encrypt` is set
    pub encryption_key: Option<String>,

    /// Debounce window for autosave in milliseconds
    pub throttle_ms: u64,

    /// Write a synchronous fallback copy on teardown
    pub save_on_unload: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            key_prefix: "modux:".to_string(),
            paths: vec![],
            exclude_paths: vec![],
            encrypt: false,
            encryption_key: None,
            throttle_ms: 1000,
            save_on_unload: true,
        }
    }
}

impl PersistenceConfig {
    /// Key under which the teardown fallback blob is written
    pub fn unload_key(&self) -> String {
        format!("{}__unload", self.key_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = AppConfig::from_json(
            r#"{ "store": { "max_history_size": 5 }, "persistence": { "throttle_ms": 10 } }"#,
        )
        .unwrap();

        assert_eq!(config.store.max_history_size, 5);
        assert!(config.store.enable_time_travel);
        assert_eq!(config.persistence.throttle_ms, 10);
        assert_eq!(config.persistence.key_prefix, "modux:");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_config_file_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("modux.json");

        let mut config = AppConfig::default();
        config.persistence.encrypt = true;
        config.persistence.encryption_key = Some("secret".into());
        std::fs::write(&path, config.to_json().unwrap()).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.persistence, config.persistence);
        assert_eq!(loaded.persistence.unload_key(), "modux:__unload");
    }
}
