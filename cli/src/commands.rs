//! CLI commands over an on-disk store

use modux_core::{AppConfig, Payload, PersistenceStrategy};
use modux_persist::{FileUnloadSink, PersistenceManager, PersistenceOptions, SledStrategy};
use modux_state::Store;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = "config.json";
const STORE_DIR: &str = "store";
const UNLOAD_DIR: &str = "unload";

/// Install the global tracing subscriber; `RUST_LOG` overrides `level`
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Default config location, `<config dir>/modux/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("modux").join(CONFIG_FILE))
}

/// Load the config from `path`, else the default location, else defaults
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    if let Some(path) = path {
        return AppConfig::load(path);
    }
    match default_config_path() {
        Some(path) if path.exists() => AppConfig::load(&path),
        _ => Ok(AppConfig::default()),
    }
}

/// Write a default config file, refusing to overwrite an existing one
pub fn init_config(output: &Path) -> anyhow::Result<()> {
    if output.exists() {
        anyhow::bail!("{} already exists", output.display());
    }
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, AppConfig::default().to_json()?)?;
    Ok(())
}

/// Open the sled strategy under the configured data directory
pub fn open_strategy(config: &AppConfig) -> anyhow::Result<Arc<SledStrategy>> {
    let path = config.data_dir.join(STORE_DIR);
    std::fs::create_dir_all(&path)?;
    debug!("Opening store at {}", path.display());
    Ok(Arc::new(SledStrategy::open(&path)?))
}

pub fn persistence_options(config: &AppConfig) -> PersistenceOptions {
    PersistenceOptions::from_config(&config.persistence)
        .unload_sink(Arc::new(FileUnloadSink::new(config.data_dir.join(UNLOAD_DIR))))
}

/// Persisted keys under the configured prefix
pub async fn list_keys(config: &AppConfig) -> anyhow::Result<Vec<String>> {
    let strategy = open_strategy(config)?;
    let prefix = &config.persistence.key_prefix;
    Ok(strategy
        .keys()
        .await?
        .into_iter()
        .filter(|key| key.starts_with(prefix.as_str()))
        .collect())
}

/// Decode the persisted state of one module
pub async fn show_module(config: &AppConfig, module: &str) -> anyhow::Result<Option<Payload>> {
    let store = Store::new(config.store.clone());
    let manager =
        PersistenceManager::new(store.clone(), open_strategy(config)?, persistence_options(config))?;

    if !manager.restore_module(module).await? {
        return Ok(None);
    }
    Ok(store.get_state(Some(module)))
}

/// Remove every persisted key under the configured prefix
pub async fn clear(config: &AppConfig) -> anyhow::Result<usize> {
    let strategy = open_strategy(config)?;
    let prefix = config.persistence.key_prefix.as_str();
    let count = strategy
        .keys()
        .await?
        .iter()
        .filter(|key| key.starts_with(prefix))
        .count();

    let store = Store::new(config.store.clone());
    let manager = PersistenceManager::new(store, strategy, persistence_options(config))?;
    manager.clear_all().await?;
    info!("Cleared {} keys", count);
    Ok(count)
}
