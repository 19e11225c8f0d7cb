//! Persistence manager
//!
//! Keeps a store's top-level modules in sync with a [`PersistenceStrategy`].
//! Every committed mutation (re)arms one debounced autosave; bursts inside
//! the throttle window collapse into a single `persist_all`. A synchronous
//! fallback write through an [`UnloadSink`] covers process teardown, when
//! async work can no longer be awaited.

use modux_core::{
    ModulePath, Payload, PersistenceConfig, PersistenceError, PersistenceResult,
    PersistenceStrategy, StateSerializer, UnloadSink,
};
use modux_crypto::{StateCipher, XorCipher};
use modux_state::{Store, Subscription};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::codec::JsonSerializer;
use crate::filter::PathFilter;

/// Runtime options for a [`PersistenceManager`]
#[derive(Clone)]
pub struct PersistenceOptions {
    pub key_prefix: String,
    pub paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    pub encrypt: bool,
    pub throttle: Duration,
    pub save_on_unload: bool,
    serializer: Arc<dyn StateSerializer>,
    cipher: Option<Arc<dyn StateCipher>>,
    unload_sink: Option<Arc<dyn UnloadSink>>,
}

impl PersistenceOptions {
    pub fn new() -> Self {
        Self::from_config(&PersistenceConfig::default())
    }

    /// Build options from configuration; the XOR cipher is keyed by
    /// `encryption_key` when one is set
    pub fn from_config(config: &PersistenceConfig) -> Self {
        let cipher = config
            .encryption_key
            .as_deref()
            .and_then(|key| XorCipher::new(key).ok())
            .map(|cipher| Arc::new(cipher) as Arc<dyn StateCipher>);

        Self {
            key_prefix: config.key_prefix.clone(),
            paths: config.paths.clone(),
            exclude_paths: config.exclude_paths.clone(),
            encrypt: config.encrypt,
            throttle: Duration::from_millis(config.throttle_ms),
            save_on_unload: config.save_on_unload,
            serializer: Arc::new(JsonSerializer),
            cipher,
            unload_sink: None,
        }
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn paths(mut self, paths: &[&str]) -> Self {
        self.paths = paths.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn exclude_paths(mut self, paths: &[&str]) -> Self {
        self.exclude_paths = paths.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn save_on_unload(mut self, enabled: bool) -> Self {
        self.save_on_unload = enabled;
        self
    }

    /// Turn encryption on or off without touching the key
    pub fn encrypt(mut self, enabled: bool) -> Self {
        self.encrypt = enabled;
        self
    }

    /// Enable encryption with the XOR cipher keyed by `key`
    pub fn encryption_key(mut self, key: &str) -> Self {
        self.encrypt = true;
        self.cipher = XorCipher::new(key)
            .ok()
            .map(|cipher| Arc::new(cipher) as Arc<dyn StateCipher>);
        self
    }

    /// Enable encryption with a custom cipher
    pub fn cipher(mut self, cipher: Arc<dyn StateCipher>) -> Self {
        self.encrypt = true;
        self.cipher = Some(cipher);
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn StateSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn unload_sink(mut self, sink: Arc<dyn UnloadSink>) -> Self {
        self.unload_sink = Some(sink);
        self
    }

    /// Key under which the teardown fallback blob is written
    pub fn unload_key(&self) -> String {
        format!("{}__unload", self.key_prefix)
    }
}

impl Default for PersistenceOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PersistenceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceOptions")
            .field("key_prefix", &self.key_prefix)
            .field("paths", &self.paths)
            .field("exclude_paths", &self.exclude_paths)
            .field("encrypt", &self.encrypt)
            .field("throttle", &self.throttle)
            .field("save_on_unload", &self.save_on_unload)
            .field("has_cipher", &self.cipher.is_some())
            .field("has_unload_sink", &self.unload_sink.is_some())
            .finish()
    }
}

struct ManagerInner {
    store: Arc<Store>,
    strategy: Arc<dyn PersistenceStrategy>,
    filter: PathFilter,
    serializer: Arc<dyn StateSerializer>,
    encrypt: bool,
    cipher: Option<Arc<dyn StateCipher>>,
    unload_sink: Option<Arc<dyn UnloadSink>>,
    key_prefix: String,
    unload_key: String,
    throttle: Duration,
    save_on_unload: bool,
    runtime: Handle,
    pending: Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
    destroyed: AtomicBool,
}

/// Persists a [`Store`] through a [`PersistenceStrategy`]
pub struct PersistenceManager {
    inner: Arc<ManagerInner>,
    subscription: Mutex<Option<Subscription>>,
}

impl PersistenceManager {
    /// Create a manager and subscribe it to the store's mutations
    ///
    /// Must be called inside a tokio runtime; autosaves run on it.
    pub fn new(
        store: Arc<Store>,
        strategy: Arc<dyn PersistenceStrategy>,
        options: PersistenceOptions,
    ) -> PersistenceResult<Self> {
        let runtime = Handle::try_current().map_err(|e| PersistenceError::Runtime(e.to_string()))?;

        if options.encrypt && options.cipher.is_none() {
            warn!("Encryption enabled without a key; saves and restores will fail");
        }

        let unload_key = options.unload_key();
        let inner = Arc::new(ManagerInner {
            store: Arc::clone(&store),
            strategy,
            filter: PathFilter::new(&options.paths, &options.exclude_paths),
            serializer: options.serializer,
            encrypt: options.encrypt,
            cipher: options.cipher,
            unload_sink: options.unload_sink,
            key_prefix: options.key_prefix,
            unload_key,
            throttle: options.throttle,
            save_on_unload: options.save_on_unload,
            runtime,
            pending: Mutex::new(None),
            generation: AtomicU64::new(0),
            destroyed: AtomicBool::new(false),
        });

        let weak: Weak<ManagerInner> = Arc::downgrade(&inner);
        let subscription = store.subscribe_mutation(move |_, _| {
            if let Some(inner) = weak.upgrade() {
                inner.schedule_autosave();
            }
            Ok(())
        });

        info!(
            "Persistence attached ({} strategy, prefix {:?})",
            inner.strategy.name(),
            inner.key_prefix
        );

        Ok(Self {
            inner,
            subscription: Mutex::new(Some(subscription)),
        })
    }

    /// Create a manager and restore every persisted module into the store
    pub async fn attach(
        store: Arc<Store>,
        strategy: Arc<dyn PersistenceStrategy>,
        options: PersistenceOptions,
    ) -> PersistenceResult<Self> {
        let manager = Self::new(store, strategy, options)?;
        manager.restore_all().await?;
        Ok(manager)
    }

    /// Persisted key for a module
    pub fn key_for(&self, module: &str) -> String {
        format!("{}{}", self.inner.key_prefix, module)
    }

    pub fn unload_key(&self) -> &str {
        &self.inner.unload_key
    }

    pub fn strategy(&self) -> &Arc<dyn PersistenceStrategy> {
        &self.inner.strategy
    }

    /// Whether an autosave is armed and has not started yet
    pub fn has_pending_save(&self) -> bool {
        self.inner
            .pending
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Save one module's filtered state under `${prefix}${module}`
    pub async fn persist_module(&self, module: &str) -> PersistenceResult<()> {
        self.inner.persist_module(module).await
    }

    /// Load one module's persisted state and merge it into the store
    ///
    /// Returns `false` when nothing is stored for `module`.
    pub async fn restore_module(&self, module: &str) -> PersistenceResult<bool> {
        self.inner.restore_module(module).await
    }

    /// Persist every top-level module in the tree
    pub async fn persist_all(&self) -> PersistenceResult<()> {
        self.inner.persist_all().await
    }

    /// Restore every module persisted under the prefix, returning how many
    pub async fn restore_all(&self) -> PersistenceResult<usize> {
        self.inner.restore_all().await
    }

    /// Remove every persisted key under the prefix, plus the fallback blob
    pub async fn clear_all(&self) -> PersistenceResult<()> {
        let inner = &self.inner;
        let keys = inner.prefixed_keys().await?;
        for key in &keys {
            inner.strategy.remove(key).await?;
        }
        if let Some(sink) = &inner.unload_sink {
            sink.remove(&inner.unload_key).map_err(PersistenceError::Unload)?;
        }
        info!("Cleared {} persisted keys", keys.len());
        Ok(())
    }

    /// Cancel the pending autosave and persist right away
    pub async fn flush(&self) -> PersistenceResult<()> {
        self.inner.cancel_pending();
        self.inner.persist_all().await
    }

    /// Synchronous last-chance write of the filtered full state
    ///
    /// Goes straight to the unload sink under the fallback key, bypassing the
    /// async strategy. Does nothing when `save_on_unload` is off.
    pub fn handle_unload(&self) -> PersistenceResult<()> {
        let inner = &self.inner;
        if !inner.save_on_unload {
            return Ok(());
        }
        let Some(sink) = &inner.unload_sink else {
            warn!("No unload sink configured, skipping teardown write");
            return Ok(());
        };
        let cipher = inner.cipher()?;

        let root = inner.store.root_state();
        let mut selected = Map::new();
        if let Some(modules) = root.as_object() {
            for (name, state) in modules {
                if let Some(state) = inner.filter.apply(name, state) {
                    selected.insert(name.clone(), state);
                }
            }
        }

        let blob = inner.encode(&Value::Object(selected), cipher)?;
        sink.write(&inner.unload_key, &blob)
            .map_err(PersistenceError::Unload)?;
        info!("Teardown state written to {}", inner.unload_key);
        Ok(())
    }

    /// Merge a fallback blob left by a previous process, then delete it
    ///
    /// Returns `false` when there is nothing to recover.
    pub fn recover_unload(&self) -> PersistenceResult<bool> {
        let inner = &self.inner;
        let Some(sink) = &inner.unload_sink else {
            return Ok(false);
        };
        let cipher = inner.cipher()?;

        let Some(blob) = sink
            .read(&inner.unload_key)
            .map_err(PersistenceError::Unload)?
        else {
            return Ok(false);
        };

        let state = inner.decode(&blob, cipher)?;
        if let Value::Object(modules) = state {
            for (name, module_state) in modules {
                inner
                    .store
                    .hydrate(ModulePath::new(vec![name]), module_state)
                    .map_err(|e| PersistenceError::Hydrate(e.to_string()))?;
            }
        }

        sink.remove(&inner.unload_key)
            .map_err(PersistenceError::Unload)?;
        info!("Recovered teardown state from {}", inner.unload_key);
        Ok(true)
    }

    /// Stop autosaving: unsubscribe and drop any pending timer
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.unsubscribe();
        }
        self.inner.cancel_pending();
        debug!("Persistence manager destroyed");
    }
}

impl Drop for PersistenceManager {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl ManagerInner {
    fn cipher(&self) -> PersistenceResult<Option<&dyn StateCipher>> {
        if !self.encrypt {
            return Ok(None);
        }
        self.cipher
            .as_deref()
            .map(Some)
            .ok_or(PersistenceError::MissingEncryptionKey)
    }

    fn encode(&self, state: &Payload, cipher: Option<&dyn StateCipher>) -> PersistenceResult<String> {
        let text = self.serializer.serialize(state)?;
        match cipher {
            Some(cipher) => cipher
                .encrypt(&text)
                .map_err(|e| PersistenceError::Cipher(e.to_string())),
            None => Ok(text),
        }
    }

    fn decode(&self, raw: &str, cipher: Option<&dyn StateCipher>) -> PersistenceResult<Payload> {
        let text = match cipher {
            Some(cipher) => cipher
                .decrypt(raw)
                .map_err(|e| PersistenceError::Cipher(e.to_string()))?,
            None => raw.to_string(),
        };
        self.serializer.deserialize(&text)
    }

    async fn persist_module(&self, module: &str) -> PersistenceResult<()> {
        let cipher = self.cipher()?;

        let Some(state) = self.store.get_state(Some(module)) else {
            warn!("Cannot persist {}: no such module state", module);
            return Ok(());
        };
        let Some(selected) = self.filter.apply(module, &state) else {
            debug!("Nothing selected for {}, skipping save", module);
            return Ok(());
        };

        let blob = self.encode(&selected, cipher)?;
        let key = format!("{}{}", self.key_prefix, module);
        self.strategy.save(&key, &blob).await?;
        debug!("Persisted {} ({} bytes)", key, blob.len());
        Ok(())
    }

    async fn restore_module(&self, module: &str) -> PersistenceResult<bool> {
        let cipher = self.cipher()?;

        let key = format!("{}{}", self.key_prefix, module);
        let Some(blob) = self.strategy.load(&key).await? else {
            debug!("Nothing persisted under {}", key);
            return Ok(false);
        };

        let state = self.decode(&blob, cipher)?;
        self.store
            .hydrate(ModulePath::parse(module), state)
            .map_err(|e| PersistenceError::Hydrate(e.to_string()))?;
        debug!("Restored {}", key);
        Ok(true)
    }

    async fn persist_all(&self) -> PersistenceResult<()> {
        for module in self.store.top_level_keys() {
            self.persist_module(&module).await?;
        }
        Ok(())
    }

    async fn prefixed_keys(&self) -> PersistenceResult<Vec<String>> {
        let keys = self.strategy.keys().await?;
        Ok(keys
            .into_iter()
            .filter(|key| key.starts_with(&self.key_prefix))
            .collect())
    }

    async fn restore_all(&self) -> PersistenceResult<usize> {
        let mut restored = 0;
        for key in self.prefixed_keys().await? {
            if key == self.unload_key {
                continue;
            }
            let module = &key[self.key_prefix.len()..];
            if module.is_empty() {
                continue;
            }
            if self.restore_module(module).await? {
                restored += 1;
            }
        }
        info!("Restored {} persisted modules", restored);
        Ok(restored)
    }

    /// (Re)arm the debounced autosave
    fn schedule_autosave(self: &Arc<Self>) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let weak = Arc::downgrade(self);
        let throttle = self.throttle;

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(throttle).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            {
                // a save that has started is detached, so a later mutation
                // re-arms the timer without aborting it
                let mut pending = inner.pending.lock();
                if inner.generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                pending.take();
            }
            if let Err(e) = inner.persist_all().await {
                error!("Autosave failed: {}", e);
            }
        });

        if let Some(previous) = self.pending.lock().replace(task) {
            previous.abort();
        }
    }

    fn cancel_pending(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.pending.lock().take() {
            task.abort();
        }
    }
}
