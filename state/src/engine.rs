//! Store engine
//!
//! Owns the state tree, routes `commit`/`dispatch` to the owning module,
//! notifies subscribers and keeps the undo/redo history.

use modux_core::{
    ActionPayload, CommitOptions, DispatchOptions, ModulePath, MutationPayload, Payload,
    StoreConfig, StoreError, StoreResult,
};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::context::ActionContext;
use crate::getters::{self, GetterCache};
use crate::history::{History, StateSnapshot};
use crate::module::Module;
use crate::registry::{GetterRef, ModuleRegistry, RegisteredModule};
use crate::subscription::{
    ActionEvent, ActionPhase, ActionSubscriber, MutationSubscriber, StateWatcher,
    SubscriberList, Subscription, WatchOptions,
};
use crate::tree;

const DEVTOOLS_TARGET: &str = "modux::devtools";

struct StoreInner {
    tree: Payload,
    registry: ModuleRegistry,
}

/// The state container every caller reads from and writes through
pub struct Store {
    config: StoreConfig,
    inner: RwLock<StoreInner>,
    getter_cache: GetterCache,
    history: Mutex<History>,
    mutation_subscribers: SubscriberList<MutationSubscriber>,
    action_subscribers: SubscriberList<ActionSubscriber>,
    watchers: SubscriberList<StateWatcher>,
}

impl Store {
    /// Create a new store
    pub fn new(config: StoreConfig) -> Arc<Self> {
        let history = History::new(config.max_history_size, config.max_history_age_ms);
        Arc::new(Self {
            config,
            inner: RwLock::new(StoreInner {
                tree: json!({}),
                registry: ModuleRegistry::new(),
            }),
            getter_cache: GetterCache::new(),
            history: Mutex::new(history),
            mutation_subscribers: SubscriberList::new(),
            action_subscribers: SubscriberList::new(),
            watchers: SubscriberList::new(),
        })
    }

    /// Create a store with the default configuration
    pub fn with_defaults() -> Arc<Self> {
        Self::new(StoreConfig::default())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ============ Module Registry ============

    /// Register a module at `[module.name]`
    pub fn register_module(&self, module: Module) -> StoreResult<()> {
        let path = ModulePath::new(vec![module.name.clone()]);
        self.register_module_at(path, module)
    }

    /// Register a module (and its submodules) at an explicit path
    ///
    /// Registering an occupied path logs a warning and changes nothing.
    pub fn register_module_at(
        &self,
        path: impl Into<ModulePath>,
        module: Module,
    ) -> StoreResult<()> {
        let result = self.register_recursive(path.into(), module);
        self.run_watchers();
        result
    }

    fn register_recursive(&self, path: ModulePath, module: Module) -> StoreResult<()> {
        let submodules = {
            let mut guard = self.inner.write();
            let inner = &mut *guard;

            if inner.registry.contains(&path) {
                warn!("Module {} is already registered, ignoring", path);
                return Ok(());
            }

            tree::mount(&mut inner.tree, &path, module.state.instantiate())?;
            let (registered, submodules) = RegisteredModule::from_module(path.clone(), module);
            inner.registry.insert(registered);
            debug!(
                "Registered module {} ({} modules mounted)",
                path,
                inner.registry.len()
            );
            submodules
        };
        self.getter_cache.invalidate_within(&path);

        for submodule in submodules {
            let child = path.child(&submodule.name);
            self.register_recursive(child, submodule)?;
        }
        Ok(())
    }

    /// Remove a module, every module nested under it, and their state
    ///
    /// Returns `false` (with a warning) when nothing is registered at `path`.
    pub fn unregister_module(&self, path: impl Into<ModulePath>) -> bool {
        let path = path.into();
        let removed = {
            let mut guard = self.inner.write();
            let inner = &mut *guard;

            if !inner.registry.contains(&path) {
                warn!("Cannot unregister {}: module not registered", path);
                return false;
            }

            let removed = inner.registry.remove_within(&path);
            tree::unmount(&mut inner.tree, &path);
            removed
        };
        self.getter_cache.invalidate_within(&path);

        info!("Unregistered module {} ({} modules removed)", path, removed.len());
        self.run_watchers();
        true
    }

    pub fn has_module(&self, path: impl Into<ModulePath>) -> bool {
        self.inner.read().registry.contains(&path.into())
    }

    /// Registered module paths in registration order
    pub fn module_paths(&self) -> Vec<ModulePath> {
        self.inner
            .read()
            .registry
            .iter()
            .map(|m| m.path.clone())
            .collect()
    }

    // ============ Commit / Dispatch ============

    pub fn commit(&self, mutation_type: &str, payload: Payload) -> StoreResult<()> {
        self.commit_with(mutation_type, payload, CommitOptions::default())
    }

    /// Apply a mutation synchronously
    ///
    /// An unknown type is logged and ignored. Unless `options.silent`, the
    /// tree as it was before the mutation is added to history and mutation
    /// subscribers are notified before this returns. A failing mutation is
    /// rolled back and leaves history untouched.
    pub fn commit_with(
        &self,
        mutation_type: &str,
        payload: Payload,
        options: CommitOptions,
    ) -> StoreResult<()> {
        let record = MutationPayload::new(mutation_type, payload);

        let state_after = {
            let mut guard = self.inner.write();
            let inner = &mut *guard;

            let Some((path, mutation)) = inner.registry.resolve_mutation(mutation_type) else {
                error!("Unknown mutation type: {}", mutation_type);
                return Ok(());
            };

            let recording = !options.silent && self.config.enable_time_travel;
            let tree_before = recording.then(|| inner.tree.clone());

            let local = tree::get_at_mut(&mut inner.tree, &path)
                .ok_or_else(|| StoreError::ModuleNotFound(path.key()))?;
            let local_before = local.clone();
            if let Err(source) = mutation(local, &record.payload) {
                // a rejected mutation leaves neither partial writes nor history
                *local = local_before;
                return Err(StoreError::Mutation {
                    mutation: mutation_type.to_string(),
                    source,
                });
            }
            inner.registry.touch(&path);

            if let Some(before) = tree_before {
                self.history.lock().record(before, record.clone());
            }

            let notify = !options.silent && !self.mutation_subscribers.is_empty();
            notify.then(|| inner.tree.clone())
        };

        if self.config.devtools {
            debug!(
                target: DEVTOOLS_TARGET,
                mutation = %mutation_type,
                payload = %record.payload,
                silent = options.silent,
                "commit"
            );
        }

        if let Some(state) = state_after {
            self.notify_mutation(&record, &state);
        }
        self.run_watchers();
        Ok(())
    }

    pub async fn dispatch(self: &Arc<Self>, action_type: &str, payload: Payload) -> StoreResult<Payload> {
        self.dispatch_with(action_type, payload, DispatchOptions::default())
            .await
    }

    /// Run an action to completion
    ///
    /// Accepts `module/action`, `module.action` or a bare name. Action
    /// subscribers are called before the body and again after it resolves
    /// (or fails). An unknown type is logged and returned as an error.
    /// `options.root` only matters when dispatching from an [`ActionContext`].
    pub async fn dispatch_with(
        self: &Arc<Self>,
        action_type: &str,
        payload: Payload,
        _options: DispatchOptions,
    ) -> StoreResult<Payload> {
        let resolved = {
            let inner = self.inner.read();
            inner.registry.resolve_action(action_type).map(|(path, action)| {
                let namespaced = inner
                    .registry
                    .find(&path)
                    .map(|m| m.namespaced)
                    .unwrap_or(false);
                (path, action, namespaced)
            })
        };

        let Some((path, action, namespaced)) = resolved else {
            error!("Unknown action type: {}", action_type);
            return Err(StoreError::UnknownAction(action_type.to_string()));
        };

        let record = ActionPayload::new(action_type, payload.clone());
        if self.config.devtools {
            debug!(
                target: DEVTOOLS_TARGET,
                action = %action_type,
                module = %path,
                payload = %record.payload,
                "dispatch"
            );
        }

        self.notify_action(ActionPhase::Before, &record, None, None);

        let ctx = ActionContext::new(Arc::clone(self), path, namespaced);
        match action(ctx, payload).await {
            Ok(result) => {
                self.notify_action(ActionPhase::After, &record, Some(&result), None);
                Ok(result)
            }
            Err(source) => {
                let message = format!("{:#}", source);
                self.notify_action(ActionPhase::Error, &record, None, Some(&message));
                Err(StoreError::Action {
                    action: action_type.to_string(),
                    source,
                })
            }
        }
    }

    // ============ State Access ============

    /// Copy of the full tree, or of the subtree at a dotted path
    pub fn get_state(&self, module: Option<&str>) -> Option<Payload> {
        let inner = self.inner.read();
        match module {
            None => Some(inner.tree.clone()),
            Some(dotted) => tree::get_dotted(&inner.tree, dotted).cloned(),
        }
    }

    /// Copy of the full tree
    pub fn root_state(&self) -> Payload {
        self.inner.read().tree.clone()
    }

    /// Names of the top-level entries of the tree
    pub fn top_level_keys(&self) -> Vec<String> {
        self.inner
            .read()
            .tree
            .as_object()
            .map(|object| object.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Assign each top-level key of `new_state` onto the live tree
    ///
    /// Keys absent from `new_state` keep their current value.
    pub fn replace_state(&self, new_state: Payload) -> StoreResult<()> {
        let Value::Object(entries) = new_state else {
            return Err(StoreError::InvalidState(
                "replacement state must be an object".into(),
            ));
        };

        {
            let mut guard = self.inner.write();
            let inner = &mut *guard;
            if let Some(root) = inner.tree.as_object_mut() {
                for (key, value) in entries {
                    root.insert(key, value);
                }
            }
            inner.registry.touch_all();
        }

        self.run_watchers();
        Ok(())
    }

    /// Merge restored state into the subtree at `path`
    ///
    /// Used by persistence to rehydrate a module; it bypasses mutations,
    /// history and mutation subscribers, and is allowed in strict mode.
    pub fn hydrate(&self, path: impl Into<ModulePath>, state: Payload) -> StoreResult<()> {
        let path = path.into();
        {
            let mut guard = self.inner.write();
            let inner = &mut *guard;
            match tree::get_at_mut(&mut inner.tree, &path) {
                Some(existing) => tree::shallow_merge(existing, state),
                None => tree::mount(&mut inner.tree, &path, state)?,
            }
            inner.registry.touch(&path);
        }

        debug!("Hydrated {}", path);
        self.run_watchers();
        Ok(())
    }

    /// Write directly to a module's state, bypassing mutations
    ///
    /// Rejected in strict mode. No snapshot is taken and mutation
    /// subscribers are not notified.
    pub fn with_state_mut<R>(
        &self,
        path: impl Into<ModulePath>,
        write: impl FnOnce(&mut Payload) -> R,
    ) -> StoreResult<R> {
        let path = path.into();
        if self.config.strict {
            error!("Direct write to {} outside a mutation", path);
            return Err(StoreError::StrictMode(path.key()));
        }

        let result = {
            let mut guard = self.inner.write();
            let inner = &mut *guard;
            let local = tree::get_at_mut(&mut inner.tree, &path)
                .ok_or_else(|| StoreError::ModuleNotFound(path.key()))?;
            let result = write(local);
            inner.registry.touch(&path);
            result
        };

        self.run_watchers();
        Ok(result)
    }

    // ============ Getters ============

    /// Evaluate a getter from the global map
    pub fn getter(&self, key: &str) -> Option<Payload> {
        let inner = self.inner.read();
        let target = inner.registry.global_getter(key)?.clone();
        getters::evaluate_root(&inner.tree, &inner.registry, &self.getter_cache, &target)
    }

    /// Evaluate a module's getter by its bare key
    pub fn module_getter(&self, path: &ModulePath, key: &str) -> Option<Payload> {
        let inner = self.inner.read();
        let func = inner.registry.find(path)?.getter(key)?.clone();
        let target = GetterRef {
            path: path.clone(),
            key: key.to_string(),
            func,
        };
        getters::evaluate_root(&inner.tree, &inner.registry, &self.getter_cache, &target)
    }

    /// Evaluate every global getter
    pub fn get_getters(&self) -> BTreeMap<String, Payload> {
        let inner = self.inner.read();
        inner
            .registry
            .global_getter_keys()
            .into_iter()
            .filter_map(|key| {
                let target = inner.registry.global_getter(&key)?.clone();
                let value = getters::evaluate_root(
                    &inner.tree,
                    &inner.registry,
                    &self.getter_cache,
                    &target,
                )?;
                Some((key, value))
            })
            .collect()
    }

    // ============ Subscriptions ============

    pub fn subscribe_mutation<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&MutationPayload, &Payload) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.mutation_subscribers.add(Arc::new(callback))
    }

    pub fn subscribe_action<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ActionEvent<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.action_subscribers.add(Arc::new(callback))
    }

    /// Watch the value `select` derives from the root state
    ///
    /// `callback(new, old)` runs whenever the derived value changes.
    pub fn subscribe_state<S, F>(&self, select: S, callback: F, options: WatchOptions) -> Subscription
    where
        S: Fn(&Payload) -> Payload + Send + Sync + 'static,
        F: Fn(&Payload, Option<&Payload>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let current = select(&self.inner.read().tree);
        if options.immediate {
            if let Err(e) = callback(&current, None) {
                error!("State watcher failed: {:#}", e);
            }
        }

        self.watchers.add(Arc::new(StateWatcher {
            select: Box::new(select),
            callback: Box::new(callback),
            deep: options.deep,
            last: Mutex::new(current),
        }))
    }

    fn notify_mutation(&self, record: &MutationPayload, state: &Payload) {
        for subscriber in self.mutation_subscribers.snapshot() {
            if let Err(e) = subscriber(record, state) {
                error!(
                    "Mutation subscriber failed on {}: {:#}",
                    record.mutation_type, e
                );
            }
        }
    }

    fn notify_action(
        &self,
        phase: ActionPhase,
        action: &ActionPayload,
        result: Option<&Payload>,
        error: Option<&str>,
    ) {
        let subscribers = self.action_subscribers.snapshot();
        if subscribers.is_empty() {
            return;
        }

        let state = self.root_state();
        let event = ActionEvent {
            phase,
            action,
            state: &state,
            result,
            error,
        };
        for subscriber in subscribers {
            if let Err(e) = subscriber(&event) {
                error!(
                    "Action subscriber failed on {} ({:?}): {:#}",
                    action.action_type, phase, e
                );
            }
        }
    }

    fn run_watchers(&self) {
        let watchers = self.watchers.snapshot();
        if watchers.is_empty() {
            return;
        }

        let values: Vec<Payload> = {
            let inner = self.inner.read();
            watchers.iter().map(|w| (w.select)(&inner.tree)).collect()
        };

        for (watcher, value) in watchers.iter().zip(values) {
            let previous = {
                let mut last = watcher.last.lock();
                let unchanged = if watcher.deep {
                    *last == value
                } else {
                    tree::shallow_eq(&last, &value)
                };
                let previous = std::mem::replace(&mut *last, value.clone());
                if unchanged {
                    continue;
                }
                previous
            };

            if let Err(e) = (watcher.callback)(&value, Some(&previous)) {
                error!("State watcher failed: {:#}", e);
            }
        }
    }

    // ============ Time Travel ============

    /// Restore the previous snapshot; returns whether anything changed
    pub fn undo(&self) -> bool {
        if !self.config.enable_time_travel {
            warn!("Time travel is disabled, undo ignored");
            return false;
        }

        let live = self.root_state();
        let restored = self.history.lock().step_back(live);
        match restored {
            Some(state) => self.restore_snapshot(state),
            None => {
                debug!("Nothing to undo");
                false
            }
        }
    }

    /// Re-apply the next snapshot; returns whether anything changed
    pub fn redo(&self) -> bool {
        if !self.config.enable_time_travel {
            warn!("Time travel is disabled, redo ignored");
            return false;
        }

        let restored = self.history.lock().step_forward();
        match restored {
            Some(state) => self.restore_snapshot(state),
            None => {
                debug!("Nothing to redo");
                false
            }
        }
    }

    fn restore_snapshot(&self, state: Payload) -> bool {
        match self.replace_state(state) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to restore snapshot: {}", e);
                false
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        self.config.enable_time_travel && self.history.lock().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.config.enable_time_travel && self.history.lock().can_redo()
    }

    pub fn get_history(&self) -> Vec<StateSnapshot> {
        self.history.lock().snapshots().cloned().collect()
    }

    /// Position of the history cursor
    pub fn history_index(&self) -> usize {
        self.history.lock().cursor()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
        debug!("History cleared");
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .field("modules", &self.module_paths())
            .finish()
    }
}
