//! Action context
//!
//! Every action receives the store handle and the path of the module it was
//! registered on, instead of capturing the store ambiently.

use modux_core::{CommitOptions, DispatchOptions, ModulePath, Payload, StoreResult};
use std::sync::Arc;

use crate::engine::Store;

/// Handle passed to an action body
#[derive(Clone)]
pub struct ActionContext {
    store: Arc<Store>,
    path: ModulePath,
    namespaced: bool,
}

impl ActionContext {
    pub(crate) fn new(store: Arc<Store>, path: ModulePath, namespaced: bool) -> Self {
        Self {
            store,
            path,
            namespaced,
        }
    }

    /// Registration path of the owning module
    pub fn path(&self) -> &ModulePath {
        &self.path
    }

    /// The store this action runs against
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Current local state of the owning module
    ///
    /// This is a copy; re-read after every `await` if other actions may
    /// have committed in between.
    pub fn state(&self) -> Payload {
        self.store
            .get_state(Some(&self.path.dotted()))
            .unwrap_or(Payload::Null)
    }

    pub fn root_state(&self) -> Payload {
        self.store.root_state()
    }

    /// A getter of the owning module, by bare key
    pub fn getter(&self, key: &str) -> Option<Payload> {
        self.store.module_getter(&self.path, key)
    }

    /// A getter from the global map
    pub fn root_getter(&self, key: &str) -> Option<Payload> {
        self.store.getter(key)
    }

    pub fn commit(&self, mutation_type: &str, payload: Payload) -> StoreResult<()> {
        self.commit_with(mutation_type, payload, CommitOptions::default())
    }

    /// Commit; namespaced modules qualify bare types with their own path
    /// unless `options.root` is set
    pub fn commit_with(
        &self,
        mutation_type: &str,
        payload: Payload,
        options: CommitOptions,
    ) -> StoreResult<()> {
        let target = self.qualify(mutation_type, options.root);
        self.store.commit_with(&target, payload, options)
    }

    pub async fn dispatch(&self, action_type: &str, payload: Payload) -> StoreResult<Payload> {
        self.dispatch_with(action_type, payload, DispatchOptions::default())
            .await
    }

    pub async fn dispatch_with(
        &self,
        action_type: &str,
        payload: Payload,
        options: DispatchOptions,
    ) -> StoreResult<Payload> {
        let target = self.qualify(action_type, options.root);
        self.store.dispatch_with(&target, payload, options).await
    }

    fn qualify(&self, requested: &str, root: bool) -> String {
        let already_qualified = requested.contains('/') || requested.contains('.');
        if self.namespaced && !root && !already_qualified {
            format!("{}/{}", self.path.key(), requested)
        } else {
            requested.to_string()
        }
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("path", &self.path)
            .field("namespaced", &self.namespaced)
            .finish()
    }
}
