//! Module descriptors
//!
//! A module is a declarative unit of state plus the getters, mutations and
//! actions that operate on it. Modules nest through submodules.

use futures::future::BoxFuture;
use futures::FutureExt;
use modux_core::Payload;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::context::ActionContext;
use crate::getters::GetterContext;

/// Synchronous state edit: `(local_state, payload)`
pub type MutationFn = Arc<dyn Fn(&mut Payload, &Payload) -> anyhow::Result<()> + Send + Sync>;

/// Future returned by an action body
pub type ActionFuture = BoxFuture<'static, anyhow::Result<Payload>>;

/// Asynchronous operation receiving its bound context and payload
pub type ActionFn = Arc<dyn Fn(ActionContext, Payload) -> ActionFuture + Send + Sync>;

/// Derived value computed from state and other getters
pub type GetterFn = Arc<dyn Fn(&GetterContext<'_>) -> Payload + Send + Sync>;

/// Produces a fresh initial state per registration
pub type StateFactory = Arc<dyn Fn() -> Payload + Send + Sync>;

/// Initial state of a module
#[derive(Clone)]
pub enum ModuleState {
    /// Cloned into the tree on every registration
    Literal(Payload),
    /// Called on every registration
    Factory(StateFactory),
}

impl ModuleState {
    pub fn instantiate(&self) -> Payload {
        match self {
            ModuleState::Literal(value) => value.clone(),
            ModuleState::Factory(factory) => factory(),
        }
    }
}

/// Module descriptor
#[derive(Clone)]
pub struct Module {
    pub(crate) name: String,
    pub(crate) state: ModuleState,
    pub(crate) getters: Vec<(String, GetterFn)>,
    pub(crate) mutations: HashMap<String, MutationFn>,
    pub(crate) actions: HashMap<String, ActionFn>,
    pub(crate) namespaced: bool,
    pub(crate) modules: Vec<Module>,
}

impl Module {
    /// Create an empty module whose state is `{}`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ModuleState::Literal(json!({})),
            getters: Vec::new(),
            mutations: HashMap::new(),
            actions: HashMap::new(),
            namespaced: false,
            modules: Vec::new(),
        }
    }

    /// Use a literal initial state
    pub fn with_state(mut self, state: Payload) -> Self {
        self.state = ModuleState::Literal(state);
        self
    }

    /// Use an initializer producing fresh state per registration
    pub fn with_state_fn<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Payload + Send + Sync + 'static,
    {
        self.state = ModuleState::Factory(Arc::new(factory));
        self
    }

    pub fn namespaced(mut self, namespaced: bool) -> Self {
        self.namespaced = namespaced;
        self
    }

    pub fn mutation<F>(mut self, name: impl Into<String>, mutation: F) -> Self
    where
        F: Fn(&mut Payload, &Payload) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.mutations.insert(name.into(), Arc::new(mutation));
        self
    }

    pub fn action<F, Fut>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(ActionContext, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Payload>> + Send + 'static,
    {
        let boxed: ActionFn = Arc::new(move |ctx, payload| action(ctx, payload).boxed());
        self.actions.insert(name.into(), boxed);
        self
    }

    /// Add a getter; re-adding a key replaces it in place
    pub fn getter<F>(mut self, name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&GetterContext<'_>) -> Payload + Send + Sync + 'static,
    {
        let name = name.into();
        let getter: GetterFn = Arc::new(getter);
        match self.getters.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = getter,
            None => self.getters.push((name, getter)),
        }
        self
    }

    pub fn submodule(mut self, module: Module) -> Self {
        self.modules.push(module);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_namespaced(&self) -> bool {
        self.namespaced
    }

    pub fn has_mutation(&self, name: &str) -> bool {
        self.mutations.contains_key(name)
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn submodules(&self) -> &[Module] {
        &self.modules
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut mutations: Vec<_> = self.mutations.keys().collect();
        mutations.sort();
        let mut actions: Vec<_> = self.actions.keys().collect();
        actions.sort();

        f.debug_struct("Module")
            .field("name", &self.name)
            .field("namespaced", &self.namespaced)
            .field("getters", &self.getters.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("mutations", &mutations)
            .field("actions", &actions)
            .field("modules", &self.modules)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_factory_state_is_fresh_per_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let module = Module::new("counter").with_state_fn(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            json!({ "instance": n })
        });

        assert_eq!(module.state.instantiate(), json!({ "instance": 0 }));
        assert_eq!(module.state.instantiate(), json!({ "instance": 1 }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_builder_collects_parts() {
        let module = Module::new("app")
            .with_state(json!({ "loading": false }))
            .namespaced(true)
            .mutation("setLoading", |state, payload| {
                state["loading"] = payload.clone();
                Ok(())
            })
            .action("load", |_ctx, _payload| async { Ok(Payload::Null) })
            .getter("isLoading", |ctx| ctx.state()["loading"].clone())
            .getter("isLoading", |_ctx| json!(false))
            .submodule(Module::new("child"));

        assert_eq!(module.name(), "app");
        assert!(module.is_namespaced());
        assert!(module.has_mutation("setLoading"));
        assert!(module.has_action("load"));
        assert!(!module.has_action("setLoading"));
        assert_eq!(module.getters.len(), 1);
        assert_eq!(module.submodules()[0].name(), "child");
        assert_eq!(module.state.instantiate(), json!({ "loading": false }));
    }
}
