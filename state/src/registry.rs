//! Module registry
//!
//! Keeps registered modules in registration order, the flat global getter
//! map, and the revision counters that getter memoization keys on.

use modux_core::ModulePath;
use std::collections::HashMap;

use crate::module::{ActionFn, GetterFn, Module, MutationFn};

/// A module mounted at a concrete path
pub(crate) struct RegisteredModule {
    pub path: ModulePath,
    pub namespaced: bool,
    pub getters: Vec<(String, GetterFn)>,
    pub mutations: HashMap<String, MutationFn>,
    pub actions: HashMap<String, ActionFn>,
}

impl RegisteredModule {
    /// Split a descriptor into its registered part and its submodules
    pub fn from_module(path: ModulePath, module: Module) -> (Self, Vec<Module>) {
        let registered = Self {
            path,
            namespaced: module.namespaced,
            getters: module.getters,
            mutations: module.mutations,
            actions: module.actions,
        };
        (registered, module.modules)
    }

    /// Key under which a getter lands in the global map
    pub fn global_key(&self, getter: &str) -> String {
        if self.namespaced {
            format!("{}/{}", self.path.key(), getter)
        } else {
            getter.to_string()
        }
    }

    pub fn getter(&self, key: &str) -> Option<&GetterFn> {
        self.getters.iter().find(|(k, _)| k == key).map(|(_, f)| f)
    }
}

/// Location of a compiled getter
#[derive(Clone)]
pub(crate) struct GetterRef {
    pub path: ModulePath,
    pub key: String,
    pub func: GetterFn,
}

#[derive(Default)]
pub(crate) struct ModuleRegistry {
    modules: Vec<RegisteredModule>,
    global_getters: HashMap<String, GetterRef>,
    revisions: HashMap<ModulePath, u64>,
    clock: u64,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &ModulePath) -> bool {
        self.modules.iter().any(|m| &m.path == path)
    }

    pub fn find(&self, path: &ModulePath) -> Option<&RegisteredModule> {
        self.modules.iter().find(|m| &m.path == path)
    }

    /// Registered modules in registration order
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredModule> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Append a module and compile its getters into the global map
    ///
    /// Global getter keys collide last-registered-wins.
    pub fn insert(&mut self, module: RegisteredModule) {
        for (key, func) in &module.getters {
            self.global_getters.insert(
                module.global_key(key),
                GetterRef {
                    path: module.path.clone(),
                    key: key.clone(),
                    func: func.clone(),
                },
            );
        }
        let path = module.path.clone();
        self.modules.push(module);
        self.touch(&path);
    }

    /// Remove `path` and everything nested under it, returning removed paths
    pub fn remove_within(&mut self, path: &ModulePath) -> Vec<ModulePath> {
        let mut removed = Vec::new();
        self.modules.retain(|m| {
            if m.path.is_within(path) {
                removed.push(m.path.clone());
                false
            } else {
                true
            }
        });
        for gone in &removed {
            self.revisions.remove(gone);
        }
        self.rebuild_global_getters();
        self.touch(path);
        removed
    }

    fn rebuild_global_getters(&mut self) {
        self.global_getters.clear();
        for module in &self.modules {
            for (key, func) in &module.getters {
                self.global_getters.insert(
                    module.global_key(key),
                    GetterRef {
                        path: module.path.clone(),
                        key: key.clone(),
                        func: func.clone(),
                    },
                );
            }
        }
    }

    /// Resolve a commit type to the module and mutation it targets
    ///
    /// A qualified type (`app/setLoading`, `app.setLoading`) targets the module
    /// registered at that path. Otherwise the first module in registration
    /// order defining exactly `requested` wins, even when a later module
    /// defines it too. The module prefix is never stripped.
    pub fn resolve_mutation(&self, requested: &str) -> Option<(ModulePath, MutationFn)> {
        self.resolve_qualified(requested, |m| &m.mutations)
            .or_else(|| self.first_defining(requested, |m| &m.mutations))
    }

    /// Resolve a dispatch type
    ///
    /// Same as [`Self::resolve_mutation`], then falls back to the first module
    /// defining the bare action name.
    pub fn resolve_action(&self, requested: &str) -> Option<(ModulePath, ActionFn)> {
        self.resolve_qualified(requested, |m| &m.actions)
            .or_else(|| self.first_defining(requested, |m| &m.actions))
            .or_else(|| {
                let normalized = requested.replace('.', "/");
                let (_, name) = normalized.rsplit_once('/')?;
                self.first_defining(name, |m| &m.actions)
            })
    }

    fn resolve_qualified<F: Clone>(
        &self,
        requested: &str,
        table: impl Fn(&RegisteredModule) -> &HashMap<String, F>,
    ) -> Option<(ModulePath, F)> {
        let normalized = requested.replace('.', "/");
        let (module_key, name) = normalized.rsplit_once('/')?;
        let module_path = ModulePath::parse(module_key);
        let found = table(self.find(&module_path)?).get(name)?.clone();
        Some((module_path, found))
    }

    fn first_defining<F: Clone>(
        &self,
        name: &str,
        table: impl Fn(&RegisteredModule) -> &HashMap<String, F>,
    ) -> Option<(ModulePath, F)> {
        self.modules
            .iter()
            .find_map(|m| table(m).get(name).map(|f| (m.path.clone(), f.clone())))
    }

    pub fn global_getter(&self, key: &str) -> Option<&GetterRef> {
        self.global_getters.get(key)
    }

    pub fn global_getter_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.global_getters.keys().cloned().collect();
        keys.sort();
        keys
    }

    // ============ Revisions ============

    /// Mark every module overlapping `path` (ancestors and descendants) as changed
    pub fn touch(&mut self, path: &ModulePath) {
        self.clock += 1;
        let clock = self.clock;
        for module in &self.modules {
            if module.path.overlaps(path) {
                self.revisions.insert(module.path.clone(), clock);
            }
        }
    }

    /// Mark every module as changed
    pub fn touch_all(&mut self) {
        self.clock += 1;
        let clock = self.clock;
        for module in &self.modules {
            self.revisions.insert(module.path.clone(), clock);
        }
    }

    pub fn revision(&self, path: &ModulePath) -> Option<u64> {
        self.revisions.get(path).copied()
    }

    /// Revision of the whole tree; advances on every change
    pub fn root_revision(&self) -> u64 {
        self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn register(registry: &mut ModuleRegistry, path: &[&str], module: Module) {
        let (registered, _) = RegisteredModule::from_module(ModulePath::from(path), module);
        registry.insert(registered);
    }

    #[test]
    fn test_first_registered_mutation_wins() {
        let mut registry = ModuleRegistry::new();
        register(&mut registry, &["app"], Module::new("app").mutation("setLoading", |_, _| Ok(())));
        register(&mut registry, &["user"], Module::new("user").mutation("setLoading", |_, _| Ok(())));

        let (path, _) = registry.resolve_mutation("setLoading").unwrap();
        assert_eq!(path, ModulePath::from(["app"]));
        assert!(registry.resolve_mutation("missing").is_none());
    }

    #[test]
    fn test_qualified_type_prefers_named_module() {
        let mut registry = ModuleRegistry::new();
        register(&mut registry, &["app"], Module::new("app").mutation("setLoading", |_, _| Ok(())));
        register(&mut registry, &["user"], Module::new("user").mutation("setLoading", |_, _| Ok(())));
        register(
            &mut registry,
            &["user", "prefs"],
            Module::new("prefs").action("load", |_, _| async { Ok(serde_json::Value::Null) }),
        );

        let (path, _) = registry.resolve_mutation("user/setLoading").unwrap();
        assert_eq!(path, ModulePath::from(["user"]));
        let (path, _) = registry.resolve_mutation("user.setLoading").unwrap();
        assert_eq!(path, ModulePath::from(["user"]));

        // a qualified commit type never falls back to the bare name
        assert!(registry.resolve_mutation("ghost/setLoading").is_none());
        assert!(registry.resolve_mutation("user/prefs/setLoading").is_none());

        let (path, _) = registry.resolve_action("user/prefs/load").unwrap();
        assert_eq!(path, ModulePath::from(["user", "prefs"]));
        let (path, _) = registry.resolve_action("ghost/load").unwrap();
        assert_eq!(path, ModulePath::from(["user", "prefs"]));
        assert!(registry.resolve_action("nonexistent/action").is_none());
    }

    #[test]
    fn test_global_getters_last_registered_wins() {
        let mut registry = ModuleRegistry::new();
        register(&mut registry, &["a"], Module::new("a").getter("total", |_| json!(1)));
        register(&mut registry, &["b"], Module::new("b").getter("total", |_| json!(2)));
        register(
            &mut registry,
            &["c"],
            Module::new("c").namespaced(true).getter("total", |_| json!(3)),
        );

        assert_eq!(registry.global_getter("total").unwrap().path, ModulePath::from(["b"]));
        assert_eq!(registry.global_getter("c/total").unwrap().path, ModulePath::from(["c"]));
        assert_eq!(registry.global_getter_keys(), vec!["c/total", "total"]);

        registry.remove_within(&ModulePath::from(["b"]));
        assert_eq!(registry.global_getter("total").unwrap().path, ModulePath::from(["a"]));
    }

    #[test]
    fn test_remove_cascades_to_submodules() {
        let mut registry = ModuleRegistry::new();
        register(&mut registry, &["a"], Module::new("a"));
        register(&mut registry, &["a", "b"], Module::new("b"));
        register(&mut registry, &["ab"], Module::new("ab"));

        let removed = registry.remove_within(&ModulePath::from(["a"]));
        assert_eq!(removed, vec![ModulePath::from(["a"]), ModulePath::from(["a", "b"])]);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&ModulePath::from(["ab"])));
        assert_eq!(registry.revision(&ModulePath::from(["a", "b"])), None);
    }

    #[test]
    fn test_touch_bumps_overlapping_revisions() {
        let mut registry = ModuleRegistry::new();
        register(&mut registry, &["a"], Module::new("a"));
        register(&mut registry, &["a", "b"], Module::new("b"));
        register(&mut registry, &["c"], Module::new("c"));

        let a = registry.revision(&ModulePath::from(["a"])).unwrap();
        let c = registry.revision(&ModulePath::from(["c"])).unwrap();
        let root = registry.root_revision();

        registry.touch(&ModulePath::from(["a", "b"]));

        assert!(registry.revision(&ModulePath::from(["a"])).unwrap() > a);
        assert_eq!(registry.revision(&ModulePath::from(["c"])).unwrap(), c);
        assert!(registry.root_revision() > root);
    }
}
