//! Memoized getters
//!
//! Each evaluation records which module revisions it read (or the root
//! revision, when it touched root state or root getters). A cached value is
//! reused until one of those revisions moves.

use modux_core::{ModulePath, Payload};
use parking_lot::Mutex;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use crate::registry::{GetterRef, ModuleRegistry};
use crate::tree;

type GetterId = (ModulePath, String);

/// Revisions a getter value was computed against
#[derive(Debug, Clone, Default)]
pub(crate) struct Dependencies {
    modules: BTreeMap<ModulePath, u64>,
    root: Option<u64>,
}

impl Dependencies {
    fn merge(&mut self, other: &Dependencies) {
        for (path, revision) in &other.modules {
            self.modules.insert(path.clone(), *revision);
        }
        if other.root.is_some() {
            self.root = other.root;
        }
    }

    fn is_fresh(&self, registry: &ModuleRegistry) -> bool {
        if let Some(root) = self.root {
            if root != registry.root_revision() {
                return false;
            }
        }
        self.modules
            .iter()
            .all(|(path, revision)| registry.revision(path) == Some(*revision))
    }
}

struct CachedValue {
    value: Payload,
    deps: Dependencies,
}

/// Memo table shared by every getter of one store
#[derive(Default)]
pub(crate) struct GetterCache {
    entries: Mutex<HashMap<GetterId, CachedValue>>,
}

impl GetterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop cached values for modules at or under `path`
    pub fn invalidate_within(&self, path: &ModulePath) {
        self.entries.lock().retain(|(p, _), _| !p.is_within(path));
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Everything a getter body may read
///
/// Mirrors the `(state, getters, rootState, rootGetters)` argument order.
pub struct GetterContext<'a> {
    tree: &'a Payload,
    registry: &'a ModuleRegistry,
    cache: &'a GetterCache,
    stack: &'a RefCell<Vec<GetterId>>,
    path: &'a ModulePath,
    deps: RefCell<Dependencies>,
}

impl<'a> GetterContext<'a> {
    /// The owning module's local state
    pub fn state(&self) -> &'a Payload {
        if let Some(revision) = self.registry.revision(self.path) {
            self.deps
                .borrow_mut()
                .modules
                .insert(self.path.clone(), revision);
        }
        static NULL: Value = Value::Null;
        tree::get_at(self.tree, self.path).unwrap_or(&NULL)
    }

    /// Another getter of the owning module, by bare key
    pub fn getter(&self, key: &str) -> Option<Payload> {
        let module = self.registry.find(self.path)?;
        let func = module.getter(key)?.clone();
        let target = GetterRef {
            path: self.path.clone(),
            key: key.to_string(),
            func,
        };
        self.nested(&target)
    }

    /// The full state tree
    pub fn root_state(&self) -> &'a Payload {
        self.deps.borrow_mut().root = Some(self.registry.root_revision());
        self.tree
    }

    /// A getter from the global map, by (possibly namespaced) key
    pub fn root_getter(&self, key: &str) -> Option<Payload> {
        let target = self.registry.global_getter(key)?.clone();
        self.deps.borrow_mut().root = Some(self.registry.root_revision());
        self.nested(&target)
    }

    /// Registration path of the owning module
    pub fn path(&self) -> &ModulePath {
        self.path
    }

    fn nested(&self, target: &GetterRef) -> Option<Payload> {
        let (value, deps) = evaluate(self.tree, self.registry, self.cache, self.stack, target)?;
        self.deps.borrow_mut().merge(&deps);
        Some(value)
    }
}

/// Evaluate a getter, reusing the cached value while its dependencies hold
///
/// Returns `None` for a getter that (transitively) reads itself.
pub(crate) fn evaluate(
    tree: &Payload,
    registry: &ModuleRegistry,
    cache: &GetterCache,
    stack: &RefCell<Vec<GetterId>>,
    target: &GetterRef,
) -> Option<(Payload, Dependencies)> {
    let id: GetterId = (target.path.clone(), target.key.clone());

    if let Some(hit) = cache.entries.lock().get(&id) {
        if hit.deps.is_fresh(registry) {
            return Some((hit.value.clone(), hit.deps.clone()));
        }
    }

    if stack.borrow().contains(&id) {
        warn!("Getter {}/{} depends on itself", target.path, target.key);
        return None;
    }

    stack.borrow_mut().push(id.clone());
    let ctx = GetterContext {
        tree,
        registry,
        cache,
        stack,
        path: &target.path,
        deps: RefCell::new(Dependencies::default()),
    };
    let value = (target.func)(&ctx);
    let deps = ctx.deps.into_inner();
    stack.borrow_mut().pop();

    cache.entries.lock().insert(
        id,
        CachedValue {
            value: value.clone(),
            deps: deps.clone(),
        },
    );
    Some((value, deps))
}

/// Evaluate from the top of a fresh call stack
pub(crate) fn evaluate_root(
    tree: &Payload,
    registry: &ModuleRegistry,
    cache: &GetterCache,
    target: &GetterRef,
) -> Option<Payload> {
    let stack = RefCell::new(Vec::new());
    evaluate(tree, registry, cache, &stack, target).map(|(value, _)| value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;
    use crate::registry::RegisteredModule;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn setup(modules: Vec<(&[&str], Module)>) -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        for (path, module) in modules {
            let (registered, _) = RegisteredModule::from_module(ModulePath::from(path), module);
            registry.insert(registered);
        }
        registry
    }

    #[test]
    fn test_getter_memoized_until_dependency_changes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let mut registry = setup(vec![
            (
                &["cart"][..],
                Module::new("cart").getter("count", move |ctx| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    json!(ctx.state()["items"].as_array().map(Vec::len).unwrap_or(0))
                }),
            ),
            (&["user"][..], Module::new("user")),
        ]);
        let cache = GetterCache::new();
        let mut state = json!({ "cart": { "items": [1, 2] }, "user": {} });
        let target = registry.global_getter("count").unwrap().clone();

        assert_eq!(evaluate_root(&state, &registry, &cache, &target), Some(json!(2)));
        assert_eq!(evaluate_root(&state, &registry, &cache, &target), Some(json!(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // unrelated module changes keep the cached value
        registry.touch(&ModulePath::from(["user"]));
        assert_eq!(evaluate_root(&state, &registry, &cache, &target), Some(json!(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        state["cart"]["items"] = json!([1, 2, 3]);
        registry.touch(&ModulePath::from(["cart"]));
        assert_eq!(evaluate_root(&state, &registry, &cache, &target), Some(json!(3)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_root_getter_dependency_tracks_root() {
        let registry = setup(vec![
            (
                &["a"][..],
                Module::new("a").getter("base", |ctx| ctx.state()["n"].clone()),
            ),
            (
                &["b"][..],
                Module::new("b").getter("doubled", |ctx| {
                    let base = ctx.root_getter("base").and_then(|v| v.as_i64()).unwrap_or(0);
                    json!(base * 2)
                }),
            ),
        ]);
        let cache = GetterCache::new();
        let state = json!({ "a": { "n": 21 }, "b": {} });
        let target = registry.global_getter("doubled").unwrap().clone();

        assert_eq!(evaluate_root(&state, &registry, &cache, &target), Some(json!(42)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_local_getter_composition() {
        let registry = setup(vec![(
            &["todo"][..],
            Module::new("todo")
                .getter("items", |ctx| ctx.state()["items"].clone())
                .getter("open", |ctx| {
                    let items = ctx.getter("items").unwrap_or_default();
                    let open = items
                        .as_array()
                        .map(|list| list.iter().filter(|i| i["done"] == json!(false)).count())
                        .unwrap_or(0);
                    json!(open)
                }),
        )]);
        let cache = GetterCache::new();
        let state = json!({ "todo": { "items": [{ "done": false }, { "done": true }] } });
        let target = registry.global_getter("open").unwrap().clone();

        assert_eq!(evaluate_root(&state, &registry, &cache, &target), Some(json!(1)));
    }

    #[test]
    fn test_self_referential_getter_returns_none() {
        let registry = setup(vec![(
            &["loop"][..],
            Module::new("loop").getter("me", |ctx| ctx.getter("me").unwrap_or(json!("cycle"))),
        )]);
        let cache = GetterCache::new();
        let state = json!({ "loop": {} });
        let target = registry.global_getter("me").unwrap().clone();

        assert_eq!(evaluate_root(&state, &registry, &cache, &target), Some(json!("cycle")));
    }
}
