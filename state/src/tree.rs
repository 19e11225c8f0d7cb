//! Path operations over the shared state tree
//!
//! The tree is a single JSON object; every module's state is mounted at the
//! object path formed by its registration path.

use modux_core::{ModulePath, Payload, StoreError, StoreResult};
use serde_json::{Map, Value};

/// Borrow the subtree mounted at `path`
pub fn get_at<'a>(tree: &'a Payload, path: &ModulePath) -> Option<&'a Payload> {
    path.segments()
        .iter()
        .try_fold(tree, |node, segment| node.as_object()?.get(segment))
}

/// Mutably borrow the subtree mounted at `path`
pub fn get_at_mut<'a>(tree: &'a mut Payload, path: &ModulePath) -> Option<&'a mut Payload> {
    path.segments()
        .iter()
        .try_fold(tree, |node, segment| node.as_object_mut()?.get_mut(segment))
}

/// Look up a dotted path such as `user.prefs.theme`
pub fn get_dotted<'a>(tree: &'a Payload, dotted: &str) -> Option<&'a Payload> {
    get_at(tree, &ModulePath::parse(dotted))
}

/// Mount `state` at `path`, creating empty objects for missing parents
pub fn mount(tree: &mut Payload, path: &ModulePath, state: Payload) -> StoreResult<()> {
    let (leaf, parents) = path
        .segments()
        .split_last()
        .ok_or_else(|| StoreError::InvalidState("cannot mount a module at the root".into()))?;

    let mut node = tree;
    for segment in parents {
        let object = node.as_object_mut().ok_or_else(|| {
            StoreError::InvalidState(format!("parent of {} is not an object", path))
        })?;
        node = object
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let object = node
        .as_object_mut()
        .ok_or_else(|| StoreError::InvalidState(format!("parent of {} is not an object", path)))?;
    object.insert(leaf.clone(), state);
    Ok(())
}

/// Remove and return the subtree at `path`
pub fn unmount(tree: &mut Payload, path: &ModulePath) -> Option<Payload> {
    let (leaf, parents) = path.segments().split_last()?;
    let parent = get_at_mut(tree, &ModulePath::new(parents.to_vec()))?;
    parent.as_object_mut()?.remove(leaf)
}

/// Assign each top-level key of `source` onto `target`
///
/// Keys of `target` missing from `source` are left alone. A non-object on
/// either side replaces `target` wholesale.
pub fn shallow_merge(target: &mut Payload, source: Payload) {
    match source {
        Value::Object(incoming) if target.is_object() => {
            if let Some(existing) = target.as_object_mut() {
                existing.extend(incoming);
            }
        }
        source => *target = source,
    }
}

/// One-level comparison used by non-deep watchers
///
/// Scalars compare by value; containers compare by kind and immediate shape
/// (key set or length), so edits nested below the first level go unnoticed.
pub fn shallow_eq(a: &Payload, b: &Payload) -> bool {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(key, left)| {
                    y.get(key)
                        .map(|right| same_kind_or_equal(left, right))
                        .unwrap_or(false)
                })
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| same_kind_or_equal(l, r))
        }
        _ => a == b,
    }
}

fn same_kind_or_equal(a: &Payload, b: &Payload) -> bool {
    match (a, b) {
        (Value::Object(_), Value::Object(_)) | (Value::Array(_), Value::Array(_)) => true,
        _ => a == b,
    }
}
