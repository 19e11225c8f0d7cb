//! Include/exclude selection over dotted state keys
//!
//! Keys are the full dotted path of a value, module name first
//! (`settings.theme`, `user.profile.email`). An exclude match always wins.
//! A value matching an include keeps its whole subtree, minus anything
//! excluded below it.

use glob::Pattern;
use modux_core::Payload;
use serde_json::{Map, Value};
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl PathFilter {
    /// Compile include and exclude globs; malformed patterns are skipped
    pub fn new(include: &[String], exclude: &[String]) -> Self {
        Self {
            include: compile(include),
            exclude: compile(exclude),
        }
    }

    /// A filter that keeps everything
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_pass_through(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    fn is_excluded(&self, key: &str) -> bool {
        self.exclude.iter().any(|p| p.matches(key))
    }

    fn is_included(&self, key: &str) -> bool {
        self.include.is_empty() || self.include.iter().any(|p| p.matches(key))
    }

    /// Select the persisted part of `state` stored under `key`
    ///
    /// Returns `None` when nothing under `key` is selected.
    pub fn apply(&self, key: &str, state: &Payload) -> Option<Payload> {
        if self.is_pass_through() {
            return Some(state.clone());
        }
        self.select(key, state, false)
    }

    fn select(&self, key: &str, value: &Payload, included: bool) -> Option<Payload> {
        if self.is_excluded(key) {
            return None;
        }
        let included = included || self.is_included(key);

        match value {
            Value::Object(entries) => {
                let mut kept = Map::new();
                for (child, child_value) in entries {
                    let child_key = format!("{}.{}", key, child);
                    if let Some(selected) = self.select(&child_key, child_value, included) {
                        kept.insert(child.clone(), selected);
                    }
                }
                // an included empty object is still worth keeping
                if kept.is_empty() && !(included && entries.is_empty()) {
                    None
                } else {
                    Some(Value::Object(kept))
                }
            }
            _ if included => Some(value.clone()),
            _ => None,
        }
    }
}

fn compile(patterns: &[String]) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|raw| match Pattern::new(raw) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!("Ignoring invalid path pattern {:?}: {}", raw, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter(include: &[&str], exclude: &[&str]) -> PathFilter {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        PathFilter::new(&owned(include), &owned(exclude))
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let state = json!({ "a": 1, "b": { "c": 2 } });
        assert_eq!(PathFilter::allow_all().apply("m", &state), Some(state));
    }

    #[test]
    fn test_include_selects_nested_keys() {
        let state = json!({
            "theme": "dark",
            "profile": { "email": "a@b.c", "token": "t" },
            "cache": [1, 2, 3]
        });
        let selected = filter(&["user.theme", "user.profile.*"], &[]).apply("user", &state);

        assert_eq!(
            selected,
            Some(json!({ "theme": "dark", "profile": { "email": "a@b.c", "token": "t" } }))
        );
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let state = json!({ "profile": { "email": "a@b.c", "token": "t" } });
        let selected = filter(&["user.*"], &["*.token"]).apply("user", &state);

        assert_eq!(selected, Some(json!({ "profile": { "email": "a@b.c" } })));
    }

    #[test]
    fn test_excluded_module_selects_nothing() {
        let state = json!({ "x": 1 });
        assert_eq!(filter(&[], &["session"]).apply("session", &state), None);
        assert_eq!(filter(&["other.*"], &[]).apply("session", &state), None);
    }

    #[test]
    fn test_question_mark_matches_single_char() {
        let state = json!({ "a1": 1, "a22": 2 });
        assert_eq!(filter(&["m.a?"], &[]).apply("m", &state), Some(json!({ "a1": 1 })));
    }
}
