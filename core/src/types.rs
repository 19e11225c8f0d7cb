//! Core types for modux
//!
//! Defines the data records that flow between the store engine, its
//! subscribers and the persistence layer.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::StoreError;
use crate::traits::StoreResult;

/// Dynamic payload carried by mutations and actions, and the shape of all state
pub type Payload = serde_json::Value;

/// Encode a typed value as a payload
pub fn payload_from<T: Serialize>(value: &T) -> StoreResult<Payload> {
    serde_json::to_value(value).map_err(|e| StoreError::Payload(e.to_string()))
}

/// Decode a payload into a typed value
pub fn decode_payload<T: DeserializeOwned>(payload: &Payload) -> StoreResult<T> {
    serde_json::from_value(payload.clone()).map_err(|e| StoreError::Payload(e.to_string()))
}

/// Timestamp in milliseconds since Unix epoch
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        Timestamp(chrono::Utc::now().timestamp_millis() as u64)
    }

    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed between `self` and `later`, zero if `later` is earlier
    pub fn elapsed_until(&self, later: Timestamp) -> u64 {
        later.0.saturating_sub(self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Registration path of a module inside the state tree
///
/// `["user", "prefs"]` mounts at `root.user.prefs`. The canonical string form
/// joins segments with `/`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct ModulePath(Vec<String>);

impl ModulePath {
    pub fn new(segments: Vec<String>) -> Self {
        ModulePath(segments)
    }

    /// Parse a path written as `a/b/c` or `a.b.c`
    pub fn parse(s: &str) -> Self {
        ModulePath(
            s.split(|c: char| c == '/' || c == '.')
                .filter(|seg| !seg.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn root() -> Self {
        ModulePath(Vec::new())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Last segment, the module's own name
    pub fn leaf(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<ModulePath> {
        if self.0.is_empty() {
            None
        } else {
            Some(ModulePath(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn child(&self, name: &str) -> ModulePath {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        ModulePath(segments)
    }

    /// True when `self` equals `ancestor` or is nested under it
    pub fn is_within(&self, ancestor: &ModulePath) -> bool {
        self.0.len() >= ancestor.0.len() && self.0[..ancestor.0.len()] == ancestor.0[..]
    }

    /// True when one path is nested in (or equal to) the other
    pub fn overlaps(&self, other: &ModulePath) -> bool {
        self.is_within(other) || other.is_within(self)
    }

    /// Canonical `a/b/c` key
    pub fn key(&self) -> String {
        self.0.join("/")
    }

    /// Dotted `a.b.c` form used by state lookups and persistence filters
    pub fn dotted(&self) -> String {
        self.0.join(".")
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl fmt::Debug for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModulePath({})", self.key())
    }
}

impl From<&str> for ModulePath {
    fn from(s: &str) -> Self {
        ModulePath::parse(s)
    }
}

impl From<String> for ModulePath {
    fn from(s: String) -> Self {
        ModulePath::parse(&s)
    }
}

impl From<&[&str]> for ModulePath {
    fn from(segments: &[&str]) -> Self {
        ModulePath(segments.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ModulePath {
    fn from(segments: [&str; N]) -> Self {
        ModulePath(segments.iter().map(|s| s.to_string()).collect())
    }
}

impl From<Vec<String>> for ModulePath {
    fn from(segments: Vec<String>) -> Self {
        ModulePath(segments)
    }
}

/// Record of a committed mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationPayload {
    #[serde(rename = "type")]
    pub mutation_type: String,
    pub payload: Payload,
    pub timestamp: Timestamp,
}

impl MutationPayload {
    pub fn new(mutation_type: impl Into<String>, payload: Payload) -> Self {
        Self {
            mutation_type: mutation_type.into(),
            payload,
            timestamp: Timestamp::now(),
        }
    }
}

/// Record of a dispatched action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPayload {
    #[serde(rename = "type")]
    pub action_type: String,
    pub payload: Payload,
    pub timestamp: Timestamp,
}

impl ActionPayload {
    pub fn new(action_type: impl Into<String>, payload: Payload) -> Self {
        Self {
            action_type: action_type.into(),
            payload,
            timestamp: Timestamp::now(),
        }
    }
}

/// Options accepted by `commit`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitOptions {
    /// Treat the type as a root-level name even when committed from a module context
    pub root: bool,
    /// Skip the history snapshot and mutation subscribers
    pub silent: bool,
}

impl CommitOptions {
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Default::default()
        }
    }

    pub fn root() -> Self {
        Self {
            root: true,
            ..Default::default()
        }
    }
}

/// Options accepted by `dispatch`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Treat the type as a root-level name even when dispatched from a module context
    pub root: bool,
}

impl DispatchOptions {
    pub fn root() -> Self {
        Self { root: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_module_path_parse() {
        let slash = ModulePath::parse("user/prefs");
        let dotted = ModulePath::parse("user.prefs");
        assert_eq!(slash, dotted);
        assert_eq!(slash.key(), "user/prefs");
        assert_eq!(slash.dotted(), "user.prefs");
        assert_eq!(slash.leaf(), Some("prefs"));
        assert!(ModulePath::parse("").is_root());
    }

    #[test]
    fn test_module_path_nesting() {
        let a = ModulePath::from(["a"]);
        let ab = a.child("b");
        let ac = ModulePath::from(["ac"]);

        assert!(ab.is_within(&a));
        assert!(a.is_within(&a));
        assert!(!a.is_within(&ab));
        assert!(!ac.is_within(&a));
        assert!(a.overlaps(&ab));
        assert_eq!(ab.parent(), Some(a));
    }

    #[test]
    fn test_typed_payload() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Login {
            user: String,
            remember: bool,
        }

        let login = Login {
            user: "ada".into(),
            remember: true,
        };
        let payload = payload_from(&login).unwrap();
        assert_eq!(payload, json!({ "user": "ada", "remember": true }));

        let decoded: Login = decode_payload(&payload).unwrap();
        assert_eq!(decoded, login);

        assert!(decode_payload::<Login>(&json!(42)).is_err());
    }

    #[test]
    fn test_mutation_payload_wire_shape() {
        let record = MutationPayload {
            mutation_type: "setLoading".into(),
            payload: json!(true),
            timestamp: Timestamp::from_millis(7),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value, json!({ "type": "setLoading", "payload": true, "timestamp": 7 }));
    }
}
