//! Default state serializer

use modux_core::{Payload, PersistenceError, PersistenceResult, StateSerializer};

/// Compact JSON text
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl StateSerializer for JsonSerializer {
    fn serialize(&self, state: &Payload) -> PersistenceResult<String> {
        serde_json::to_string(state).map_err(|e| PersistenceError::Serialization(e.to_string()))
    }

    fn deserialize(&self, raw: &str) -> PersistenceResult<Payload> {
        serde_json::from_str(raw).map_err(|e| PersistenceError::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejects_malformed_input() {
        let err = JsonSerializer.deserialize("{not json").unwrap_err();
        assert!(matches!(err, PersistenceError::Deserialization(_)));
    }

    #[test]
    fn test_serializes_compactly() {
        let text = JsonSerializer.serialize(&json!({ "a": [1, 2] })).unwrap();
        assert_eq!(text, r#"{"a":[1,2]}"#);
    }
}
