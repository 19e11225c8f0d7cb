//! Error types for modux

use std::fmt;
use thiserror::Error;

/// Store engine errors
#[derive(Error, Debug)]
pub enum StoreError {
    // ============ Resolution Errors ============
    #[error("Unknown action type: {0}")]
    UnknownAction(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    // ============ Execution Errors ============
    #[error("Mutation {mutation} failed: {source}")]
    Mutation {
        mutation: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Action {action} failed: {source}")]
    Action {
        action: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Direct state write rejected in strict mode: {0}")]
    StrictMode(String),

    #[error("Invalid payload: {0}")]
    Payload(String),

    #[error("Invalid state tree: {0}")]
    InvalidState(String),

    // ============ Persistence Errors ============
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Persistence manager errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error("Encryption is enabled but no encryption key is configured")]
    MissingEncryptionKey,

    #[error("State serialization failed: {0}")]
    Serialization(String),

    #[error("State deserialization failed: {0}")]
    Deserialization(String),

    #[error("Cipher error: {0}")]
    Cipher(String),

    #[error("Restored state could not be applied: {0}")]
    Hydrate(String),

    #[error("Unload sink failed: {0}")]
    Unload(#[source] StrategyError),

    #[error("No async runtime available: {0}")]
    Runtime(String),
}

/// The strategy operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyOperation {
    Open,
    Save,
    Load,
    Remove,
    Clear,
    Has,
    Keys,
}

impl fmt::Display for StrategyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyOperation::Open => "open",
            StrategyOperation::Save => "save",
            StrategyOperation::Load => "load",
            StrategyOperation::Remove => "remove",
            StrategyOperation::Clear => "clear",
            StrategyOperation::Has => "has",
            StrategyOperation::Keys => "keys",
        };
        f.write_str(name)
    }
}

/// Uniform wrapper for backend I/O failures
#[derive(Error, Debug)]
#[error("{strategy} strategy failed to {operation}: {message}")]
pub struct StrategyError {
    pub strategy: String,
    pub operation: StrategyOperation,
    pub message: String,
}

impl StrategyError {
    pub fn new(
        strategy: impl Into<String>,
        operation: StrategyOperation,
        cause: impl fmt::Display,
    ) -> Self {
        Self {
            strategy: strategy.into(),
            operation,
            message: cause.to_string(),
        }
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_error_carries_context() {
        let err = StrategyError::new("sled", StrategyOperation::Save, "disk full");
        assert_eq!(err.strategy, "sled");
        assert_eq!(err.operation, StrategyOperation::Save);
        assert_eq!(err.to_string(), "sled strategy failed to save: disk full");

        let wrapped: StoreError = PersistenceError::from(err).into();
        assert!(wrapped.to_string().contains("disk full"));
    }

    #[test]
    fn test_mutation_error_message() {
        let err = StoreError::Mutation {
            mutation: "increment".into(),
            source: anyhow::anyhow!("counter overflow"),
        };
        assert_eq!(err.to_string(), "Mutation increment failed: counter overflow");
    }
}
