//! Core traits defining modux interfaces
//!
//! These traits define the seams between the store engine and its
//! persistence backends.

use crate::error::{PersistenceError, StoreError, StrategyError};
use crate::types::Payload;
use async_trait::async_trait;

/// Result type for store engine operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for persistence manager operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Result type for strategy operations
pub type StrategyResult<T> = Result<T, StrategyError>;

/// Pluggable key/value persistence backend
///
/// `remove` and `clear` succeed on missing keys. Backend failures are
/// reported as [`StrategyError`] carrying the strategy name and operation.
#[async_trait]
pub trait PersistenceStrategy: Send + Sync {
    /// Strategy name used in error reports
    fn name(&self) -> &str;

    /// Store a serialized blob
    async fn save(&self, key: &str, value: &str) -> StrategyResult<()>;

    /// Load a serialized blob
    async fn load(&self, key: &str) -> StrategyResult<Option<String>>;

    /// Remove a key
    async fn remove(&self, key: &str) -> StrategyResult<()>;

    /// Remove every key
    async fn clear(&self) -> StrategyResult<()>;

    /// Check if a key exists
    async fn has(&self, key: &str) -> StrategyResult<bool>;

    /// List all keys
    async fn keys(&self) -> StrategyResult<Vec<String>>;
}

/// Synchronous sink for the last-chance write during teardown
///
/// Teardown cannot wait on async work, so this path never touches a
/// [`PersistenceStrategy`]. Failures carry the sink name and operation.
pub trait UnloadSink: Send + Sync {
    fn write(&self, key: &str, value: &str) -> StrategyResult<()>;

    fn read(&self, key: &str) -> StrategyResult<Option<String>>;

    /// Succeeds on a missing key
    fn remove(&self, key: &str) -> StrategyResult<()>;
}

/// Converts module state to and from its persisted text form
pub trait StateSerializer: Send + Sync {
    fn serialize(&self, state: &Payload) -> PersistenceResult<String>;

    fn deserialize(&self, raw: &str) -> PersistenceResult<Payload>;
}
