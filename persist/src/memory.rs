//! In-memory strategy for tests and short-lived sessions

use async_trait::async_trait;
use dashmap::DashMap;
use modux_core::{PersistenceStrategy, StrategyError, StrategyOperation, StrategyResult, UnloadSink};

const STRATEGY_NAME: &str = "memory";

/// Key/value strategy held in process memory
///
/// An optional byte quota (keys plus values) mimics the small, fast
/// storage tier; a save that would exceed it fails without writing.
pub struct MemoryStrategy {
    data: DashMap<String, String>,
    quota: Option<usize>,
}

impl MemoryStrategy {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            quota: None,
        }
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            data: DashMap::new(),
            quota: Some(quota),
        }
    }

    pub fn with_data(data: Vec<(String, String)>) -> Self {
        let strategy = Self::new();
        for (key, value) in data {
            strategy.data.insert(key, value);
        }
        strategy
    }

    /// Bytes currently held
    pub fn used_bytes(&self) -> usize {
        self.data
            .iter()
            .map(|entry| entry.key().len() + entry.value().len())
            .sum()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn check_quota(&self, key: &str, value: &str) -> StrategyResult<()> {
        let Some(quota) = self.quota else {
            return Ok(());
        };
        let replaced = self
            .data
            .get(key)
            .map(|existing| key.len() + existing.value().len())
            .unwrap_or(0);
        let needed = self.used_bytes() - replaced + key.len() + value.len();
        if needed > quota {
            return Err(StrategyError::new(
                STRATEGY_NAME,
                StrategyOperation::Save,
                format!("quota of {} bytes exceeded ({} needed)", quota, needed),
            ));
        }
        Ok(())
    }
}

impl Default for MemoryStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceStrategy for MemoryStrategy {
    fn name(&self) -> &str {
        STRATEGY_NAME
    }

    async fn save(&self, key: &str, value: &str) -> StrategyResult<()> {
        self.check_quota(key, value)?;
        self.data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn load(&self, key: &str) -> StrategyResult<Option<String>> {
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }

    async fn remove(&self, key: &str) -> StrategyResult<()> {
        self.data.remove(key);
        Ok(())
    }

    async fn clear(&self) -> StrategyResult<()> {
        self.data.clear();
        Ok(())
    }

    async fn has(&self, key: &str) -> StrategyResult<bool> {
        Ok(self.data.contains_key(key))
    }

    async fn keys(&self) -> StrategyResult<Vec<String>> {
        let mut keys: Vec<String> = self.data.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }
}

impl UnloadSink for MemoryStrategy {
    fn write(&self, key: &str, value: &str) -> StrategyResult<()> {
        self.check_quota(key, value)?;
        self.data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn read(&self, key: &str) -> StrategyResult<Option<String>> {
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }

    fn remove(&self, key: &str) -> StrategyResult<()> {
        self.data.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_strategy_basic() {
        let strategy = MemoryStrategy::new();

        strategy.save("k1", "v1").await.unwrap();
        assert_eq!(strategy.load("k1").await.unwrap(), Some("v1".to_string()));
        assert!(strategy.has("k1").await.unwrap());

        PersistenceStrategy::remove(&strategy, "k1").await.unwrap();
        assert_eq!(strategy.load("k1").await.unwrap(), None);
        // removing a missing key is fine
        PersistenceStrategy::remove(&strategy, "k1").await.unwrap();
        strategy.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_keys_sorted() {
        let strategy = MemoryStrategy::with_data(vec![
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ]);
        assert_eq!(strategy.keys().await.unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_unload_sink_shares_entries() {
        let strategy = MemoryStrategy::new();
        strategy.write("modux:__unload", "blob").unwrap();
        assert_eq!(strategy.read("modux:__unload").unwrap(), Some("blob".to_string()));
        UnloadSink::remove(&strategy, "modux:__unload").unwrap();
        assert!(strategy.is_empty());
    }

    #[tokio::test]
    async fn test_quota_rejects_oversized_save() {
        let strategy = MemoryStrategy::with_quota(10);
        strategy.save("k", "12345").await.unwrap();
        // overwriting the same key only counts the new value
        strategy.save("k", "123456789").await.unwrap();

        let err = strategy.save("k2", "x").await.unwrap_err();
        assert_eq!(err.strategy, "memory");
        assert_eq!(err.operation, StrategyOperation::Save);
        assert_eq!(strategy.load("k2").await.unwrap(), None);
    }
}
