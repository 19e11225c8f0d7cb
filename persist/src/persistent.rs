//! Persistent strategy backed by a sled database

use async_trait::async_trait;
use modux_core::{PersistenceStrategy, StrategyError, StrategyOperation, StrategyResult};
use sled::{Db, Tree};
use std::path::Path;

const STRATEGY_NAME: &str = "sled";
const DEFAULT_TREE: &str = "modux";

/// Document-store strategy; every key is one entry in a sled tree
pub struct SledStrategy {
    db: Db,
    tree: Tree,
}

impl SledStrategy {
    pub fn open<P: AsRef<Path>>(path: P) -> StrategyResult<Self> {
        Self::open_tree(path, DEFAULT_TREE)
    }

    /// Open a named tree, so several stores can share one database
    pub fn open_tree<P: AsRef<Path>>(path: P, tree: &str) -> StrategyResult<Self> {
        let db = sled::open(path).map_err(|e| failure(StrategyOperation::Open, e))?;
        let tree = db
            .open_tree(tree)
            .map_err(|e| failure(StrategyOperation::Open, e))?;
        Ok(Self { db, tree })
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Approximate on-disk size of the whole database
    pub fn size_on_disk(&self) -> StrategyResult<u64> {
        self.db
            .size_on_disk()
            .map_err(|e| failure(StrategyOperation::Keys, e))
    }

    async fn flush(&self, operation: StrategyOperation) -> StrategyResult<()> {
        self.tree
            .flush_async()
            .await
            .map_err(|e| failure(operation, e))?;
        Ok(())
    }
}

fn failure(operation: StrategyOperation, cause: sled::Error) -> StrategyError {
    StrategyError::new(STRATEGY_NAME, operation, cause)
}

#[async_trait]
impl PersistenceStrategy for SledStrategy {
    fn name(&self) -> &str {
        STRATEGY_NAME
    }

    async fn save(&self, key: &str, value: &str) -> StrategyResult<()> {
        self.tree
            .insert(key.as_bytes(), value.as_bytes())
            .map_err(|e| failure(StrategyOperation::Save, e))?;
        self.flush(StrategyOperation::Save).await
    }

    async fn load(&self, key: &str) -> StrategyResult<Option<String>> {
        let Some(bytes) = self
            .tree
            .get(key.as_bytes())
            .map_err(|e| failure(StrategyOperation::Load, e))?
        else {
            return Ok(None);
        };
        String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|e| StrategyError::new(STRATEGY_NAME, StrategyOperation::Load, e))
    }

    async fn remove(&self, key: &str) -> StrategyResult<()> {
        self.tree
            .remove(key.as_bytes())
            .map_err(|e| failure(StrategyOperation::Remove, e))?;
        self.flush(StrategyOperation::Remove).await
    }

    async fn clear(&self) -> StrategyResult<()> {
        self.tree
            .clear()
            .map_err(|e| failure(StrategyOperation::Clear, e))?;
        self.flush(StrategyOperation::Clear).await
    }

    async fn has(&self, key: &str) -> StrategyResult<bool> {
        self.tree
            .contains_key(key.as_bytes())
            .map_err(|e| failure(StrategyOperation::Has, e))
    }

    async fn keys(&self) -> StrategyResult<Vec<String>> {
        self.tree
            .iter()
            .keys()
            .map(|result| {
                let key = result.map_err(|e| failure(StrategyOperation::Keys, e))?;
                String::from_utf8(key.to_vec())
                    .map_err(|e| StrategyError::new(STRATEGY_NAME, StrategyOperation::Keys, e))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sled_strategy_basic() {
        let tmp = TempDir::new().unwrap();
        let strategy = SledStrategy::open(tmp.path()).unwrap();

        strategy.save("modux:app", r#"{"a":1}"#).await.unwrap();
        assert_eq!(
            strategy.load("modux:app").await.unwrap(),
            Some(r#"{"a":1}"#.to_string())
        );
        assert!(strategy.has("modux:app").await.unwrap());

        strategy.remove("modux:app").await.unwrap();
        assert_eq!(strategy.load("modux:app").await.unwrap(), None);
        strategy.remove("modux:app").await.unwrap();
    }

    #[tokio::test]
    async fn test_sled_strategy_reopen() {
        let tmp = TempDir::new().unwrap();

        {
            let strategy = SledStrategy::open(tmp.path()).unwrap();
            strategy.save("b", "2").await.unwrap();
            strategy.save("a", "1").await.unwrap();
        }

        let strategy = SledStrategy::open(tmp.path()).unwrap();
        assert_eq!(strategy.keys().await.unwrap(), vec!["a", "b"]);
        assert_eq!(strategy.len(), 2);

        strategy.clear().await.unwrap();
        assert!(strategy.is_empty());
    }
}
