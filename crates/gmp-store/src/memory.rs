//! In-memory checkpoint store for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::CheckpointStore;
use gmp_types::{RelayError, Result, TaskId};

/// In-memory checkpoint store (for testing and ephemeral use).
#[derive(Default)]
pub struct MemoryStore {
    checkpoints: Mutex<HashMap<String, TaskId>>,
    saves: Mutex<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a checkpoint, e.g. to simulate a restart.
    pub fn with_checkpoint(chain: &str, task_id: &str) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.checkpoints.lock() {
            map.insert(chain.to_string(), TaskId::new(task_id));
        }
        store
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> u64 {
        self.saves.lock().map(|n| *n).unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> RelayError {
    RelayError::Store("memory store lock poisoned".into())
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn load(&self, chain: &str) -> Result<Option<TaskId>> {
        let checkpoints = self.checkpoints.lock().map_err(poisoned)?;
        Ok(checkpoints.get(chain).cloned())
    }

    async fn save(&self, chain: &str, task_id: &TaskId) -> Result<()> {
        let mut checkpoints = self.checkpoints.lock().map_err(poisoned)?;
        checkpoints.insert(chain.to_string(), task_id.clone());
        *self.saves.lock().map_err(poisoned)? += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_absent_then_saved() {
        let store = MemoryStore::new();
        assert_eq!(store.load("avalanche").await.unwrap(), None);

        store.save("avalanche", &TaskId::new("5")).await.unwrap();
        store.save("avalanche", &TaskId::new("5")).await.unwrap();
        assert_eq!(store.load("avalanche").await.unwrap(), Some(TaskId::new("5")));
        assert_eq!(store.save_count(), 2);
    }

    #[tokio::test]
    async fn test_chains_are_independent() {
        let store = MemoryStore::with_checkpoint("fantom", "9");
        store.save("polygon", &TaskId::new("1")).await.unwrap();
        assert_eq!(store.load("fantom").await.unwrap(), Some(TaskId::new("9")));
        assert_eq!(store.load("polygon").await.unwrap(), Some(TaskId::new("1")));
    }
}
