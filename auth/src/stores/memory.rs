//! In-memory durable storage.

use super::CHANGE_CHANNEL_CAPACITY;
use crate::error::Result;
use crate::providers::{DurableStorage, StorageChange};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// In-process storage with change notifications.
///
/// Clones share the same map, so a clone handed to a simulated provider
/// writes where the gateway reads.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
    changes: broadcast::Sender<StorageChange>,
}

impl MemoryStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            changes,
        }
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self, change: StorageChange) {
        // No subscribers is fine
        let _ = self.changes.send(change);
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl DurableStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        self.notify(StorageChange::Set {
            key: key.to_string(),
        });
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        if removed.is_some() {
            self.notify(StorageChange::Removed {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }

    fn subscribe_changes(&self) -> Option<broadcast::Receiver<StorageChange>> {
        Some(self.changes.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() -> Result<()> {
        let storage = MemoryStorage::new();
        storage.set("sb-x-auth-token", "{}")?;
        assert_eq!(storage.get("sb-x-auth-token")?, Some("{}".to_string()));
        assert_eq!(storage.list_keys()?, vec!["sb-x-auth-token"]);

        storage.remove("sb-x-auth-token")?;
        storage.remove("missing")?;
        assert!(storage.is_empty());
        Ok(())
    }

    #[test]
    fn test_clones_share_entries() -> Result<()> {
        let storage = MemoryStorage::new();
        let provider_side = storage.clone();
        provider_side.set("k", "v")?;
        assert_eq!(storage.get("k")?, Some("v".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_change_notifications() -> Result<()> {
        let storage = MemoryStorage::new();
        let Some(mut changes) = storage.subscribe_changes() else {
            unreachable!("memory storage always notifies");
        };

        storage.set("k", "v")?;
        storage.remove("k")?;
        storage.remove("k")?;

        assert_eq!(changes.recv().await.ok(), Some(StorageChange::Set { key: "k".into() }));
        assert_eq!(
            changes.recv().await.ok(),
            Some(StorageChange::Removed { key: "k".into() })
        );
        assert!(changes.try_recv().is_err());
        Ok(())
    }
}
