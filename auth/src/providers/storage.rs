//! Durable key-value storage trait.

use crate::error::Result;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A change to durable storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageChange {
    /// A key was written.
    Set {
        /// Key written
        key: String,
    },
    /// A key was removed.
    Removed {
        /// Key removed
        key: String,
    },
}

impl StorageChange {
    /// The key that changed.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key } | Self::Removed { key } => key,
        }
    }
}

/// Durable key-value storage shared with the identity provider.
///
/// Both the provider and the session layer write here without coordination;
/// readers must tolerate missing or malformed values.
///
/// # Implementation Notes
///
/// - Operations are synchronous, like browser local storage
/// - Values are strings (the provider stores JSON documents)
/// - `subscribe_changes` is optional; callers fall back to polling
pub trait DurableStorage: Send + Sync + 'static {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<()>;

    /// Every key currently stored.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be read.
    fn list_keys(&self) -> Result<Vec<String>>;

    /// Native change notifications, if the backend has them.
    fn subscribe_changes(&self) -> Option<broadcast::Receiver<StorageChange>> {
        None
    }
}

impl<T: DurableStorage> DurableStorage for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        (**self).list_keys()
    }

    fn subscribe_changes(&self) -> Option<broadcast::Receiver<StorageChange>> {
        (**self).subscribe_changes()
    }
}
