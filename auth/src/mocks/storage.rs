//! Storage with failure injection for testing.

use crate::error::{Result, SessionError};
use crate::providers::{DurableStorage, StorageChange};
use crate::stores::MemoryStorage;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Memory storage that can fail reads, return garbage, or hide change
/// notifications. Counts reads. Clones share everything.
#[derive(Debug, Clone, Default)]
pub struct FlakyStorage {
    backing: MemoryStorage,
    fail_reads: Arc<AtomicBool>,
    garbage: Arc<AtomicBool>,
    notifications: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
}

impl FlakyStorage {
    /// Healthy storage with change notifications.
    #[must_use]
    pub fn new() -> Self {
        let storage = Self::default();
        storage.notifications.store(true, Ordering::SeqCst);
        storage
    }

    /// Healthy storage without change notifications (polling only).
    #[must_use]
    pub fn without_notifications() -> Self {
        Self::default()
    }

    /// Make `get` and `list_keys` fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make `get` return unparseable content.
    pub fn return_garbage(&self, garbage: bool) {
        self.garbage.store(garbage, Ordering::SeqCst);
    }

    /// Number of `get` and `list_keys` calls.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn read(&self) -> Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SessionError::Storage("storage unavailable".to_string()));
        }
        Ok(())
    }
}

impl DurableStorage for FlakyStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.read()?;
        if self.garbage.load(Ordering::SeqCst) {
            return Ok(Some("{\"access_token\":".to_string()));
        }
        self.backing.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.backing.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.backing.remove(key)
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        self.read()?;
        self.backing.list_keys()
    }

    fn subscribe_changes(&self) -> Option<broadcast::Receiver<StorageChange>> {
        if self.notifications.load(Ordering::SeqCst) {
            self.backing.subscribe_changes()
        } else {
            None
        }
    }
}
