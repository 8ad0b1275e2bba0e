//! Durable storage backed by a JSON file.

use crate::error::{Result, SessionError};
use crate::providers::{DurableStorage, StorageChange};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

/// Storage persisted as one JSON object of string values.
///
/// The file is the only source of truth: every read loads the current
/// document, so writes made through another handle (or another process) are
/// visible immediately. Every write reloads, applies the change and rewrites
/// the file through a uniquely named temporary sibling and a rename, so
/// readers see either the old or the new document.
///
/// Other writers cannot be observed without reading, so there are no change
/// notifications and callers poll.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
    /// Serialises read-modify-write cycles of this handle and its clones.
    write_lock: Arc<Mutex<()>>,
}

impl JsonFileStorage {
    /// Open (or lazily create) storage at `path`.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or is not a JSON
    /// object of strings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = read_document(&path)?;
        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened file storage");

        Ok(Self {
            path,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reload the document, apply `mutate` and persist the result if it
    /// reports a change.
    fn update<F>(&self, mutate: F) -> Result<bool>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = read_document(&self.path)?;
        if !mutate(&mut entries) {
            return Ok(false);
        }
        self.persist(&entries)?;
        Ok(true)
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let document = serde_json::to_vec_pretty(entries)
            .map_err(|e| SessionError::Storage(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        // Unique per write so concurrent writers never share a temp file
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, document)?;
        if let Err(error) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(error.into());
        }
        Ok(())
    }
}

/// Current document at `path`; missing or empty files are empty storage.
fn read_document(path: &Path) -> Result<BTreeMap<String, String>> {
    match std::fs::read_to_string(path) {
        Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
        Ok(raw) => serde_json::from_str(&raw).map_err(|e| SessionError::MalformedRecord {
            key: path.display().to_string(),
            reason: e.to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(e.into()),
    }
}

impl DurableStorage for JsonFileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(read_document(&self.path)?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
            true
        })?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| entries.remove(key).is_some())?;
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        Ok(read_document(&self.path)?.into_keys().collect())
    }

    fn subscribe_changes(&self) -> Option<broadcast::Receiver<StorageChange>> {
        None
    }
}
