//! File-backed store
//!
//! One JSON document per namespace under a data directory. Writes go to
//! a temporary file and are renamed into place, so a crash mid-write
//! leaves the previous document intact. A single guard mutex serializes
//! the load-modify-flush cycle per store instance.

use crate::{KvStore, Namespace, StorageError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Durable JSON-per-namespace key-value store.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    guard: Mutex<()>,
}

impl JsonFileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            guard: Mutex::new(()),
        })
    }

    fn namespace_path(&self, namespace: Namespace) -> PathBuf {
        self.dir.join(format!("{}.json", namespace.as_str()))
    }

    fn load(&self, namespace: Namespace) -> Result<BTreeMap<String, Value>, StorageError> {
        let path = self.namespace_path(namespace);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let bytes = fs::read(&path)?;
        if bytes.is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn flush(
        &self,
        namespace: Namespace,
        entries: &BTreeMap<String, Value>,
    ) -> Result<(), StorageError> {
        let path = self.namespace_path(namespace);
        let tmp = self.dir.join(format!("{}.json.tmp", namespace.as_str()));
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl KvStore for JsonFileStore {
    fn put(&self, namespace: Namespace, key: &str, value: Value) -> Result<(), StorageError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load(namespace)?;
        entries.insert(key.to_string(), value);
        self.flush(namespace, &entries)
    }

    fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Value>, StorageError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load(namespace)?.remove(key))
    }

    fn get_all(&self, namespace: Namespace) -> Result<Vec<(String, Value)>, StorageError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load(namespace)?.into_iter().collect())
    }

    fn delete(&self, namespace: Namespace, key: &str) -> Result<bool, StorageError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load(namespace)?;
        let existed = entries.remove(key).is_some();
        if existed {
            self.flush(namespace, &entries)?;
        }
        Ok(existed)
    }
}
