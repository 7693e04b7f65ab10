//! In-memory store
//!
//! `BTreeMap` keeps `get_all` iteration deterministic, which keeps
//! matching passes deterministic for a given store state. Used by tests
//! and by single-process deployments that accept losing state on
//! restart.

use crate::{make_key, KvStore, Namespace, StorageError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Thread-safe in-memory key-value store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries across all namespaces.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStore {
    fn put(&self, namespace: Namespace, key: &str, value: Value) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(make_key(namespace, key), value);
        Ok(())
    }

    fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Value>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(&make_key(namespace, key)).cloned())
    }

    fn get_all(&self, namespace: Namespace) -> Result<Vec<(String, Value)>, StorageError> {
        let prefix = format!("{}:", namespace.as_str());
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, value)| (key[prefix.len()..].to_string(), value.clone()))
            .collect())
    }

    fn delete(&self, namespace: Namespace, key: &str) -> Result<bool, StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.remove(&make_key(namespace, key)).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_get_roundtrip() {
        let store = MemoryStore::new();
        store
            .put(Namespace::Orders, "o1", json!({"price": "100"}))
            .unwrap();

        let value = store.get(Namespace::Orders, "o1").unwrap();
        assert_eq!(value, Some(json!({"price": "100"})));
        assert_eq!(store.get(Namespace::Orders, "missing").unwrap(), None);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let store = MemoryStore::new();
        store.put(Namespace::Orders, "k", json!(1)).unwrap();
        store.put(Namespace::Trades, "k", json!(2)).unwrap();

        assert_eq!(store.get(Namespace::Orders, "k").unwrap(), Some(json!(1)));
        assert_eq!(store.get(Namespace::Trades, "k").unwrap(), Some(json!(2)));
        assert_eq!(store.get_all(Namespace::Orders).unwrap().len(), 1);
    }

    #[test]
    fn test_get_all_sorted_and_prefix_stripped() {
        let store = MemoryStore::new();
        store.put(Namespace::Orders, "b", json!(2)).unwrap();
        store.put(Namespace::Orders, "a", json!(1)).unwrap();

        let all = store.get_all(Namespace::Orders).unwrap();
        assert_eq!(all[0].0, "a");
        assert_eq!(all[1].0, "b");
    }

    #[test]
    fn test_delete_reports_existence() {
        let store = MemoryStore::new();
        store.put(Namespace::Locks, "l1", json!({})).unwrap();

        assert!(store.delete(Namespace::Locks, "l1").unwrap());
        assert!(!store.delete(Namespace::Locks, "l1").unwrap());
    }
}
