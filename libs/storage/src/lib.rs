//! Namespaced key-value substrate
//!
//! The single shared mutable resource of the trading core. Every
//! component treats the store as the source of truth and re-reads
//! before mutating; nothing holds an authoritative in-memory copy
//! across calls.
//!
//! Values are stored as JSON (`serde_json::Value`). Stored records may
//! carry type drift (numbers as strings, partial writes), so bulk reads
//! offer a lenient decode path that skips malformed entries instead of
//! failing the whole scan.

pub mod assets;
pub mod file;
pub mod memory;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub use assets::KvAssetCatalog;
pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// Storage namespaces. Keys are prefixed `"<namespace>:"` on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Spot-market resting orders.
    Orders,
    /// Asset-market resting orders.
    RwaOrders,
    /// Spot-market trade log (append-only).
    Trades,
    /// Asset-market trade log (append-only).
    RwaTrades,
    /// Asset locks.
    Locks,
    /// Fractional share holdings.
    Holdings,
    /// Asset catalog records.
    Assets,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Orders => "orders",
            Namespace::RwaOrders => "rwa_orders",
            Namespace::Trades => "trades",
            Namespace::RwaTrades => "rwa_trades",
            Namespace::Locks => "rwa_locks",
            Namespace::Holdings => "share_holdings",
            Namespace::Assets => "assets",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Substrate failures. These are fatal to the caller: there is no safe
/// default for "I don't know the current book".
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Namespaced key-value store.
///
/// Implementations must be safe to share across threads; callers
/// layer their own write serialization on top where records need
/// read-modify-write atomicity.
pub trait KvStore: Send + Sync {
    fn put(&self, namespace: Namespace, key: &str, value: Value) -> Result<(), StorageError>;

    fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Value>, StorageError>;

    /// All entries in a namespace, sorted by key for deterministic
    /// iteration.
    fn get_all(&self, namespace: Namespace) -> Result<Vec<(String, Value)>, StorageError>;

    /// Delete a key; returns whether it existed.
    fn delete(&self, namespace: Namespace, key: &str) -> Result<bool, StorageError>;
}

/// Typed convenience layer over [`KvStore`].
pub trait KvStoreExt: KvStore {
    fn put_json<T: Serialize>(
        &self,
        namespace: Namespace,
        key: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        self.put(namespace, key, serde_json::to_value(value)?)
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        namespace: Namespace,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        match self.get(namespace, key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Decode every entry in a namespace, skipping records that no
    /// longer decode. A skipped record is logged, never an error: one
    /// corrupt row must not take down a whole scan.
    fn get_all_decoded<T: DeserializeOwned>(
        &self,
        namespace: Namespace,
    ) -> Result<Vec<T>, StorageError> {
        let mut decoded = Vec::new();
        for (key, value) in self.get_all(namespace)? {
            match serde_json::from_value(value) {
                Ok(record) => decoded.push(record),
                Err(err) => {
                    tracing::warn!(namespace = %namespace, key = %key, %err, "skipping malformed record");
                }
            }
        }
        Ok(decoded)
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {}

pub(crate) fn make_key(namespace: Namespace, key: &str) -> String {
    format!("{}:{}", namespace.as_str(), key)
}
