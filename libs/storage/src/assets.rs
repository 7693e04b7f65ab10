//! KV-backed asset catalog
//!
//! Implements the [`AssetCatalog`] oracle over the shared store. The
//! catalog itself is owned by an external listing flow; the trading
//! core only reads records and moves their lifecycle fields.

use crate::{KvStore, KvStoreExt, Namespace, StorageError};
use std::sync::Arc;
use types::asset::{AssetCatalog, AssetError, AssetRecord, AssetStatus, OwnershipTransfer};
use types::ids::AssetId;

/// Asset catalog stored in the [`Namespace::Assets`] namespace.
pub struct KvAssetCatalog {
    store: Arc<dyn KvStore>,
}

impl KvAssetCatalog {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Insert or replace a catalog record. Used by the listing flow and
    /// by tests seeding a catalog.
    pub fn insert(&self, record: &AssetRecord) -> Result<(), StorageError> {
        self.store
            .put_json(Namespace::Assets, record.id.as_str(), record)
    }
}

fn backend(err: StorageError) -> AssetError {
    AssetError::Backend(err.to_string())
}

impl AssetCatalog for KvAssetCatalog {
    fn asset(&self, id: &AssetId) -> Result<Option<AssetRecord>, AssetError> {
        self.store
            .get_json(Namespace::Assets, id.as_str())
            .map_err(backend)
    }

    fn set_status(&self, id: &AssetId, status: AssetStatus) -> Result<(), AssetError> {
        let mut record = self
            .asset(id)?
            .ok_or_else(|| AssetError::NotFound(id.clone()))?;
        record.status = status;
        self.store
            .put_json(Namespace::Assets, id.as_str(), &record)
            .map_err(backend)
    }

    fn transfer_ownership(
        &self,
        id: &AssetId,
        transfer: OwnershipTransfer,
    ) -> Result<(), AssetError> {
        let mut record = self
            .asset(id)?
            .ok_or_else(|| AssetError::NotFound(id.clone()))?;

        record.previous_owner = transfer.previous_owner;
        record.purchased_by = Some(transfer.purchased_by);
        record.purchase_price = Some(transfer.purchase_price.as_decimal());
        record.purchased_at = Some(transfer.purchased_at);
        // Ownership changes hands but the asset stays LOCKED: it remains
        // purchased, just by a new holder.
        record.status = AssetStatus::Locked;

        self.store
            .put_json(Namespace::Assets, id.as_str(), &record)
            .map_err(backend)
    }
}
