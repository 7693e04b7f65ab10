//! Lock manager
//!
//! Grants at most one active, unexpired lock per asset. The stored
//! status is advisory; every read re-checks the deadline, so a lock
//! whose sweep has not run yet is still treated as expired. Refundable
//! lock fees are signaled through a hook owned by the payment
//! collaborator.

use crate::SettlementError;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, PoisonError};
use storage::{KvStore, KvStoreExt, Namespace};
use types::asset::{AssetCatalog, AssetError, AssetStatus};
use types::errors::LockError;
use types::ids::{AssetId, LockId, UserId};
use types::lock::{Lock, LockStatus, DEFAULT_LOCK_TTL_MS};
use types::now_millis;

/// Signal fired when a lock fee becomes refundable. The payment flow
/// lives outside this system; the hook only reports that a refund is
/// owed.
pub trait RefundHook: Send + Sync {
    fn refund(&self, lock: &Lock);
}

/// Manages the lock namespace and the asset lifecycle transitions
/// around it.
pub struct LockManager {
    store: Arc<dyn KvStore>,
    catalog: Arc<dyn AssetCatalog>,
    refund: Option<Arc<dyn RefundHook>>,
    /// Serializes lock creation and lifecycle transitions.
    write_guard: Mutex<()>,
}

impl LockManager {
    pub fn new(store: Arc<dyn KvStore>, catalog: Arc<dyn AssetCatalog>) -> Self {
        Self {
            store,
            catalog,
            refund: None,
            write_guard: Mutex::new(()),
        }
    }

    /// Attach a refund hook fired when a release refunds the fee.
    pub fn with_refund_hook(mut self, hook: Arc<dyn RefundHook>) -> Self {
        self.refund = Some(hook);
        self
    }

    /// Take an exclusive hold on an asset. Fails when another active,
    /// unexpired lock already holds it; the asset moves to `RESERVED`.
    pub fn create_lock(
        &self,
        asset_id: &AssetId,
        user_id: &UserId,
        lock_fee: Decimal,
        ttl_ms: Option<i64>,
    ) -> Result<Lock, SettlementError> {
        let _guard = self.lock_writes();

        // The asset must exist before anything is written.
        self.catalog
            .asset(asset_id)?
            .ok_or_else(|| AssetError::NotFound(asset_id.clone()))?;

        if self.find_active_lock(asset_id)?.is_some() {
            return Err(LockError::AlreadyLocked {
                asset_id: asset_id.clone(),
            }
            .into());
        }

        let now = now_millis();
        let lock = Lock {
            id: LockId::new(),
            asset_id: asset_id.clone(),
            user_id: user_id.clone(),
            lock_fee,
            locked_at: now,
            lock_expires_at: now + ttl_ms.unwrap_or(DEFAULT_LOCK_TTL_MS),
            status: LockStatus::Active,
            tx_hash: None,
            updated_at: now,
        };
        self.store
            .put_json(Namespace::Locks, &lock.id.to_string(), &lock)?;
        self.catalog.set_status(asset_id, AssetStatus::Reserved)?;

        tracing::info!(lock_id = %lock.id, asset_id = %asset_id, user_id = %user_id, "lock created");
        Ok(lock)
    }

    /// Complete the purchase behind an active lock. The asset becomes
    /// `LOCKED` (purchased); expired locks cannot be confirmed.
    pub fn confirm_lock(
        &self,
        lock_id: &LockId,
        tx_hash: Option<String>,
    ) -> Result<Lock, SettlementError> {
        let _guard = self.lock_writes();

        let mut lock = self.require_lock(lock_id)?;
        if lock.status != LockStatus::Active {
            return Err(invalid_state(&lock).into());
        }
        let now = now_millis();
        if lock.is_expired(now) {
            return Err(LockError::Expired.into());
        }

        lock.status = LockStatus::Confirmed;
        lock.tx_hash = tx_hash;
        lock.updated_at = now;
        self.store
            .put_json(Namespace::Locks, &lock_id.to_string(), &lock)?;
        self.catalog.set_status(&lock.asset_id, AssetStatus::Locked)?;

        tracing::info!(lock_id = %lock.id, asset_id = %lock.asset_id, "lock confirmed");
        Ok(lock)
    }

    /// Give up an active lock: the asset returns to the market. The fee
    /// is refunded only when the caller requests it; a plain user
    /// cancellation forfeits the fee, the expiry sweep refunds it.
    pub fn release_lock(
        &self,
        lock_id: &LockId,
        refund_fee: bool,
    ) -> Result<Lock, SettlementError> {
        let _guard = self.lock_writes();

        let lock = self.require_lock(lock_id)?;
        if lock.status != LockStatus::Active {
            return Err(invalid_state(&lock).into());
        }
        let lock = self.finish_release(lock, refund_fee)?;

        tracing::info!(lock_id = %lock.id, asset_id = %lock.asset_id, refund_fee, "lock released");
        Ok(lock)
    }

    /// Sweep: release active locks past their deadline with a fee
    /// refund and return their assets to the market. Works over a
    /// snapshot taken at the start of the sweep.
    pub fn process_expired_locks(&self) -> Result<usize, SettlementError> {
        let _guard = self.lock_writes();
        let now = now_millis();
        let locks: Vec<Lock> = self.store.get_all_decoded(Namespace::Locks)?;

        let mut expired = 0;
        for lock in locks {
            if lock.status != LockStatus::Active || !lock.is_expired(now) {
                continue;
            }
            self.finish_release(lock, true)?;
            expired += 1;
        }

        if expired > 0 {
            tracing::info!(count = expired, "expired locks swept");
        }
        Ok(expired)
    }

    /// The lock currently holding an asset, if any. Expiry is applied
    /// at read time: a stored `active` lock past its deadline is not
    /// returned even before the sweep runs.
    pub fn get_asset_lock(&self, asset_id: &AssetId) -> Result<Option<Lock>, SettlementError> {
        self.find_active_lock(asset_id)
    }

    pub fn lock(&self, lock_id: &LockId) -> Result<Option<Lock>, SettlementError> {
        Ok(self
            .store
            .get_json(Namespace::Locks, &lock_id.to_string())?)
    }

    /// All locks ever taken by one user, newest first.
    pub fn user_locks(&self, user_id: &UserId) -> Result<Vec<Lock>, SettlementError> {
        let mut locks: Vec<Lock> = self
            .store
            .get_all_decoded::<Lock>(Namespace::Locks)?
            .into_iter()
            .filter(|lock| &lock.user_id == user_id)
            .collect();
        locks.sort_by(|a, b| b.locked_at.cmp(&a.locked_at));
        Ok(locks)
    }

    fn find_active_lock(&self, asset_id: &AssetId) -> Result<Option<Lock>, SettlementError> {
        let now = now_millis();
        Ok(self
            .store
            .get_all_decoded::<Lock>(Namespace::Locks)?
            .into_iter()
            .find(|lock| &lock.asset_id == asset_id && lock.is_active(now)))
    }

    fn require_lock(&self, lock_id: &LockId) -> Result<Lock, SettlementError> {
        Ok(self.lock(lock_id)?.ok_or(LockError::NotFound {
            lock_id: *lock_id,
        })?)
    }

    /// Return a reserved asset to the market. Assets already past the
    /// reservation (purchased, relisted) are left alone.
    fn reopen_asset(&self, asset_id: &AssetId) -> Result<(), SettlementError> {
        match self.catalog.asset(asset_id)? {
            Some(asset) if asset.status == AssetStatus::Reserved => {
                self.catalog.set_status(asset_id, AssetStatus::Available)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Shared release transition. Caller holds the write guard and has
    /// already checked the lock is active.
    fn finish_release(&self, mut lock: Lock, refund_fee: bool) -> Result<Lock, SettlementError> {
        lock.status = LockStatus::Released;
        lock.updated_at = now_millis();
        self.store
            .put_json(Namespace::Locks, &lock.id.to_string(), &lock)?;
        self.reopen_asset(&lock.asset_id)?;
        if refund_fee {
            self.fire_refund(&lock);
        }
        Ok(lock)
    }

    fn fire_refund(&self, lock: &Lock) {
        if let Some(hook) = &self.refund {
            hook.refund(lock);
        }
    }

    fn lock_writes(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn invalid_state(lock: &Lock) -> LockError {
    LockError::InvalidState {
        expected: "active".to_string(),
        actual: format!("{:?}", lock.status).to_lowercase(),
    }
}
