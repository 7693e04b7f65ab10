//! Share tracker
//!
//! Fractional ownership records keyed by `(user, asset)`. Every delta
//! is rounded to the precision unit before it touches storage, and a
//! balance that settles to zero or below is deleted rather than kept as
//! a residue.

use crate::SettlementError;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use storage::{KvStore, KvStoreExt, Namespace};
use types::asset::AssetCatalog;
use types::errors::ShareError;
use types::holding::{round_shares, share_precision, ShareHolding};
use types::ids::{AssetId, UserId};
use types::now_millis;

/// A holding joined with its current valuation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingValue {
    #[serde(flatten)]
    pub holding: ShareHolding,
    /// Shares × price per share; zero when the asset is unknown.
    pub value: Decimal,
}

/// Keeps fractional share balances per `(user, asset)` pair.
pub struct ShareTracker {
    store: Arc<dyn KvStore>,
    catalog: Arc<dyn AssetCatalog>,
    /// Serializes balance mutations; a transfer debits and credits
    /// under one guard.
    write_guard: Mutex<()>,
}

impl ShareTracker {
    pub fn new(store: Arc<dyn KvStore>, catalog: Arc<dyn AssetCatalog>) -> Self {
        Self {
            store,
            catalog,
            write_guard: Mutex::new(()),
        }
    }

    /// Apply a signed share delta to a user's balance. Returns the
    /// updated holding, or `None` when the balance settled to zero and
    /// the record was deleted.
    pub fn record_share_holding(
        &self,
        user_id: &UserId,
        asset_id: &AssetId,
        delta: Decimal,
    ) -> Result<Option<ShareHolding>, SettlementError> {
        let delta = checked_round(delta)?;
        let _guard = self.lock_writes();
        self.apply_delta(user_id, asset_id, delta)
    }

    /// Move shares between two users atomically with respect to other
    /// balance mutations.
    pub fn transfer_shares(
        &self,
        from: &UserId,
        to: &UserId,
        asset_id: &AssetId,
        shares: Decimal,
    ) -> Result<(), SettlementError> {
        let shares = checked_round(shares)?;
        let _guard = self.lock_writes();

        let available = self.read_shares(from, asset_id)?;
        if shares > available {
            return Err(ShareError::InsufficientShares {
                requested: shares,
                available,
            }
            .into());
        }

        self.apply_delta(from, asset_id, -shares)?;
        self.apply_delta(to, asset_id, shares)?;

        tracing::info!(%from, %to, asset_id = %asset_id, %shares, "shares transferred");
        Ok(())
    }

    /// A user's balance in one asset; zero when no record exists.
    pub fn shares_of(&self, user_id: &UserId, asset_id: &AssetId) -> Result<Decimal, SettlementError> {
        let _guard = self.lock_writes();
        self.read_shares(user_id, asset_id)
    }

    /// Every holding of one user, joined with its valuation. A holding
    /// whose asset has vanished from the catalog values at zero rather
    /// than failing the listing.
    pub fn user_holdings(&self, user_id: &UserId) -> Result<Vec<HoldingValue>, SettlementError> {
        let holdings: Vec<ShareHolding> = self
            .store
            .get_all_decoded::<ShareHolding>(Namespace::Holdings)?
            .into_iter()
            .filter(|holding| &holding.user_id == user_id)
            .collect();

        let mut valued = Vec::with_capacity(holdings.len());
        for holding in holdings {
            let value = match self.catalog.asset(&holding.asset_id) {
                Ok(Some(asset)) => asset
                    .price_per_share()
                    .map(|pps| pps * holding.shares)
                    .unwrap_or(Decimal::ZERO),
                Ok(None) => Decimal::ZERO,
                Err(err) => {
                    tracing::warn!(asset_id = %holding.asset_id, %err, "valuation lookup failed");
                    Decimal::ZERO
                }
            };
            valued.push(HoldingValue { holding, value });
        }
        Ok(valued)
    }

    /// Everyone holding one asset, largest balance first.
    pub fn asset_holders(&self, asset_id: &AssetId) -> Result<Vec<ShareHolding>, SettlementError> {
        let mut holders: Vec<ShareHolding> = self
            .store
            .get_all_decoded::<ShareHolding>(Namespace::Holdings)?
            .into_iter()
            .filter(|holding| &holding.asset_id == asset_id)
            .collect();
        holders.sort_by(|a, b| b.shares.cmp(&a.shares));
        Ok(holders)
    }

    /// Total valuation of a user's portfolio.
    pub fn total_value(&self, user_id: &UserId) -> Result<Decimal, SettlementError> {
        Ok(self
            .user_holdings(user_id)?
            .iter()
            .map(|h| h.value)
            .sum())
    }

    fn read_shares(&self, user_id: &UserId, asset_id: &AssetId) -> Result<Decimal, SettlementError> {
        let key = ShareHolding::key(user_id, asset_id);
        Ok(self
            .store
            .get_json::<ShareHolding>(Namespace::Holdings, &key)?
            .map(|holding| holding.shares)
            .unwrap_or(Decimal::ZERO))
    }

    /// Callers hold the write guard.
    fn apply_delta(
        &self,
        user_id: &UserId,
        asset_id: &AssetId,
        delta: Decimal,
    ) -> Result<Option<ShareHolding>, SettlementError> {
        let key = ShareHolding::key(user_id, asset_id);
        let now = now_millis();
        let existing = self
            .store
            .get_json::<ShareHolding>(Namespace::Holdings, &key)?;

        let new_total = round_shares(existing.as_ref().map_or(Decimal::ZERO, |h| h.shares) + delta);
        if new_total <= Decimal::ZERO {
            self.store.delete(Namespace::Holdings, &key)?;
            return Ok(None);
        }

        let holding = ShareHolding {
            user_id: user_id.clone(),
            asset_id: asset_id.clone(),
            shares: new_total,
            created_at: existing.map_or(now, |h| h.created_at),
            updated_at: now,
        };
        self.store.put_json(Namespace::Holdings, &key, &holding)?;
        Ok(Some(holding))
    }

    fn lock_writes(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Round a delta to the precision unit, rejecting non-zero deltas that
/// vanish entirely in rounding.
fn checked_round(delta: Decimal) -> Result<Decimal, SettlementError> {
    let rounded = round_shares(delta);
    if rounded.is_zero() && !delta.is_zero() {
        return Err(ShareError::BelowPrecision {
            minimum: share_precision(),
        }
        .into());
    }
    Ok(rounded)
}
