//! Asset catalog oracle
//!
//! The engine does not own asset records; an external catalog does. The
//! [`AssetCatalog`] trait is the narrow surface the lock manager and the
//! matching engine need: read one asset, move its lifecycle status, and
//! record an ownership transfer after a full secondary-market fill.

use crate::ids::{AssetId, UserId};
use crate::numeric::Price;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Asset lifecycle status as kept by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetStatus {
    /// Listed and open to a primary-market reservation.
    Available,
    /// Exclusively held by an active lock during a purchase flow.
    Reserved,
    /// Purchased through the primary market. Only `LOCKED` assets are
    /// eligible for secondary-market resale matching.
    Locked,
}

fn default_total_shares() -> Decimal {
    // Assets listed before fractionalization default to 10000 shares.
    Decimal::from(10_000)
}

/// The slice of a catalog asset record this system reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    pub id: AssetId,
    pub status: AssetStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Total valuation of the asset in quote units.
    #[serde(default)]
    pub total_price: Decimal,
    /// Total fractional shares the asset is divided into.
    #[serde(default = "default_total_shares")]
    pub total_shares: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchased_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_owner: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchased_at: Option<i64>,
}

impl AssetRecord {
    /// Valuation of a single share, or `None` when the share count is
    /// unusable (zero or negative).
    pub fn price_per_share(&self) -> Option<Decimal> {
        if self.total_shares <= Decimal::ZERO {
            return None;
        }
        Some(self.total_price / self.total_shares)
    }
}

/// Ownership change applied after a full secondary-market fill.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnershipTransfer {
    pub purchased_by: UserId,
    pub previous_owner: Option<UserId>,
    pub purchase_price: Price,
    pub purchased_at: i64,
}

/// Failures surfaced by a catalog backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(AssetId),

    #[error("asset backend error: {0}")]
    Backend(String),
}

/// Read/write surface of the external asset catalog.
pub trait AssetCatalog: Send + Sync {
    /// Look up one asset, `None` if the catalog has no such record.
    fn asset(&self, id: &AssetId) -> Result<Option<AssetRecord>, AssetError>;

    /// Move an asset's lifecycle status.
    fn set_status(&self, id: &AssetId, status: AssetStatus) -> Result<(), AssetError>;

    /// Record an ownership transfer; the status stays `LOCKED`.
    fn transfer_ownership(
        &self,
        id: &AssetId,
        transfer: OwnershipTransfer,
    ) -> Result<(), AssetError>;
}

/// Soft geographic match: exact, or substring in either direction.
///
/// "Taipei" matches "Taipei City" and vice versa. Used as a filter that
/// skips candidate pairs, never as a hard failure.
pub fn city_matches(preferred: &str, asset_city: &str) -> bool {
    preferred == asset_city || asset_city.contains(preferred) || preferred.contains(asset_city)
}
