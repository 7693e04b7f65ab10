//! Fractional share holdings
//!
//! One record per `(user, asset)` pair, at a fixed minimum granularity
//! of 0.0001 shares. Every write rounds to the nearest precision unit;
//! a holding that settles to zero or below is deleted, never stored as
//! a near-zero decimal.

use crate::ids::{AssetId, UserId};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Number of decimal places in the share precision unit (0.0001).
pub const SHARE_PRECISION_DP: u32 = 4;

/// The smallest tradeable fraction of an asset's ownership.
pub fn share_precision() -> Decimal {
    Decimal::new(1, SHARE_PRECISION_DP)
}

/// Round a share figure to the nearest precision unit, half away from
/// zero.
pub fn round_shares(shares: Decimal) -> Decimal {
    shares.round_dp_with_strategy(SHARE_PRECISION_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Fractional ownership record for one `(user, asset)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareHolding {
    pub user_id: UserId,
    pub asset_id: AssetId,
    /// Always positive and a multiple of the precision unit.
    pub shares: Decimal,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ShareHolding {
    /// Storage key for a `(user, asset)` pair.
    pub fn key(user_id: &UserId, asset_id: &AssetId) -> String {
        format!("{}_{}", user_id, asset_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_precision_unit() {
        assert_eq!(share_precision(), dec("0.0001"));
    }

    #[test]
    fn test_round_to_unit() {
        assert_eq!(round_shares(dec("0.00014")), dec("0.0001"));
        assert_eq!(round_shares(dec("0.00015")), dec("0.0002"));
        assert_eq!(round_shares(dec("1.23456")), dec("1.2346"));
        assert_eq!(round_shares(dec("-0.00015")), dec("-0.0002"));
    }

    #[test]
    fn test_holding_key() {
        let key = ShareHolding::key(&UserId::new("alice"), &AssetId::new("asset_1"));
        assert_eq!(key, "alice_asset_1");
    }
}
