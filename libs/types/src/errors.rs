//! Error taxonomy for the trading core
//!
//! Domain failures only; storage-layer failures live in the storage
//! crate and are wrapped by each service's umbrella error.

use crate::ids::{AssetId, LockId, OrderId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Failures raised by order submission, cancellation and fills.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    /// Missing or malformed required fields, rejected before any
    /// persistence.
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("order not found: {order_id}")]
    NotFound { order_id: OrderId },

    /// Cancel attempted by someone other than the owner.
    #[error("unauthorized: only the order owner may do this")]
    Unauthorized,

    #[error("invalid order state: expected {expected}, found {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("order has expired")]
    Expired,

    /// A fill was attempted against a stale read of the order.
    #[error("version conflict on order {order_id}")]
    VersionConflict { order_id: OrderId },
}

/// Failures raised by the lock manager.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LockError {
    /// An active, unexpired lock already holds this asset.
    #[error("asset already locked: {asset_id}")]
    AlreadyLocked { asset_id: AssetId },

    #[error("lock not found: {lock_id}")]
    NotFound { lock_id: LockId },

    #[error("invalid lock state: expected {expected}, found {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("lock has expired")]
    Expired,
}

/// Failures raised by the share tracker.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShareError {
    /// Non-zero delta smaller than the minimum tradeable unit.
    #[error("share delta below precision unit {minimum}")]
    BelowPrecision { minimum: Decimal },

    #[error("insufficient shares: requested {requested}, available {available}")]
    InsufficientShares {
        requested: Decimal,
        available: Decimal,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_error_display() {
        let err = OrderError::InvalidOrder("amount must be positive".to_string());
        assert_eq!(err.to_string(), "invalid order: amount must be positive");
    }

    #[test]
    fn test_lock_error_display() {
        let err = LockError::AlreadyLocked {
            asset_id: AssetId::new("asset_1"),
        };
        assert!(err.to_string().contains("asset_1"));
    }

    #[test]
    fn test_share_error_display() {
        let err = ShareError::InsufficientShares {
            requested: Decimal::from(5),
            available: Decimal::from(2),
        };
        assert!(err.to_string().contains("requested 5"));
        assert!(err.to_string().contains("available 2"));
    }
}
