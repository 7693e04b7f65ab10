//! Order lifecycle types
//!
//! A resting order is an intent to trade that sits in the book until it
//! is filled, cancelled or expires. Upstream payloads historically
//! carried the side under either `type` or `orderType`; that ambiguity
//! is normalized to [`OrderSide`] at the storage boundary and never
//! propagates into the engine.

use crate::ids::{AssetId, OrderId, UserId};
use crate::numeric::{Price, Quantity};
use serde::{Deserialize, Serialize};

/// Order side (buyer or seller).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Get the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

/// Order status.
///
/// Terminal orders are kept in the book namespace as soft-deleted
/// records until the archival sweep removes them; only the archival
/// sweep hard-deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Accepted and resting in the book.
    Pending,
    /// Completely matched (terminal).
    Filled,
    /// Cancelled by its owner (terminal).
    Cancelled,
    /// Expiry sweep found the order past its deadline (terminal).
    Expired,
}

impl OrderStatus {
    /// Check if the status is terminal (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

/// A resting order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub side: OrderSide,
    pub price: Price,
    /// Original quantity at submission.
    pub amount: Quantity,
    /// Cumulative filled quantity, always in `[0, amount]`.
    pub filled_amount: Quantity,
    pub status: OrderStatus,
    /// Asset being resold; required on sell orders in the asset market.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<AssetId>,
    /// Soft geographic preference; required on buy orders in the asset
    /// market, never a hard matching constraint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_city: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// Write version for optimistic concurrency on fills.
    #[serde(default)]
    pub version: u64,
}

impl Order {
    /// Unfilled quantity remaining on the order.
    pub fn remaining(&self) -> Quantity {
        self.amount.saturating_sub(self.filled_amount)
    }

    /// Check the quantity invariant: `filled_amount <= amount`.
    pub fn check_invariant(&self) -> bool {
        self.filled_amount.as_decimal() <= self.amount.as_decimal()
    }

    /// Whether the order's deadline has passed at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }

    /// Whether the order is eligible to rest in the active book:
    /// pending, unexpired and with quantity remaining.
    pub fn is_open(&self, now: i64) -> bool {
        self.status == OrderStatus::Pending && !self.is_expired(now) && !self.remaining().is_zero()
    }

    /// Apply a fill, flipping to `Filled` when nothing remains.
    ///
    /// # Panics
    /// Panics if the fill would exceed the remaining quantity.
    pub fn add_fill(&mut self, fill: Quantity, now: i64) {
        let new_filled = self.filled_amount + fill;
        assert!(
            new_filled.as_decimal() <= self.amount.as_decimal(),
            "fill would exceed order quantity"
        );

        self.filled_amount = new_filled;
        if self.remaining().is_zero() {
            self.status = OrderStatus::Filled;
        }
        self.updated_at = now;
        self.version += 1;

        debug_assert!(self.check_invariant());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_order(price: u64, amount: u64, created_at: i64) -> Order {
        Order {
            id: OrderId::new(),
            user_id: UserId::new("alice"),
            side: OrderSide::Buy,
            price: Price::from_u64(price),
            amount: Quantity::from_u64(amount),
            filled_amount: Quantity::zero(),
            status: OrderStatus::Pending,
            asset_id: None,
            preferred_city: None,
            created_at,
            updated_at: created_at,
            expires_at: None,
            version: 0,
        }
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.opposite(), OrderSide::Buy);
    }

    #[test]
    fn test_side_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&OrderSide::Buy).unwrap(), "\"buy\"");
        let side: OrderSide = serde_json::from_str("\"sell\"").unwrap();
        assert_eq!(side, OrderSide::Sell);
    }

    #[test]
    fn test_status_terminal() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
    }

    #[test]
    fn test_remaining_after_fill() {
        let mut order = make_order(100, 10, 1_000);
        order.add_fill(Quantity::from_u64(6), 2_000);

        assert_eq!(order.remaining(), Quantity::from_u64(4));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.version, 1);

        order.add_fill(Quantity::from_u64(4), 3_000);
        assert!(order.remaining().is_zero());
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[test]
    #[should_panic(expected = "fill would exceed order quantity")]
    fn test_overfill_panics() {
        let mut order = make_order(100, 10, 1_000);
        order.add_fill(Quantity::from_u64(11), 2_000);
    }

    #[test]
    fn test_is_open_respects_expiry_at_read_time() {
        let mut order = make_order(100, 10, 1_000);
        order.expires_at = Some(5_000);

        // Still marked pending in storage, but past the deadline.
        assert!(order.is_open(4_999));
        assert!(!order.is_open(5_000));
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_order_json_field_names() {
        let order = make_order(100, 10, 1_000);
        let json = serde_json::to_value(&order).unwrap();
        assert!(json.get("filledAmount").is_some());
        assert!(json.get("createdAt").is_some());
        // Absent optionals are omitted entirely.
        assert!(json.get("assetId").is_none());
    }
}
