//! Trade records
//!
//! A trade is an immutable record of one match event. Trades are
//! append-only: the log is never mutated or deleted by the engine.

use crate::ids::{AssetId, OrderId, TradeId, UserId};
use crate::numeric::{Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An immutable record of one match event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: TradeId,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    /// Present for asset-market (secondary resale) trades.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<AssetId>,
    /// Execution price: the maker's limit price, not necessarily either
    /// the buy or sell limit of the later order.
    pub price: Price,
    /// Matched quantity, never more than either side's remaining.
    pub amount: Quantity,
    pub executed_at: i64,
    /// On-chain settlement hash, attached later by a collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

impl Trade {
    /// Notional value of the trade (price × amount).
    pub fn value(&self) -> Decimal {
        self.price.as_decimal() * self.amount.as_decimal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_trade(price: u64, amount: u64) -> Trade {
        Trade {
            id: TradeId::new(),
            buy_order_id: OrderId::new(),
            sell_order_id: OrderId::new(),
            buyer_id: UserId::new("buyer"),
            seller_id: UserId::new("seller"),
            asset_id: None,
            price: Price::from_u64(price),
            amount: Quantity::from_u64(amount),
            executed_at: 1_700_000_000_000,
            tx_hash: None,
        }
    }

    #[test]
    fn test_trade_value() {
        let trade = make_trade(105, 6);
        assert_eq!(trade.value(), Decimal::from(630));
    }

    #[test]
    fn test_trade_serialization_roundtrip() {
        let trade = make_trade(100, 2);
        let json = serde_json::to_string(&trade).unwrap();
        let back: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(trade, back);
    }

    #[test]
    fn test_trade_json_field_names() {
        let trade = make_trade(100, 2);
        let json = serde_json::to_value(&trade).unwrap();
        assert!(json.get("buyOrderId").is_some());
        assert!(json.get("executedAt").is_some());
        assert!(json.get("txHash").is_none());
    }
}
