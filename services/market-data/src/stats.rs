//! Headline market statistics
//!
//! Reads the trade namespace as raw JSON rather than typed records:
//! early trade rows were written with numbers as strings and the
//! occasional missing field, and a statistics endpoint must not fail
//! over one such row. Unusable fields degrade to zero, unusable rows
//! are skipped.

use crate::DAY_MS;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use storage::{KvStore, Namespace, StorageError};
use types::now_millis;
use types::numeric::Price;

/// One trade row after lenient decoding.
#[derive(Debug, Clone, PartialEq)]
struct LenientTrade {
    price: Decimal,
    amount: Decimal,
    executed_at: i64,
}

/// Accept a JSON number or a numeric string.
fn coerce_decimal(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

fn coerce_millis(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Decode one stored row. A row without a usable timestamp cannot be
/// placed in any window and is dropped; unusable numerics become zero.
fn decode_trade(value: &Value) -> Option<LenientTrade> {
    let executed_at = coerce_millis(value.get("executedAt"))?;
    Some(LenientTrade {
        price: coerce_decimal(value.get("price")).unwrap_or(Decimal::ZERO),
        amount: coerce_decimal(value.get("amount")).unwrap_or(Decimal::ZERO),
        executed_at,
    })
}

/// Headline numbers for one market.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_price: Option<Decimal>,
    /// Percent change against the price 24h ago; zero without history.
    pub price_change_24h: Decimal,
    /// Sum of price × amount over the trailing 24h.
    pub volume_24h: Decimal,
    pub trade_count_24h: usize,
}

/// Statistics reader over one market's trade namespace.
pub struct MarketStats {
    store: Arc<dyn KvStore>,
    namespace: Namespace,
}

impl MarketStats {
    pub fn new(store: Arc<dyn KvStore>, namespace: Namespace) -> Self {
        Self { store, namespace }
    }

    /// Decodable trades, oldest first.
    fn trades(&self) -> Result<Vec<LenientTrade>, StorageError> {
        let mut trades = Vec::new();
        for (key, value) in self.store.get_all(self.namespace)? {
            match decode_trade(&value) {
                Some(trade) => trades.push(trade),
                None => {
                    tracing::warn!(namespace = %self.namespace, key = %key, "skipping undated trade row");
                }
            }
        }
        trades.sort_by_key(|trade| trade.executed_at);
        Ok(trades)
    }

    /// Price of the latest trade with a usable positive price.
    pub fn current_price(&self) -> Result<Option<Price>, StorageError> {
        Ok(self
            .trades()?
            .into_iter()
            .rev()
            .find_map(|trade| Price::try_new(trade.price).ok()))
    }

    /// Percent change between the current price and the latest price
    /// at or before 24h ago. Zero when either end is missing.
    pub fn price_change_24h(&self) -> Result<Decimal, StorageError> {
        let trades = self.trades()?;
        let cutoff = now_millis() - DAY_MS;

        let current = trades
            .iter()
            .rev()
            .find(|trade| trade.price > Decimal::ZERO)
            .map(|trade| trade.price);
        let reference = trades
            .iter()
            .rev()
            .find(|trade| trade.executed_at <= cutoff && trade.price > Decimal::ZERO)
            .map(|trade| trade.price);

        match (current, reference) {
            (Some(current), Some(reference)) => {
                Ok((current - reference) / reference * Decimal::from(100))
            }
            _ => Ok(Decimal::ZERO),
        }
    }

    /// Notional volume (price × amount) over the trailing 24h.
    pub fn volume_24h(&self) -> Result<Decimal, StorageError> {
        let cutoff = now_millis() - DAY_MS;
        Ok(self
            .trades()?
            .iter()
            .filter(|trade| trade.executed_at > cutoff)
            .map(|trade| trade.price * trade.amount)
            .sum())
    }

    /// Volume-weighted average price over a trailing window. Only
    /// trades with a positive price and amount count; `None` when none
    /// qualify.
    pub fn vwap(&self, window_ms: i64) -> Result<Option<Decimal>, StorageError> {
        let cutoff = now_millis() - window_ms;
        let mut notional = Decimal::ZERO;
        let mut quantity = Decimal::ZERO;
        for trade in self.trades()? {
            if trade.executed_at <= cutoff
                || trade.price <= Decimal::ZERO
                || trade.amount <= Decimal::ZERO
            {
                continue;
            }
            notional += trade.price * trade.amount;
            quantity += trade.amount;
        }

        if quantity.is_zero() {
            Ok(None)
        } else {
            Ok(Some(notional / quantity))
        }
    }

    /// All headline numbers in one read.
    pub fn summary(&self) -> Result<MarketSummary, StorageError> {
        let cutoff = now_millis() - DAY_MS;
        let trades = self.trades()?;

        let current_price = trades
            .iter()
            .rev()
            .find(|trade| trade.price > Decimal::ZERO)
            .map(|trade| trade.price);
        let reference = trades
            .iter()
            .rev()
            .find(|trade| trade.executed_at <= cutoff && trade.price > Decimal::ZERO)
            .map(|trade| trade.price);
        let price_change_24h = match (current_price, reference) {
            (Some(current), Some(reference)) => {
                (current - reference) / reference * Decimal::from(100)
            }
            _ => Decimal::ZERO,
        };

        let in_window: Vec<_> = trades
            .iter()
            .filter(|trade| trade.executed_at > cutoff)
            .collect();
        let volume_24h = in_window
            .iter()
            .map(|trade| trade.price * trade.amount)
            .sum();

        Ok(MarketSummary {
            current_price,
            price_change_24h,
            volume_24h,
            trade_count_24h: in_window.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use storage::MemoryStore;

    fn stats_with(rows: &[(&str, Value)]) -> MarketStats {
        let store = Arc::new(MemoryStore::new());
        for (key, value) in rows {
            store.put(Namespace::Trades, key, value.clone()).unwrap();
        }
        MarketStats::new(store, Namespace::Trades)
    }

    fn row(price: Value, amount: Value, executed_at: i64) -> Value {
        json!({"price": price, "amount": amount, "executedAt": executed_at})
    }

    #[test]
    fn test_current_price_takes_latest() {
        let now = now_millis();
        let stats = stats_with(&[
            ("t1", row(json!(100), json!(1), now - 2_000)),
            ("t2", row(json!(105), json!(1), now - 1_000)),
        ]);
        assert_eq!(
            stats.current_price().unwrap(),
            Some(Price::from_u64(105))
        );
    }

    #[test]
    fn test_current_price_skips_unusable_prices() {
        let now = now_millis();
        let stats = stats_with(&[
            ("t1", row(json!(100), json!(1), now - 2_000)),
            ("t2", row(json!("garbage"), json!(1), now - 1_000)),
        ]);
        // The malformed latest price degrades to zero, so the previous
        // trade carries the price.
        assert_eq!(
            stats.current_price().unwrap(),
            Some(Price::from_u64(100))
        );
    }

    #[test]
    fn test_numbers_as_strings_are_accepted() {
        let now = now_millis();
        let stats = stats_with(&[("t1", row(json!("105.5"), json!("2"), now - 1_000))]);
        assert_eq!(
            stats.volume_24h().unwrap(),
            Decimal::from_str("211.0").unwrap()
        );
    }

    #[test]
    fn test_volume_window_excludes_old_trades() {
        let now = now_millis();
        let stats = stats_with(&[
            ("t1", row(json!(100), json!(2), now - 1_000)),
            ("t2", row(json!(100), json!(5), now - DAY_MS - 1_000)),
        ]);
        assert_eq!(stats.volume_24h().unwrap(), Decimal::from(200));
    }

    #[test]
    fn test_price_change_needs_both_ends() {
        let now = now_millis();

        // No trade older than 24h: change defaults to zero.
        let stats = stats_with(&[("t1", row(json!(105), json!(1), now - 1_000))]);
        assert_eq!(stats.price_change_24h().unwrap(), Decimal::ZERO);

        let stats = stats_with(&[
            ("t1", row(json!(100), json!(1), now - DAY_MS - 1_000)),
            ("t2", row(json!(105), json!(1), now - 1_000)),
        ]);
        assert_eq!(stats.price_change_24h().unwrap(), Decimal::from(5));
    }

    #[test]
    fn test_vwap_weights_by_amount() {
        let now = now_millis();
        let stats = stats_with(&[
            ("t1", row(json!(100), json!(3), now - 1_000)),
            ("t2", row(json!(200), json!(1), now - 2_000)),
        ]);
        // (100*3 + 200*1) / 4 = 125
        assert_eq!(
            stats.vwap(DAY_MS).unwrap(),
            Some(Decimal::from(125))
        );
    }

    #[test]
    fn test_vwap_ignores_zero_rows_and_handles_empty() {
        let now = now_millis();
        let stats = stats_with(&[
            ("t1", row(json!(0), json!(3), now - 1_000)),
            ("t2", row(json!(100), json!(0), now - 1_000)),
        ]);
        assert_eq!(stats.vwap(DAY_MS).unwrap(), None);
    }

    #[test]
    fn test_undated_rows_are_skipped() {
        let now = now_millis();
        let stats = stats_with(&[
            ("t1", json!({"price": 100, "amount": 1})),
            ("t2", row(json!(105), json!(1), now - 1_000)),
            ("t3", json!("not even an object")),
        ]);
        let summary = stats.summary().unwrap();
        assert_eq!(summary.trade_count_24h, 1);
        assert_eq!(summary.current_price, Some(Decimal::from(105)));
    }

    #[test]
    fn test_summary_on_empty_market() {
        let summary = stats_with(&[]).summary().unwrap();
        assert_eq!(summary.current_price, None);
        assert_eq!(summary.price_change_24h, Decimal::ZERO);
        assert_eq!(summary.volume_24h, Decimal::ZERO);
        assert_eq!(summary.trade_count_24h, 0);
    }
}
