//! Trade log
//!
//! Append-only record of executed trades per market. Trade ids are
//! time-sortable, so the store's key order is already chronological;
//! queries still sort by `executed_at` in case records were imported.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use storage::{KvStore, KvStoreExt, Namespace, StorageError};
use types::ids::{AssetId, UserId};
use types::now_millis;
use types::trade::Trade;

/// Query filters for trade history.
#[derive(Debug, Clone, Default)]
pub struct TradeFilter {
    /// Trades where the user was buyer or seller.
    pub user_id: Option<UserId>,
    pub asset_id: Option<AssetId>,
    pub limit: Option<usize>,
}

/// Aggregates over a trailing window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeStats {
    pub trade_count: usize,
    /// Sum of price × amount.
    pub total_volume: Decimal,
    /// Volume-weighted average price; zero when no trades.
    pub average_price: Decimal,
}

/// Append-only trade log over one namespace.
pub struct TradeLog {
    store: Arc<dyn KvStore>,
    namespace: Namespace,
}

impl TradeLog {
    pub fn new(store: Arc<dyn KvStore>, namespace: Namespace) -> Self {
        Self { store, namespace }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn append(&self, trade: &Trade) -> Result<(), StorageError> {
        self.store
            .put_json(self.namespace, &trade.id.to_string(), trade)
    }

    /// Every decodable trade, oldest first.
    pub fn all(&self) -> Result<Vec<Trade>, StorageError> {
        let mut trades: Vec<Trade> = self.store.get_all_decoded(self.namespace)?;
        trades.sort_by(|a, b| a.executed_at.cmp(&b.executed_at).then(a.id.cmp(&b.id)));
        Ok(trades)
    }

    /// The latest `limit` trades, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<Trade>, StorageError> {
        let mut trades = self.all()?;
        trades.reverse();
        trades.truncate(limit);
        Ok(trades)
    }

    /// Filtered history, newest first.
    pub fn history(&self, filter: &TradeFilter) -> Result<Vec<Trade>, StorageError> {
        let mut trades: Vec<Trade> = self
            .all()?
            .into_iter()
            .filter(|trade| {
                filter
                    .user_id
                    .as_ref()
                    .map_or(true, |user| &trade.buyer_id == user || &trade.seller_id == user)
            })
            .filter(|trade| {
                filter
                    .asset_id
                    .as_ref()
                    .map_or(true, |asset| trade.asset_id.as_ref() == Some(asset))
            })
            .collect();
        trades.reverse();
        if let Some(limit) = filter.limit {
            trades.truncate(limit);
        }
        Ok(trades)
    }

    /// Count, volume and weighted average price over the trailing
    /// `window_ms` ending now.
    pub fn stats(&self, window_ms: i64) -> Result<TradeStats, StorageError> {
        let cutoff = now_millis() - window_ms;
        let mut count = 0usize;
        let mut volume = Decimal::ZERO;
        let mut quantity = Decimal::ZERO;
        for trade in self.all()? {
            if trade.executed_at < cutoff {
                continue;
            }
            count += 1;
            volume += trade.value();
            quantity += trade.amount.as_decimal();
        }

        let average_price = if quantity.is_zero() {
            Decimal::ZERO
        } else {
            volume / quantity
        };
        Ok(TradeStats {
            trade_count: count,
            total_volume: volume,
            average_price,
        })
    }
}
