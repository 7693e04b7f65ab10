//! Matching passes
//!
//! A pass walks the open book best-first and executes every crossing
//! pair until no cross remains or the pass cap is hit. Passes are
//! single-flight per engine: a trigger arriving while one runs waits
//! its turn rather than interleaving.
//!
//! Execution price follows the maker: the earlier of the two crossing
//! orders sets the price, and on an exact timestamp tie the sell side
//! does.

use crate::book::OrderBookManager;
use crate::events::{EventBus, MarketEvent};
use crate::trades::TradeLog;
use crate::BookError;
use std::sync::{Arc, Mutex, PoisonError};
use types::asset::{AssetCatalog, AssetRecord, AssetStatus, OwnershipTransfer};
use types::ids::TradeId;
use types::now_millis;
use types::order::Order;
use types::trade::Trade;

/// Options for one matching pass.
#[derive(Debug, Clone, Default)]
pub struct MatchOptions {
    /// Stop after this many trades; `None` runs until no cross remains.
    pub max_matches: Option<usize>,
    /// Narrow the buy side to one city (soft filter).
    pub city: Option<String>,
}

impl MatchOptions {
    pub fn with_max_matches(max: usize) -> Self {
        Self {
            max_matches: Some(max),
            city: None,
        }
    }
}

/// Price-time priority matcher over one market's book.
pub struct MatchingEngine {
    book: Arc<OrderBookManager>,
    trades: Arc<TradeLog>,
    events: EventBus,
    /// Asset-market settlement oracle; `None` for the spot market.
    assets: Option<Arc<dyn AssetCatalog>>,
    /// Single-flight guard: one pass at a time per engine.
    pass_guard: Mutex<()>,
}

impl MatchingEngine {
    /// Engine for the spot market (no asset preconditions).
    pub fn new(book: Arc<OrderBookManager>, trades: Arc<TradeLog>, events: EventBus) -> Self {
        Self {
            book,
            trades,
            events,
            assets: None,
            pass_guard: Mutex::new(()),
        }
    }

    /// Engine for the asset market, with per-pair settlement checks
    /// against the catalog.
    pub fn with_asset_catalog(
        book: Arc<OrderBookManager>,
        trades: Arc<TradeLog>,
        events: EventBus,
        assets: Arc<dyn AssetCatalog>,
    ) -> Self {
        Self {
            book,
            trades,
            events,
            assets: Some(assets),
            pass_guard: Mutex::new(()),
        }
    }

    pub fn book(&self) -> &OrderBookManager {
        &self.book
    }

    /// Run one matching pass and return the trades it produced.
    ///
    /// Per-pair failures (a pair vanishing under us, a precondition no
    /// longer holding, a version conflict) skip that pair and the pass
    /// continues; only storage failures abort the pass.
    pub fn match_orders(&self, options: &MatchOptions) -> Result<Vec<Trade>, BookError> {
        let _pass = self
            .pass_guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let snapshot = self.book.book(usize::MAX, options.city.as_deref())?;
        let mut buys = snapshot.buys;
        let mut sells = snapshot.sells;
        let cap = options.max_matches.unwrap_or(usize::MAX);
        let mut executed = Vec::new();

        'buys: for buy_idx in 0..buys.len() {
            for sell_idx in 0..sells.len() {
                if executed.len() >= cap {
                    break 'buys;
                }
                if sells[sell_idx].remaining().is_zero() {
                    continue;
                }
                // Sells are sorted cheapest-first; once the best
                // remaining ask is above this bid, nothing else crosses.
                if buys[buy_idx].price < sells[sell_idx].price {
                    break;
                }

                match self.execute_pair(&buys[buy_idx], &sells[sell_idx]) {
                    Ok(Some((trade, updated_buy, updated_sell))) => {
                        executed.push(trade);
                        buys[buy_idx] = updated_buy;
                        sells[sell_idx] = updated_sell;
                    }
                    Ok(None) => continue,
                    Err(BookError::Storage(err)) => return Err(BookError::Storage(err)),
                    Err(err) => {
                        tracing::warn!(
                            buy_order = %buys[buy_idx].id,
                            sell_order = %sells[sell_idx].id,
                            %err,
                            "skipping pair after failed fill"
                        );
                        continue;
                    }
                }

                if buys[buy_idx].remaining().is_zero() {
                    continue 'buys;
                }
            }
        }

        if !executed.is_empty() {
            tracing::info!(trades = executed.len(), "matching pass complete");
        }
        Ok(executed)
    }

    /// Attempt one fill between a crossing pair. `Ok(None)` means the
    /// pair was skipped (stale snapshot entry or unmet precondition).
    fn execute_pair(
        &self,
        buy: &Order,
        sell: &Order,
    ) -> Result<Option<(Trade, Order, Order)>, BookError> {
        let now = now_millis();

        // Snapshot entries may be stale; decide from fresh reads.
        let Some(fresh_buy) = self.book.order(&buy.id)? else {
            return Ok(None);
        };
        let Some(fresh_sell) = self.book.order(&sell.id)? else {
            return Ok(None);
        };
        if !fresh_buy.is_open(now) || !fresh_sell.is_open(now) {
            return Ok(None);
        }
        if fresh_buy.price < fresh_sell.price {
            return Ok(None);
        }

        let asset = match self.check_asset_preconditions(&fresh_buy, &fresh_sell)? {
            PairEligibility::Eligible(asset) => asset,
            PairEligibility::Skip => return Ok(None),
        };

        let fill = fresh_buy.remaining().min(fresh_sell.remaining());
        let price = if fresh_buy.created_at < fresh_sell.created_at {
            fresh_buy.price
        } else {
            fresh_sell.price
        };

        let (updated_buy, updated_sell) = self.book.apply_match(
            &fresh_buy.id,
            fresh_buy.version,
            &fresh_sell.id,
            fresh_sell.version,
            fill,
        )?;

        let trade = Trade {
            id: TradeId::new(),
            buy_order_id: updated_buy.id,
            sell_order_id: updated_sell.id,
            buyer_id: updated_buy.user_id.clone(),
            seller_id: updated_sell.user_id.clone(),
            asset_id: updated_sell.asset_id.clone(),
            price,
            amount: fill,
            executed_at: now,
            tx_hash: None,
        };
        self.trades.append(&trade)?;

        // Full secondary-market sells hand the asset to the buyer. A
        // catalog failure here does not undo the trade; it is logged and
        // left to reconciliation.
        if let (Some(catalog), Some(asset)) = (&self.assets, asset) {
            if updated_sell.remaining().is_zero() {
                let transfer = OwnershipTransfer {
                    purchased_by: updated_buy.user_id.clone(),
                    previous_owner: Some(updated_sell.user_id.clone()),
                    purchase_price: price,
                    purchased_at: now,
                };
                if let Err(err) = catalog.transfer_ownership(&asset.id, transfer) {
                    tracing::warn!(asset_id = %asset.id, %err, "ownership transfer failed after fill");
                }
            }
        }

        tracing::info!(
            trade_id = %trade.id,
            price = %trade.price,
            amount = %trade.amount,
            "trade executed"
        );
        self.events.publish(MarketEvent::TradeExecuted {
            trade_id: trade.id,
            price: trade.price,
            amount: trade.amount,
            buyer_id: trade.buyer_id.clone(),
            seller_id: trade.seller_id.clone(),
        });

        Ok(Some((trade, updated_buy, updated_sell)))
    }

    /// Asset-market pairs must reference a catalog asset that is LOCKED,
    /// and the buyer's city preference must loosely match the asset's
    /// city. Spot pairs always pass.
    fn check_asset_preconditions(
        &self,
        buy: &Order,
        sell: &Order,
    ) -> Result<PairEligibility, BookError> {
        let Some(catalog) = &self.assets else {
            return Ok(PairEligibility::Eligible(None));
        };
        let Some(asset_id) = &sell.asset_id else {
            tracing::warn!(sell_order = %sell.id, "asset-market sell without asset id");
            return Ok(PairEligibility::Skip);
        };

        let asset = match catalog.asset(asset_id) {
            Ok(Some(asset)) => asset,
            Ok(None) => {
                tracing::warn!(asset_id = %asset_id, "sell references unknown asset");
                return Ok(PairEligibility::Skip);
            }
            Err(err) => {
                tracing::warn!(asset_id = %asset_id, %err, "asset lookup failed");
                return Ok(PairEligibility::Skip);
            }
        };
        if asset.status != AssetStatus::Locked {
            return Ok(PairEligibility::Skip);
        }

        if let Some(preferred) = &buy.preferred_city {
            let asset_city = asset.city.clone().unwrap_or_default();
            if !types::asset::city_matches(preferred, &asset_city) {
                return Ok(PairEligibility::Skip);
            }
        }

        Ok(PairEligibility::Eligible(Some(asset)))
    }
}

enum PairEligibility {
    Eligible(Option<AssetRecord>),
    Skip,
}
