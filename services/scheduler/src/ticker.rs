//! Market ticker
//!
//! Periodic fold of new trades into candles plus a price broadcast.
//! The ticker remembers the last trade it has seen and only processes
//! the tail of the log on each tick; a price broadcast goes out only
//! when the price actually moved.

use market_data::{Candle, CandleBuilder, CandleInterval, MarketStats};
use matching_engine::{EventBus, MarketEvent, TradeLog};
use std::sync::{Arc, Mutex, PoisonError};
use storage::StorageError;
use types::now_millis;
use types::numeric::Price;

/// How many closed candles the ticker retains.
const CANDLE_HISTORY: usize = 1_000;

struct TickerState {
    builder: CandleBuilder,
    /// `executed_at` of the newest trade already folded in.
    last_seen: i64,
    last_price: Option<Price>,
}

/// One market's ticker: candles and price broadcasts.
pub struct Ticker {
    trades: Arc<TradeLog>,
    stats: Arc<MarketStats>,
    events: EventBus,
    state: Mutex<TickerState>,
}

impl Ticker {
    pub fn new(
        trades: Arc<TradeLog>,
        stats: Arc<MarketStats>,
        events: EventBus,
        interval: CandleInterval,
    ) -> Self {
        Self {
            trades,
            stats,
            events,
            state: Mutex::new(TickerState {
                builder: CandleBuilder::new(interval, CANDLE_HISTORY),
                last_seen: 0,
                last_price: None,
            }),
        }
    }

    /// Fold trades that arrived since the previous tick and broadcast
    /// the price if it moved.
    pub fn tick(&self) -> Result<(), StorageError> {
        let trades = self.trades.all()?;
        let current = self.stats.current_price()?;

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for trade in &trades {
            if trade.executed_at <= state.last_seen {
                continue;
            }
            state
                .builder
                .process_trade(trade.price, trade.amount, trade.executed_at);
            state.last_seen = trade.executed_at;
        }

        if let Some(price) = current {
            if state.last_price != Some(price) {
                state.last_price = Some(price);
                self.events.publish(MarketEvent::PriceUpdated {
                    price,
                    at: now_millis(),
                });
            }
        }
        Ok(())
    }

    /// The latest closed candles, oldest first.
    pub fn candles(&self, limit: usize) -> Vec<Candle> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .builder
            .candles(limit)
    }

    /// The candle currently accumulating trades.
    pub fn current_candle(&self) -> Option<Candle> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .builder
            .current_candle()
            .cloned()
    }
}
