//! OHLCV candles
//!
//! Builds candles from trade events, aligned to epoch boundaries.
//! Periods with no trades are backfilled flat at the previous close
//! with zero volume, so a chart never shows a hole where the market
//! was merely quiet.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use types::numeric::{Price, Quantity};

/// Supported candle intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CandleInterval {
    /// 1 minute
    M1,
    /// 5 minutes
    M5,
    /// 15 minutes
    M15,
    /// 1 hour
    H1,
    /// 1 day
    D1,
}

impl CandleInterval {
    /// Duration of this interval in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        match self {
            CandleInterval::M1 => 60 * 1_000,
            CandleInterval::M5 => 5 * 60 * 1_000,
            CandleInterval::M15 => 15 * 60 * 1_000,
            CandleInterval::H1 => 3_600 * 1_000,
            CandleInterval::D1 => 86_400 * 1_000,
        }
    }

    /// Align a timestamp to this interval's boundary (floor).
    pub fn align(&self, timestamp_ms: i64) -> i64 {
        let duration = self.duration_ms();
        (timestamp_ms / duration) * duration
    }
}

/// A single OHLCV candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub open_time: i64,
    pub close_time: i64,
    pub trade_count: u64,
}

impl Candle {
    fn new(price: Decimal, volume: Decimal, open_time: i64, interval: CandleInterval) -> Self {
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
            open_time,
            close_time: open_time + interval.duration_ms() - 1,
            trade_count: 1,
        }
    }

    fn update(&mut self, price: Decimal, volume: Decimal) {
        if price > self.high {
            self.high = price;
        }
        if price < self.low {
            self.low = price;
        }
        self.close = price;
        self.volume += volume;
        self.trade_count += 1;
    }

    /// Flat candle carrying the previous close through a quiet period.
    fn flat(prev_close: Decimal, open_time: i64, interval: CandleInterval) -> Self {
        Self {
            open: prev_close,
            high: prev_close,
            low: prev_close,
            close: prev_close,
            volume: Decimal::ZERO,
            open_time,
            close_time: open_time + interval.duration_ms() - 1,
            trade_count: 0,
        }
    }

    /// OHLCV invariants: high dominates, low is dominated, volume is
    /// non-negative and the period is well-formed.
    pub fn is_valid(&self) -> bool {
        self.high >= self.open
            && self.high >= self.close
            && self.high >= self.low
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= Decimal::ZERO
            && self.close_time > self.open_time
    }
}

/// Builds candles for one interval on one market.
pub struct CandleBuilder {
    interval: CandleInterval,
    /// Candle currently accumulating trades.
    current: Option<Candle>,
    /// Closed candles keyed by open time.
    closed: BTreeMap<i64, Candle>,
    max_history: usize,
}

impl CandleBuilder {
    pub fn new(interval: CandleInterval, max_history: usize) -> Self {
        Self {
            interval,
            current: None,
            closed: BTreeMap::new(),
            max_history,
        }
    }

    pub fn interval(&self) -> CandleInterval {
        self.interval
    }

    /// Fold one trade in. Returns the previous candle when this trade
    /// opens a new period; quiet periods in between are backfilled
    /// flat at the previous close.
    pub fn process_trade(
        &mut self,
        price: Price,
        quantity: Quantity,
        timestamp_ms: i64,
    ) -> Option<Candle> {
        let price = price.as_decimal();
        let boundary = self.interval.align(timestamp_ms);

        let mut closed = None;
        if let Some(current) = &self.current {
            if boundary > current.open_time {
                let prev_close = current.close;
                let prev_open = current.open_time;
                closed = self.close_current();
                self.backfill(prev_close, prev_open, boundary);
            }
        }

        match &mut self.current {
            Some(candle) => candle.update(price, quantity.as_decimal()),
            None => {
                self.current = Some(Candle::new(
                    price,
                    quantity.as_decimal(),
                    boundary,
                    self.interval,
                ));
            }
        }

        closed
    }

    /// Force-close the accumulating candle (ticker boundary).
    pub fn close_current(&mut self) -> Option<Candle> {
        let candle = self.current.take()?;
        self.closed.insert(candle.open_time, candle.clone());
        self.trim_history();
        Some(candle)
    }

    /// Insert flat candles for every empty period in `(from, to)`.
    fn backfill(&mut self, prev_close: Decimal, from_ms: i64, to_ms: i64) {
        let duration = self.interval.duration_ms();
        let mut t = self.interval.align(from_ms) + duration;
        while t < to_ms {
            self.closed
                .entry(t)
                .or_insert_with(|| Candle::flat(prev_close, t, self.interval));
            t += duration;
        }
        self.trim_history();
    }

    /// The latest `limit` closed candles, oldest first.
    pub fn candles(&self, limit: usize) -> Vec<Candle> {
        let mut out: Vec<Candle> = self.closed.values().rev().take(limit).cloned().collect();
        out.reverse();
        out
    }

    pub fn current_candle(&self) -> Option<&Candle> {
        self.current.as_ref()
    }

    fn trim_history(&mut self) {
        while self.closed.len() > self.max_history {
            self.closed.pop_first();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minutes(m: i64) -> i64 {
        m * 60 * 1_000
    }

    #[test]
    fn test_interval_alignment() {
        let ts = minutes(5) + 30_000; // 5m30s
        assert_eq!(CandleInterval::M1.align(ts), minutes(5));
        assert_eq!(CandleInterval::M5.align(ts), minutes(5));
        assert_eq!(CandleInterval::M15.align(ts), 0);
    }

    #[test]
    fn test_candle_accumulates_ohlcv() {
        let mut builder = CandleBuilder::new(CandleInterval::M1, 100);
        builder.process_trade(Price::from_u64(100), Quantity::from_u64(1), 10_000);
        builder.process_trade(Price::from_u64(110), Quantity::from_u64(2), 20_000);
        builder.process_trade(Price::from_u64(95), Quantity::from_u64(3), 30_000);
        builder.process_trade(Price::from_u64(105), Quantity::from_u64(1), 40_000);

        let candle = builder.current_candle().unwrap();
        assert_eq!(candle.open, Decimal::from(100));
        assert_eq!(candle.high, Decimal::from(110));
        assert_eq!(candle.low, Decimal::from(95));
        assert_eq!(candle.close, Decimal::from(105));
        assert_eq!(candle.volume, Decimal::from(7));
        assert_eq!(candle.trade_count, 4);
        assert!(candle.is_valid());
    }

    #[test]
    fn test_boundary_closes_previous_candle() {
        let mut builder = CandleBuilder::new(CandleInterval::M1, 100);
        builder.process_trade(Price::from_u64(100), Quantity::from_u64(1), 10_000);

        let closed = builder
            .process_trade(Price::from_u64(110), Quantity::from_u64(1), minutes(1) + 5_000)
            .unwrap();
        assert_eq!(closed.close, Decimal::from(100));
        assert_eq!(closed.trade_count, 1);

        let current = builder.current_candle().unwrap();
        assert_eq!(current.open, Decimal::from(110));
    }

    #[test]
    fn test_quiet_periods_backfill_flat() {
        let mut builder = CandleBuilder::new(CandleInterval::M1, 100);
        builder.process_trade(Price::from_u64(100), Quantity::from_u64(1), 10_000);
        // Next trade three minutes later: minutes 1 and 2 were quiet.
        builder.process_trade(Price::from_u64(110), Quantity::from_u64(1), minutes(3) + 5_000);
        builder.close_current();

        let candles = builder.candles(10);
        assert_eq!(candles.len(), 4);
        for flat in &candles[1..3] {
            assert_eq!(flat.open, Decimal::from(100));
            assert_eq!(flat.close, Decimal::from(100));
            assert_eq!(flat.volume, Decimal::ZERO);
            assert_eq!(flat.trade_count, 0);
            assert!(flat.is_valid());
        }
        assert_eq!(candles[3].close, Decimal::from(110));
    }

    #[test]
    fn test_candles_ordered_oldest_first() {
        let mut builder = CandleBuilder::new(CandleInterval::M1, 100);
        for minute in 0..3 {
            builder.process_trade(
                Price::from_u64(100 + minute as u64),
                Quantity::from_u64(1),
                minutes(minute) + 1_000,
            );
        }
        builder.close_current();

        let candles = builder.candles(10);
        assert_eq!(candles.len(), 3);
        assert!(candles.windows(2).all(|w| w[0].open_time < w[1].open_time));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut builder = CandleBuilder::new(CandleInterval::M1, 3);
        for minute in 0..10 {
            builder.process_trade(Price::from_u64(100), Quantity::from_u64(1), minutes(minute));
        }
        builder.close_current();

        assert!(builder.candles(100).len() <= 3);
    }

    #[test]
    fn test_invalid_candle_detected() {
        let broken = Candle {
            open: Decimal::from(100),
            high: Decimal::from(90), // high below open
            low: Decimal::from(80),
            close: Decimal::from(85),
            volume: Decimal::ONE,
            open_time: 0,
            close_time: 59_999,
            trade_count: 1,
        };
        assert!(!broken.is_valid());
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(64))]

        #[test]
        fn candles_stay_valid_under_any_trades(
            trades in proptest::collection::vec((1u64..10_000, 1u64..100, 0i64..600), 1..50)
        ) {
            let mut builder = CandleBuilder::new(CandleInterval::M1, 1_000);
            let mut ts = 0i64;
            for (price, qty, step_s) in trades {
                ts += step_s * 1_000;
                builder.process_trade(Price::from_u64(price), Quantity::from_u64(qty), ts);
            }
            builder.close_current();

            for candle in builder.candles(usize::MAX) {
                proptest::prop_assert!(candle.is_valid());
            }
        }
    }

    #[test]
    fn test_candle_serialization_camel_case() {
        let mut builder = CandleBuilder::new(CandleInterval::M1, 10);
        builder.process_trade(Price::from_u64(100), Quantity::from_u64(1), 1_000);
        let candle = builder.close_current().unwrap();

        let json = serde_json::to_value(&candle).unwrap();
        assert!(json.get("openTime").is_some());
        assert!(json.get("tradeCount").is_some());
    }
}
