//! Market data
//!
//! Read-only views over the trade log: headline statistics (last price,
//! 24h change, volume, VWAP) and OHLCV candles. Statistics read raw
//! stored values and tolerate historical type drift; a malformed trade
//! record degrades to a default instead of failing the query.

pub mod candles;
pub mod stats;

pub use candles::{Candle, CandleBuilder, CandleInterval};
pub use stats::{MarketStats, MarketSummary};

/// Milliseconds in the trailing stats window.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;
