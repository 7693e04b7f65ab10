//! Matching engine
//!
//! Price-time priority limit matching over the shared key-value
//! substrate. The engine owns no in-memory book: every pass reconstructs
//! the book from storage, matches, and writes fills back. Two markets
//! run through the same code path, a plain spot book and an asset
//! (secondary resale) book that adds per-pair settlement preconditions.

pub mod book;
pub mod engine;
pub mod events;
pub mod trades;

pub use book::{BookSnapshot, BookStats, Depth, MarketConfig, MarketKind, NewOrder, OrderBookManager};
pub use engine::{MatchOptions, MatchingEngine};
pub use events::{EventBus, MarketEvent};
pub use trades::{TradeFilter, TradeLog, TradeStats};

use storage::StorageError;
use thiserror::Error;
use types::errors::OrderError;

/// Umbrella error for book and engine operations.
#[derive(Error, Debug)]
pub enum BookError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
