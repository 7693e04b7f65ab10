//! Core type definitions for the secondary-market trading core
//!
//! Shared vocabulary used by the order book, matching engine, market
//! statistics, lock manager and share tracker. This crate holds only
//! plain data types, invariant checks and the error taxonomy, no I/O.

pub mod asset;
pub mod errors;
pub mod holding;
pub mod ids;
pub mod lock;
pub mod numeric;
pub mod order;
pub mod trade;

/// Current epoch timestamp in milliseconds.
///
/// All persisted timestamps in this system are Unix epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
