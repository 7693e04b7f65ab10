//! Settlement
//!
//! The two stateful collaborators around the asset-market engine: the
//! lock manager, which grants exclusive time-bounded holds on assets
//! during a purchase flow, and the share tracker, which keeps
//! fractional ownership records at a fixed precision.

pub mod locks;
pub mod shares;

pub use locks::{LockManager, RefundHook};
pub use shares::{HoldingValue, ShareTracker};

use storage::StorageError;
use thiserror::Error;
use types::asset::AssetError;
use types::errors::{LockError, ShareError};

/// Umbrella error for settlement operations.
#[derive(Error, Debug)]
pub enum SettlementError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Share(#[from] ShareError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
