//! Asset locks
//!
//! A lock is an exclusive, time-bounded hold on one asset for one user
//! during a purchase flow. At most one active, unexpired lock may exist
//! per asset. Expiry is cooperative: the stored status stays `active`
//! until a sweep runs, so readers must also check the deadline.

use crate::ids::{AssetId, LockId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default lock lifetime: 48 hours.
pub const DEFAULT_LOCK_TTL_MS: i64 = 48 * 60 * 60 * 1000;

/// Lock lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStatus {
    /// Holding the asset; purchase in flight.
    Active,
    /// Purchase completed before expiry (terminal).
    Confirmed,
    /// Cancelled or swept past its deadline, asset returned to the
    /// market (terminal).
    Released,
}

impl LockStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LockStatus::Active)
    }
}

/// An exclusive, time-bounded hold on one asset for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lock {
    pub id: LockId,
    pub asset_id: AssetId,
    pub user_id: UserId,
    /// Fee paid to take the hold; refundable on release.
    pub lock_fee: Decimal,
    pub locked_at: i64,
    pub lock_expires_at: i64,
    pub status: LockStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub updated_at: i64,
}

impl Lock {
    /// Whether the deadline has passed at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        self.lock_expires_at <= now
    }

    /// Whether the lock actually holds the asset at `now`. Stored
    /// status alone is advisory; the deadline is checked at read time.
    pub fn is_active(&self, now: i64) -> bool {
        self.status == LockStatus::Active && !self.is_expired(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_lock(expires_at: i64) -> Lock {
        Lock {
            id: LockId::new(),
            asset_id: AssetId::new("asset_1"),
            user_id: UserId::new("alice"),
            lock_fee: Decimal::from(50),
            locked_at: 1_000,
            lock_expires_at: expires_at,
            status: LockStatus::Active,
            tx_hash: None,
            updated_at: 1_000,
        }
    }

    #[test]
    fn test_active_until_deadline() {
        let lock = make_lock(10_000);
        assert!(lock.is_active(9_999));
        assert!(!lock.is_active(10_000));
    }

    #[test]
    fn test_terminal_status_never_active() {
        let mut lock = make_lock(10_000);
        lock.status = LockStatus::Released;
        assert!(!lock.is_active(0));
        assert!(lock.status.is_terminal());
    }

    #[test]
    fn test_lock_serialization_roundtrip() {
        let lock = make_lock(10_000);
        let json = serde_json::to_string(&lock).unwrap();
        let back: Lock = serde_json::from_str(&json).unwrap();
        assert_eq!(lock, back);
        assert!(json.contains("lockExpiresAt"));
    }
}
