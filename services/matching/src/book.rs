//! Order book manager
//!
//! The book is not a standing data structure: it is reconstructed from
//! the order namespace on every read, filtered down to open orders and
//! sorted into price-time priority. All writes to the namespace funnel
//! through a per-manager mutex, so read-modify-write cycles on a single
//! order never interleave.

use crate::events::{EventBus, MarketEvent};
use crate::BookError;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use storage::{KvStore, KvStoreExt, Namespace};
use types::errors::OrderError;
use types::ids::{AssetId, OrderId, UserId};
use types::now_millis;
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderSide, OrderStatus};

/// Default resting lifetime for asset-market orders (7 days).
pub const DEFAULT_ORDER_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Which market a manager serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketKind {
    /// Plain spot book, no asset linkage.
    Spot,
    /// Secondary resale book for locked assets.
    Asset,
}

/// Per-market configuration: storage namespaces and default expiry.
#[derive(Debug, Clone)]
pub struct MarketConfig {
    pub kind: MarketKind,
    pub orders_namespace: Namespace,
    pub trades_namespace: Namespace,
    /// Applied when a submission carries no explicit deadline.
    pub default_ttl_ms: Option<i64>,
}

impl MarketConfig {
    pub fn spot() -> Self {
        Self {
            kind: MarketKind::Spot,
            orders_namespace: Namespace::Orders,
            trades_namespace: Namespace::Trades,
            default_ttl_ms: None,
        }
    }

    pub fn asset_market() -> Self {
        Self {
            kind: MarketKind::Asset,
            orders_namespace: Namespace::RwaOrders,
            trades_namespace: Namespace::RwaTrades,
            default_ttl_ms: Some(DEFAULT_ORDER_TTL_MS),
        }
    }
}

/// An order submission before validation.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub side: OrderSide,
    pub price: Decimal,
    pub amount: Decimal,
    pub asset_id: Option<AssetId>,
    pub preferred_city: Option<String>,
    pub expires_at: Option<i64>,
}

/// Open orders sorted into matching priority.
///
/// Buys are sorted best-first (highest price, then earliest), sells
/// likewise (lowest price, then earliest), so the head of each side is
/// the next match candidate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSnapshot {
    pub buys: Vec<Order>,
    pub sells: Vec<Order>,
}

/// Aggregated price levels for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Depth {
    /// `(price, total remaining)` best-first.
    pub bids: Vec<(Price, Quantity)>,
    pub asks: Vec<(Price, Quantity)>,
}

/// Book-wide counters over open orders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookStats {
    pub buy_orders: usize,
    pub sell_orders: usize,
    pub buy_amount: Decimal,
    pub sell_amount: Decimal,
}

/// Manages one market's order namespace.
pub struct OrderBookManager {
    store: Arc<dyn KvStore>,
    config: MarketConfig,
    events: EventBus,
    /// Serializes every write to the order namespace.
    write_guard: Mutex<()>,
}

impl OrderBookManager {
    pub fn new(store: Arc<dyn KvStore>, config: MarketConfig) -> Self {
        Self::with_events(store, config, EventBus::default())
    }

    /// Build a manager that publishes lifecycle events on a shared bus.
    pub fn with_events(store: Arc<dyn KvStore>, config: MarketConfig, events: EventBus) -> Self {
        Self {
            store,
            config,
            events,
            write_guard: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// Validate and persist a new resting order.
    pub fn submit_order(&self, submission: NewOrder) -> Result<Order, BookError> {
        let price = Price::try_new(submission.price)
            .map_err(|err| OrderError::InvalidOrder(err.to_string()))?;
        let amount = Quantity::try_new(submission.amount)
            .map_err(|err| OrderError::InvalidOrder(err.to_string()))?;
        if amount.is_zero() {
            return Err(OrderError::InvalidOrder("amount must be positive".to_string()).into());
        }

        if self.config.kind == MarketKind::Asset {
            match submission.side {
                OrderSide::Sell if submission.asset_id.is_none() => {
                    return Err(OrderError::InvalidOrder(
                        "sell orders must name the asset being resold".to_string(),
                    )
                    .into());
                }
                OrderSide::Buy if submission.preferred_city.is_none() => {
                    return Err(OrderError::InvalidOrder(
                        "buy orders must carry a preferred city".to_string(),
                    )
                    .into());
                }
                _ => {}
            }
        }

        let now = now_millis();
        let expires_at = submission
            .expires_at
            .or_else(|| self.config.default_ttl_ms.map(|ttl| now + ttl));

        let order = Order {
            id: OrderId::new(),
            user_id: submission.user_id,
            side: submission.side,
            price,
            amount,
            filled_amount: Quantity::zero(),
            status: OrderStatus::Pending,
            asset_id: submission.asset_id,
            preferred_city: submission.preferred_city,
            created_at: now,
            updated_at: now,
            expires_at,
            version: 0,
        };

        let _guard = self.lock_writes();
        self.store
            .put_json(self.config.orders_namespace, &order.id.to_string(), &order)?;

        tracing::info!(
            order_id = %order.id,
            side = ?order.side,
            price = %order.price,
            amount = %order.amount,
            "order accepted"
        );
        self.events.publish(MarketEvent::OrderAccepted {
            order_id: order.id,
            price: order.price,
            amount: order.amount,
        });
        Ok(order)
    }

    /// Look up one order by id.
    pub fn order(&self, order_id: &OrderId) -> Result<Option<Order>, BookError> {
        Ok(self
            .store
            .get_json(self.config.orders_namespace, &order_id.to_string())?)
    }

    /// Reconstruct the open book, at most `limit` orders per side.
    ///
    /// `city` applies a soft filter to the buy side: buys with no
    /// preference always pass, buys with one pass when it matches the
    /// given city loosely (exact or substring either way).
    pub fn book(&self, limit: usize, city: Option<&str>) -> Result<BookSnapshot, BookError> {
        let now = now_millis();
        let orders: Vec<Order> = self
            .store
            .get_all_decoded(self.config.orders_namespace)?;

        let mut buys = Vec::new();
        let mut sells = Vec::new();
        for order in orders {
            if !order.is_open(now) {
                continue;
            }
            match order.side {
                OrderSide::Buy => {
                    let passes = match (city, order.preferred_city.as_deref()) {
                        (Some(city), Some(preferred)) => types::asset::city_matches(preferred, city),
                        _ => true,
                    };
                    if passes {
                        buys.push(order);
                    }
                }
                OrderSide::Sell => sells.push(order),
            }
        }

        buys.sort_by(|a, b| {
            b.price
                .cmp(&a.price)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        sells.sort_by(|a, b| {
            a.price
                .cmp(&b.price)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        buys.truncate(limit);
        sells.truncate(limit);

        Ok(BookSnapshot { buys, sells })
    }

    /// Cancel a pending order. Only the owner may cancel, and only
    /// while the order is still pending; the record is kept with status
    /// `cancelled` until archival.
    pub fn cancel_order(&self, order_id: &OrderId, user_id: &UserId) -> Result<Order, BookError> {
        let _guard = self.lock_writes();

        let mut order = self
            .order(order_id)?
            .ok_or(OrderError::NotFound {
                order_id: order_id.clone(),
            })?;
        if &order.user_id != user_id {
            return Err(OrderError::Unauthorized.into());
        }
        if order.status != OrderStatus::Pending {
            return Err(OrderError::InvalidState {
                expected: "pending".to_string(),
                actual: format!("{:?}", order.status).to_lowercase(),
            }
            .into());
        }

        order.status = OrderStatus::Cancelled;
        order.updated_at = now_millis();
        order.version += 1;
        self.store
            .put_json(self.config.orders_namespace, &order_id.to_string(), &order)?;

        tracing::info!(order_id = %order.id, "order cancelled");
        self.events
            .publish(MarketEvent::OrderCancelled { order_id: order.id });
        Ok(order)
    }

    /// Flip pending orders past their deadline to `expired`. Idempotent:
    /// a second sweep over the same state marks nothing.
    pub fn cleanup_expired_orders(&self) -> Result<usize, BookError> {
        let _guard = self.lock_writes();
        let now = now_millis();
        let orders: Vec<Order> = self
            .store
            .get_all_decoded(self.config.orders_namespace)?;

        let mut expired = 0;
        for mut order in orders {
            if order.status != OrderStatus::Pending || !order.is_expired(now) {
                continue;
            }
            order.status = OrderStatus::Expired;
            order.updated_at = now;
            order.version += 1;
            self.store
                .put_json(self.config.orders_namespace, &order.id.to_string(), &order)?;
            expired += 1;
        }

        if expired > 0 {
            tracing::info!(count = expired, namespace = %self.config.orders_namespace, "expired orders swept");
        }
        Ok(expired)
    }

    /// Hard-delete terminal orders whose last update is older than
    /// `older_than_ms`. The only path that removes order records.
    pub fn archive_terminal_orders(&self, older_than_ms: i64) -> Result<usize, BookError> {
        let _guard = self.lock_writes();
        let cutoff = now_millis() - older_than_ms;
        let orders: Vec<Order> = self
            .store
            .get_all_decoded(self.config.orders_namespace)?;

        let mut archived = 0;
        for order in orders {
            if order.status.is_terminal() && order.updated_at < cutoff {
                self.store
                    .delete(self.config.orders_namespace, &order.id.to_string())?;
                archived += 1;
            }
        }

        if archived > 0 {
            tracing::info!(count = archived, "terminal orders archived");
        }
        Ok(archived)
    }

    /// Orders belonging to one user, newest first, optionally narrowed
    /// by side and status.
    pub fn user_orders(
        &self,
        user_id: &UserId,
        side: Option<OrderSide>,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, BookError> {
        let mut orders: Vec<Order> = self
            .store
            .get_all_decoded::<Order>(self.config.orders_namespace)?
            .into_iter()
            .filter(|order| &order.user_id == user_id)
            .filter(|order| side.map_or(true, |s| order.side == s))
            .filter(|order| status.map_or(true, |s| order.status == s))
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    /// Open sell orders resting against one asset.
    pub fn asset_sell_orders(&self, asset_id: &AssetId) -> Result<Vec<Order>, BookError> {
        let now = now_millis();
        Ok(self
            .store
            .get_all_decoded::<Order>(self.config.orders_namespace)?
            .into_iter()
            .filter(|order| order.side == OrderSide::Sell)
            .filter(|order| order.asset_id.as_ref() == Some(asset_id))
            .filter(|order| order.is_open(now))
            .collect())
    }

    /// Aggregate open orders into price levels.
    pub fn depth(&self, limit: usize) -> Result<Depth, BookError> {
        let snapshot = self.book(usize::MAX, None)?;
        Ok(Depth {
            bids: aggregate_levels(&snapshot.buys, limit),
            asks: aggregate_levels(&snapshot.sells, limit),
        })
    }

    /// Counters over the open book.
    pub fn book_stats(&self) -> Result<BookStats, BookError> {
        let snapshot = self.book(usize::MAX, None)?;
        let sum = |orders: &[Order]| -> Decimal {
            orders
                .iter()
                .map(|order| order.remaining().as_decimal())
                .sum()
        };
        Ok(BookStats {
            buy_orders: snapshot.buys.len(),
            sell_orders: snapshot.sells.len(),
            buy_amount: sum(&snapshot.buys),
            sell_amount: sum(&snapshot.sells),
        })
    }

    /// Apply one fill to both sides of a match atomically with respect
    /// to other writers. Each order's stored version must equal the
    /// version the caller read; a mismatch means someone else wrote in
    /// between and the whole fill is rejected untouched.
    pub(crate) fn apply_match(
        &self,
        buy_id: &OrderId,
        buy_version: u64,
        sell_id: &OrderId,
        sell_version: u64,
        fill: Quantity,
    ) -> Result<(Order, Order), BookError> {
        let _guard = self.lock_writes();
        let now = now_millis();

        let mut buy = self.read_for_fill(buy_id, buy_version, fill, now)?;
        let mut sell = self.read_for_fill(sell_id, sell_version, fill, now)?;

        buy.add_fill(fill, now);
        sell.add_fill(fill, now);

        self.store
            .put_json(self.config.orders_namespace, &buy.id.to_string(), &buy)?;
        self.store
            .put_json(self.config.orders_namespace, &sell.id.to_string(), &sell)?;
        Ok((buy, sell))
    }

    fn read_for_fill(
        &self,
        order_id: &OrderId,
        expected_version: u64,
        fill: Quantity,
        now: i64,
    ) -> Result<Order, BookError> {
        let order = self.order(order_id)?.ok_or(OrderError::NotFound {
            order_id: order_id.clone(),
        })?;
        if order.version != expected_version {
            return Err(OrderError::VersionConflict {
                order_id: order_id.clone(),
            }
            .into());
        }
        if order.status != OrderStatus::Pending {
            return Err(OrderError::InvalidState {
                expected: "pending".to_string(),
                actual: format!("{:?}", order.status).to_lowercase(),
            }
            .into());
        }
        if order.is_expired(now) {
            return Err(OrderError::Expired.into());
        }
        if fill.as_decimal() > order.remaining().as_decimal() {
            return Err(OrderError::InvalidOrder("fill exceeds remaining quantity".to_string()).into());
        }
        Ok(order)
    }

    fn lock_writes(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn aggregate_levels(orders: &[Order], limit: usize) -> Vec<(Price, Quantity)> {
    let mut levels: Vec<(Price, Quantity)> = Vec::new();
    for order in orders {
        match levels.last_mut() {
            Some((price, total)) if *price == order.price => {
                *total = *total + order.remaining();
            }
            _ => levels.push((order.price, order.remaining())),
        }
    }
    levels.truncate(limit);
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::MemoryStore;

    fn spot_book() -> OrderBookManager {
        OrderBookManager::new(Arc::new(MemoryStore::new()), MarketConfig::spot())
    }

    fn submission(user: &str, side: OrderSide, price: i64, amount: i64) -> NewOrder {
        NewOrder {
            user_id: UserId::new(user),
            side,
            price: Decimal::from(price),
            amount: Decimal::from(amount),
            asset_id: None,
            preferred_city: None,
            expires_at: None,
        }
    }

    #[test]
    fn test_submit_rejects_bad_numbers() {
        let book = spot_book();

        let err = book
            .submit_order(submission("alice", OrderSide::Buy, 0, 10))
            .unwrap_err();
        assert!(matches!(err, BookError::Order(OrderError::InvalidOrder(_))));

        let err = book
            .submit_order(submission("alice", OrderSide::Buy, 100, 0))
            .unwrap_err();
        assert!(matches!(err, BookError::Order(OrderError::InvalidOrder(_))));
    }

    #[test]
    fn test_asset_market_requires_linkage_fields() {
        let book = OrderBookManager::new(Arc::new(MemoryStore::new()), MarketConfig::asset_market());

        // Sell without an asset id.
        let err = book
            .submit_order(submission("alice", OrderSide::Sell, 100, 10))
            .unwrap_err();
        assert!(matches!(err, BookError::Order(OrderError::InvalidOrder(_))));

        // Buy without a preferred city.
        let err = book
            .submit_order(submission("bob", OrderSide::Buy, 100, 10))
            .unwrap_err();
        assert!(matches!(err, BookError::Order(OrderError::InvalidOrder(_))));

        let mut sell = submission("alice", OrderSide::Sell, 100, 10);
        sell.asset_id = Some(AssetId::new("asset_1"));
        let order = book.submit_order(sell).unwrap();
        assert!(order.expires_at.is_some());
    }

    #[test]
    fn test_book_sorted_price_time() {
        let book = spot_book();
        let buy_low = book
            .submit_order(submission("a", OrderSide::Buy, 100, 1))
            .unwrap();
        let buy_high = book
            .submit_order(submission("b", OrderSide::Buy, 105, 1))
            .unwrap();
        let sell_high = book
            .submit_order(submission("c", OrderSide::Sell, 110, 1))
            .unwrap();
        let sell_low = book
            .submit_order(submission("d", OrderSide::Sell, 108, 1))
            .unwrap();

        let snapshot = book.book(10, None).unwrap();
        assert_eq!(
            snapshot.buys.iter().map(|o| o.id.clone()).collect::<Vec<_>>(),
            vec![buy_high.id, buy_low.id]
        );
        assert_eq!(
            snapshot.sells.iter().map(|o| o.id.clone()).collect::<Vec<_>>(),
            vec![sell_low.id, sell_high.id]
        );
    }

    #[test]
    fn test_cancel_enforces_owner_and_state() {
        let book = spot_book();
        let order = book
            .submit_order(submission("alice", OrderSide::Buy, 100, 10))
            .unwrap();

        let err = book
            .cancel_order(&order.id, &UserId::new("mallory"))
            .unwrap_err();
        assert!(matches!(err, BookError::Order(OrderError::Unauthorized)));

        let cancelled = book.cancel_order(&order.id, &UserId::new("alice")).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        // A second cancel finds a terminal order.
        let err = book
            .cancel_order(&order.id, &UserId::new("alice"))
            .unwrap_err();
        assert!(matches!(
            err,
            BookError::Order(OrderError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_cancelled_order_leaves_book_but_stays_stored() {
        let book = spot_book();
        let order = book
            .submit_order(submission("alice", OrderSide::Buy, 100, 10))
            .unwrap();
        book.cancel_order(&order.id, &UserId::new("alice")).unwrap();

        assert!(book.book(10, None).unwrap().buys.is_empty());
        assert!(book.order(&order.id).unwrap().is_some());
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let book = spot_book();
        let mut submission = submission("alice", OrderSide::Buy, 100, 10);
        submission.expires_at = Some(now_millis() - 1_000);
        book.submit_order(submission).unwrap();

        assert_eq!(book.cleanup_expired_orders().unwrap(), 1);
        assert_eq!(book.cleanup_expired_orders().unwrap(), 0);
    }

    #[test]
    fn test_archive_removes_only_old_terminal_orders() {
        let book = spot_book();
        let open = book
            .submit_order(submission("alice", OrderSide::Buy, 100, 10))
            .unwrap();
        let cancelled = book
            .submit_order(submission("alice", OrderSide::Buy, 101, 10))
            .unwrap();
        book.cancel_order(&cancelled.id, &UserId::new("alice"))
            .unwrap();

        // Cutoff in the future relative to the cancel, so it qualifies.
        assert_eq!(book.archive_terminal_orders(-1_000).unwrap(), 1);
        assert!(book.order(&cancelled.id).unwrap().is_none());
        assert!(book.order(&open.id).unwrap().is_some());

        // Fresh terminal orders survive a conservative cutoff.
        book.cancel_order(&open.id, &UserId::new("alice")).unwrap();
        assert_eq!(book.archive_terminal_orders(60_000).unwrap(), 0);
    }

    #[test]
    fn test_apply_match_rejects_stale_version() {
        let book = spot_book();
        let buy = book
            .submit_order(submission("alice", OrderSide::Buy, 105, 10))
            .unwrap();
        let sell = book
            .submit_order(submission("bob", OrderSide::Sell, 100, 10))
            .unwrap();

        let err = book
            .apply_match(&buy.id, buy.version + 1, &sell.id, sell.version, Quantity::from_u64(5))
            .unwrap_err();
        assert!(matches!(
            err,
            BookError::Order(OrderError::VersionConflict { .. })
        ));

        // Nothing was written.
        let stored = book.order(&buy.id).unwrap().unwrap();
        assert!(stored.filled_amount.is_zero());
    }

    #[test]
    fn test_apply_match_fills_both_sides() {
        let book = spot_book();
        let buy = book
            .submit_order(submission("alice", OrderSide::Buy, 105, 10))
            .unwrap();
        let sell = book
            .submit_order(submission("bob", OrderSide::Sell, 100, 6))
            .unwrap();

        let (buy, sell) = book
            .apply_match(&buy.id, 0, &sell.id, 0, Quantity::from_u64(6))
            .unwrap();
        assert_eq!(buy.remaining(), Quantity::from_u64(4));
        assert_eq!(buy.status, OrderStatus::Pending);
        assert_eq!(sell.status, OrderStatus::Filled);
        assert_eq!(buy.version, 1);
    }

    #[test]
    fn test_depth_aggregates_levels() {
        let book = spot_book();
        book.submit_order(submission("a", OrderSide::Buy, 100, 3))
            .unwrap();
        book.submit_order(submission("b", OrderSide::Buy, 100, 2))
            .unwrap();
        book.submit_order(submission("c", OrderSide::Buy, 99, 1))
            .unwrap();

        let depth = book.depth(10).unwrap();
        assert_eq!(
            depth.bids,
            vec![
                (Price::from_u64(100), Quantity::from_u64(5)),
                (Price::from_u64(99), Quantity::from_u64(1)),
            ]
        );
    }

    #[test]
    fn test_user_orders_filters_and_sorts() {
        let book = spot_book();
        book.submit_order(submission("alice", OrderSide::Buy, 100, 1))
            .unwrap();
        book.submit_order(submission("alice", OrderSide::Sell, 110, 1))
            .unwrap();
        book.submit_order(submission("bob", OrderSide::Buy, 100, 1))
            .unwrap();

        let all = book.user_orders(&UserId::new("alice"), None, None).unwrap();
        assert_eq!(all.len(), 2);

        let sells = book
            .user_orders(&UserId::new("alice"), Some(OrderSide::Sell), None)
            .unwrap();
        assert_eq!(sells.len(), 1);
    }

    #[test]
    fn test_city_filter_is_soft_on_buys() {
        let book = OrderBookManager::new(Arc::new(MemoryStore::new()), MarketConfig::asset_market());

        let mut taipei = submission("a", OrderSide::Buy, 100, 1);
        taipei.preferred_city = Some("Taipei".to_string());
        book.submit_order(taipei).unwrap();

        let mut kaohsiung = submission("b", OrderSide::Buy, 100, 1);
        kaohsiung.preferred_city = Some("Kaohsiung".to_string());
        book.submit_order(kaohsiung).unwrap();

        let snapshot = book.book(10, Some("Taipei City")).unwrap();
        assert_eq!(snapshot.buys.len(), 1);
        assert_eq!(snapshot.buys[0].preferred_city.as_deref(), Some("Taipei"));

        // No filter returns both.
        assert_eq!(book.book(10, None).unwrap().buys.len(), 2);
    }
}
