//! Market event fan-out
//!
//! Best-effort broadcast of engine activity to in-process subscribers
//! (tickers, gateways). Publishing never blocks and never fails: with
//! no subscribers the event is dropped, and a slow subscriber only
//! loses its own backlog.

use serde::Serialize;
use tokio::sync::broadcast;
use types::ids::{OrderId, TradeId, UserId};
use types::numeric::{Price, Quantity};

const DEFAULT_CAPACITY: usize = 256;

/// Events emitted by the trading core.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MarketEvent {
    OrderAccepted {
        order_id: OrderId,
        price: Price,
        amount: Quantity,
    },
    OrderCancelled {
        order_id: OrderId,
    },
    TradeExecuted {
        trade_id: TradeId,
        price: Price,
        amount: Quantity,
        buyer_id: UserId,
        seller_id: UserId,
    },
    /// Periodic ticker update with the latest execution price.
    PriceUpdated {
        price: Price,
        at: i64,
    },
}

/// Cloneable handle over one broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MarketEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to whoever is listening.
    pub fn publish(&self, event: MarketEvent) {
        // An error just means there are no subscribers right now.
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
