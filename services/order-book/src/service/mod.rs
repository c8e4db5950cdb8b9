//! Order book service
//!
//! The service owns transaction boundaries: it decides which multi-step
//! update is atomic and stages it on a [`Tx`](crate::store::Tx), while the
//! store performs every mutation. Order events are published after the
//! commit they describe.

mod cancel;
mod orders;
mod swap;

use std::sync::Arc;

use rust_decimal::Decimal;
use types::ids::{ClientOrderId, Symbol, UserId};
use types::order::{Order, Side};
use uuid::Uuid;

use crate::config::BookConfig;
use crate::events::{self, EventSink};
use crate::store::OrderBookStore;

pub use self::orders::MAX_FILLS;

/// New resting order request
#[derive(Debug, Clone)]
pub struct PlaceOrderInput {
    pub user_id: UserId,
    pub client_order_id: ClientOrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
}

/// Outcome of a swap transition that tolerates repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// This call committed the transition
    Applied,
    /// An earlier call already committed it; nothing was written
    AlreadyDone,
}

impl Transition {
    pub fn is_applied(self) -> bool {
        self == Transition::Applied
    }
}

/// Cancellation request; `id` is a client order id when `is_client_oid`
#[derive(Debug, Clone, Copy)]
pub struct CancelOrderInput {
    pub id: Uuid,
    pub is_client_oid: bool,
    pub user_id: UserId,
}

pub struct OrderBookService {
    store: Arc<dyn OrderBookStore>,
    events: Arc<dyn EventSink>,
    config: BookConfig,
}

impl OrderBookService {
    pub fn new(store: Arc<dyn OrderBookStore>, events: Arc<dyn EventSink>, config: BookConfig) -> Self {
        Self { store, events, config }
    }

    pub fn store(&self) -> &dyn OrderBookStore {
        self.store.as_ref()
    }

    pub fn config(&self) -> &BookConfig {
        &self.config
    }

    async fn publish_orders(&self, orders: &[Order]) {
        for order in orders {
            events::publish_order(self.events.as_ref(), order).await;
        }
    }
}
