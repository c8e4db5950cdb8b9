//! Shared fixtures for the order book integration tests
#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use order_book::book::PriceEntry;
use order_book::events::{BroadcastEventSink, EventSink};
use order_book::{BookConfig, MemoryStore, OrderBookService, OrderBookStore, PlaceOrderInput};
use rust_decimal::Decimal;
use types::ids::{ClientOrderId, Symbol, UserId};
use types::order::{Order, Side};

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub events: Arc<BroadcastEventSink>,
    pub service: Arc<OrderBookService>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::over(Arc::clone(&store) as Arc<dyn OrderBookStore>, store)
    }

    /// Service talks to `backend`, which must be layered over `store`;
    /// assertions read `store` directly
    pub fn over(backend: Arc<dyn OrderBookStore>, store: Arc<MemoryStore>) -> Self {
        let events = Arc::new(BroadcastEventSink::default());
        let config = BookConfig {
            symbols: vec![symbol()],
            ..BookConfig::default()
        };
        let service = Arc::new(OrderBookService::new(
            backend,
            Arc::clone(&events) as Arc<dyn EventSink>,
            config,
        ));
        Self { store, events, service }
    }

    pub async fn place(&self, user_id: UserId, side: Side, price: &str, size: &str) -> Order {
        self.service
            .place_order(PlaceOrderInput {
                user_id,
                client_order_id: ClientOrderId::new(),
                symbol: symbol(),
                side,
                price: d(price),
                size: d(size),
            })
            .await
            .unwrap()
    }

    /// Asks at 1000x1, 1001x2 and 1002x3, each from its own maker
    pub async fn seed_asks(&self) -> Vec<Order> {
        let mut orders = Vec::new();
        for (price, size) in [("1000", "1"), ("1001", "2"), ("1002", "3")] {
            orders.push(self.place(UserId::new(), Side::SELL, price, size).await);
        }
        orders
    }

    pub async fn order(&self, order: &Order) -> Option<Order> {
        self.store.find_order(&order.id).await.unwrap()
    }

    /// Whether the order is in the price index, the id record and the
    /// owner's open list; returns the three answers in that order
    pub async fn indexed(&self, order: &Order) -> (bool, bool, bool) {
        let in_prices = self.store.index().contains(&PriceEntry::from(order));
        let has_record = self.order(order).await.is_some();
        let in_user_open = self
            .store
            .user_open_orders(&order.user_id)
            .await
            .unwrap()
            .contains(&order.id);
        (in_prices, has_record, in_user_open)
    }
}

pub fn symbol() -> Symbol {
    Symbol::try_new("ETH-USDC").unwrap()
}

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}
