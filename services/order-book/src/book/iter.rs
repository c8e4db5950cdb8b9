//! Lazy best-first walk over a price index snapshot
//!
//! The id list is fixed when the walk starts; each id is resolved to its
//! current order only when the walk reaches it. An order that left the
//! book in between is skipped.

use tracing::debug;
use types::ids::{OrderId, Symbol};
use types::order::{Order, Side};

use crate::error::StoreError;
use crate::store::OrderBookStore;

pub struct OrderIter<'a> {
    store: &'a dyn OrderBookStore,
    ids: std::vec::IntoIter<OrderId>,
}

impl<'a> OrderIter<'a> {
    pub fn new(store: &'a dyn OrderBookStore, ids: Vec<OrderId>) -> Self {
        Self {
            store,
            ids: ids.into_iter(),
        }
    }

    /// Resting sell orders, lowest price first
    pub async fn min_ask(store: &'a dyn OrderBookStore, symbol: &Symbol) -> Result<Self, StoreError> {
        let ids = store.price_index().get_min_ask(symbol).await?;
        Ok(Self::new(store, ids))
    }

    /// Resting buy orders, highest price first
    pub async fn max_bid(store: &'a dyn OrderBookStore, symbol: &Symbol) -> Result<Self, StoreError> {
        let ids = store.price_index().get_max_bid(symbol).await?;
        Ok(Self::new(store, ids))
    }

    /// Resting orders on `side`, best price first
    pub async fn resting(store: &'a dyn OrderBookStore, symbol: &Symbol, side: Side) -> Result<Self, StoreError> {
        match side {
            Side::SELL => Self::min_ask(store, symbol).await,
            Side::BUY => Self::max_bid(store, symbol).await,
        }
    }

    /// Next order still present in the store
    pub async fn next(&mut self) -> Result<Option<Order>, StoreError> {
        for id in self.ids.by_ref() {
            match self.store.find_order(&id).await? {
                Some(order) => return Ok(Some(order)),
                None => debug!(order_id = %id, "order left the book after snapshot, skipping"),
            }
        }
        Ok(None)
    }

    /// Ids not yet visited
    pub fn remaining(&self) -> usize {
        self.ids.len()
    }
}
