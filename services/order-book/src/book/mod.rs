//! Price index infrastructure
//!
//! Contains the FIFO price levels, the per-side book, and the two price
//! index variants (in-process and Redis-backed) behind one trait. Callers
//! walk an index through [`OrderIter`].

pub mod iter;
pub mod memory;
pub mod price_level;
pub mod redis;
pub mod side_book;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use types::ids::{OrderId, Symbol};
use types::numeric::Price;
use types::order::{Order, Side};

use crate::error::StoreError;

pub use self::iter::OrderIter;
pub use self::memory::MemoryPriceIndex;
pub use self::price_level::PriceLevel;
pub use self::redis::RedisPriceIndex;
pub use self::side_book::SideBook;

/// Position of one resting order in the price index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub symbol: Symbol,
    /// Side of the resting order (BUY rests on bids, SELL on asks)
    pub side: Side,
    pub order_id: OrderId,
    pub price: Price,
}

impl From<&Order> for PriceEntry {
    fn from(order: &Order) -> Self {
        Self {
            symbol: order.symbol.clone(),
            side: order.side,
            order_id: order.id,
            price: order.price,
        }
    }
}

/// Price-time ordered index of resting order ids
///
/// Snapshots are point-in-time lists of ids, best price first and FIFO
/// within a price. Ids are resolved lazily by [`OrderIter`].
#[async_trait]
pub trait PriceIndex: Send + Sync {
    async fn add(&self, entry: &PriceEntry) -> Result<(), StoreError>;

    /// Returns whether the entry was resting
    async fn remove(&self, entry: &PriceEntry) -> Result<bool, StoreError>;

    async fn snapshot(
        &self,
        symbol: &Symbol,
        side: Side,
        limit: Option<usize>,
    ) -> Result<Vec<OrderId>, StoreError>;

    /// Asks, lowest price first
    async fn get_min_ask(&self, symbol: &Symbol) -> Result<Vec<OrderId>, StoreError> {
        self.snapshot(symbol, Side::SELL, None).await
    }

    /// Bids, highest price first
    async fn get_max_bid(&self, symbol: &Symbol) -> Result<Vec<OrderId>, StoreError> {
        self.snapshot(symbol, Side::BUY, None).await
    }
}
