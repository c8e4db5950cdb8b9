//! Order book repository
//!
//! [`OrderBookStore`] is the only writer of persisted order and swap
//! state. Reads go straight to the store; every write is staged on a
//! [`Tx`] and applied by [`OrderBookStore::commit`] as one atomic step.
//!
//! Two variants exist: [`MemoryStore`] for single-node deployments and
//! tests, [`RedisStore`] for deployments sharing one Redis.

pub mod memory;
pub mod redis;
pub mod tx;

use std::fmt;

use async_trait::async_trait;
use types::ids::{ClientOrderId, OrderId, SwapId, UserId};
use types::order::Order;
use types::swap::{Swap, SwapTx};

use crate::book::PriceIndex;
use crate::error::{BookError, StoreError};

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;
pub use self::tx::{IndexOp, Tx, TxGuard, TxOp};

/// Idempotency sets for swap transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerStatus {
    Started,
    Resolved,
    Aborted,
}

impl TrackerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerStatus::Started => "started",
            TrackerStatus::Resolved => "resolved",
            TrackerStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for TrackerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait OrderBookStore: Send + Sync {
    fn price_index(&self) -> &dyn PriceIndex;

    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError>;

    async fn find_order_by_client_oid(&self, id: &ClientOrderId) -> Result<Option<Order>, StoreError>;

    /// Look up several orders, index-aligned with `ids`
    async fn find_orders(&self, ids: &[OrderId]) -> Result<Vec<Option<Order>>, StoreError> {
        let mut orders = Vec::with_capacity(ids.len());
        for id in ids {
            orders.push(self.find_order(id).await?);
        }
        Ok(orders)
    }

    /// A user's resting orders, oldest first
    async fn user_open_orders(&self, user_id: &UserId) -> Result<Vec<OrderId>, StoreError>;

    /// A user's filled (or cancelled after a partial fill) orders, oldest first
    async fn user_filled_orders(&self, user_id: &UserId) -> Result<Vec<OrderId>, StoreError>;

    async fn get_swap(&self, id: &SwapId) -> Result<Option<Swap>, StoreError>;

    /// Swaps that exist and are neither resolved nor aborted
    async fn open_swaps(&self) -> Result<Vec<SwapId>, StoreError>;

    /// Outstanding on-chain submissions, oldest first
    async fn pending_swaps(&self) -> Result<Vec<SwapTx>, StoreError>;

    async fn resolved_swap(&self, id: &SwapId) -> Result<Option<Swap>, StoreError>;

    async fn user_resolved_swaps(&self, user_id: &UserId) -> Result<Vec<SwapId>, StoreError>;

    /// Add `id` to the tracker set; false if it was already there.
    ///
    /// Service transitions record their status through [`Tx::track_swap`]
    /// so the entry lands with the transition; this is the standalone form.
    async fn track_swap(&self, status: TrackerStatus, id: &SwapId) -> Result<bool, StoreError>;

    async fn is_swap_tracked(&self, status: TrackerStatus, id: &SwapId) -> Result<bool, StoreError>;

    async fn untrack_swap(&self, status: TrackerStatus, id: &SwapId) -> Result<(), StoreError>;

    /// Apply every staged write of `tx` or none of them
    async fn commit(&self, tx: Tx) -> Result<(), StoreError>;
}

/// Stage writes with `action` and commit them in one step.
///
/// If `action` fails nothing is committed and the staged writes are
/// discarded with the handle.
pub async fn perform_tx<T, F>(store: &dyn OrderBookStore, action: F) -> Result<T, BookError>
where
    F: FnOnce(&mut Tx) -> Result<T, BookError>,
{
    let mut tx = Tx::begin();
    let value = action(&mut tx)?;
    store.commit(tx).await?;
    Ok(value)
}
