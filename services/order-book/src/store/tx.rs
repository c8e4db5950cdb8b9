//! Staged multi-key transactions
//!
//! A [`Tx`] collects writes and guards without touching the store. Nothing
//! is visible to anyone until [`OrderBookStore::commit`] applies the whole
//! batch atomically; dropping an uncommitted `Tx` discards it. Because
//! staging never reads, an action cannot observe its own writes.
//!
//! Guards are the optimistic half of the contract: every update or removal
//! of an order record pins the version the caller read, and the commit
//! fails with [`StoreError::Conflict`] if any pinned record moved in the
//! meantime.
//!
//! [`OrderBookStore::commit`]: super::OrderBookStore::commit

use chrono::{DateTime, Utc};
use tracing::debug;
use types::ids::{ClientOrderId, OrderId, SwapId, UserId};
use types::order::Order;
use types::swap::{Swap, SwapTx};

use super::TrackerStatus;
use crate::book::PriceEntry;
use crate::error::StoreError;

/// Direction of an index modification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOp {
    Add,
    Update,
    Remove,
}

/// One staged write
#[derive(Debug, Clone, PartialEq)]
pub enum TxOp {
    PutOrder(Order),
    DeleteOrder(OrderId),
    AddPrice(PriceEntry),
    RemovePrice(PriceEntry),
    PutClientOid {
        client_order_id: ClientOrderId,
        order_id: OrderId,
    },
    DeleteClientOid(ClientOrderId),
    AddUserOpenOrder {
        user_id: UserId,
        order_id: OrderId,
        score: i64,
    },
    RemoveUserOpenOrder {
        user_id: UserId,
        order_id: OrderId,
    },
    AddUserFilledOrder {
        user_id: UserId,
        order_id: OrderId,
        score: i64,
    },
    PutSwap(Swap),
    DeleteSwap(SwapId),
    AddPendingSwap(SwapTx),
    RemovePendingSwap(SwapTx),
    ArchiveSwap {
        swap: Swap,
        users: Vec<UserId>,
    },
    TrackSwap {
        status: TrackerStatus,
        swap_id: SwapId,
    },
}

/// Precondition checked atomically with the commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxGuard {
    OrderVersion { order_id: OrderId, version: u64 },
    OrderAbsent(OrderId),
    ClientOidAbsent(ClientOrderId),
    SwapExists(SwapId),
    SwapNotStarted(SwapId),
}

/// Score used by per-user sorted indices
pub(crate) fn arrival_score(timestamp: &DateTime<Utc>) -> i64 {
    timestamp.timestamp_micros()
}

/// Transaction staging handle
#[derive(Debug, Default)]
pub struct Tx {
    ops: Vec<TxOp>,
    guards: Vec<TxGuard>,
    finished: bool,
}

impl Tx {
    pub fn begin() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[TxOp] {
        &self.ops
    }

    pub fn guards(&self) -> &[TxGuard] {
        &self.guards
    }

    /// Hand the staged batch to a store for commit
    pub(crate) fn into_parts(mut self) -> (Vec<TxOp>, Vec<TxGuard>) {
        self.finished = true;
        (std::mem::take(&mut self.ops), std::mem::take(&mut self.guards))
    }

    // ── Building blocks ─────────────────────────────────────────────

    /// Add, update or remove the order-id record.
    ///
    /// `Update` advances `order.version` to the value being stored, so the
    /// caller's copy matches the record once the commit succeeds.
    pub fn modify_order(&mut self, op: IndexOp, order: &mut Order) -> Result<(), StoreError> {
        match op {
            IndexOp::Add => {
                self.guards.push(TxGuard::OrderAbsent(order.id));
                self.ops.push(TxOp::PutOrder(order.clone()));
            }
            IndexOp::Update => {
                self.guards.push(TxGuard::OrderVersion {
                    order_id: order.id,
                    version: order.version,
                });
                order.version += 1;
                self.ops.push(TxOp::PutOrder(order.clone()));
            }
            IndexOp::Remove => {
                self.guards.push(TxGuard::OrderVersion {
                    order_id: order.id,
                    version: order.version,
                });
                self.ops.push(TxOp::DeleteOrder(order.id));
            }
        }
        Ok(())
    }

    /// Add or remove the order in its side's price-sorted index
    pub fn modify_prices(&mut self, op: IndexOp, order: &Order) -> Result<(), StoreError> {
        let entry = PriceEntry::from(order);
        match op {
            IndexOp::Add => self.ops.push(TxOp::AddPrice(entry)),
            IndexOp::Remove => self.ops.push(TxOp::RemovePrice(entry)),
            IndexOp::Update => return Err(unsupported("update", "prices")),
        }
        Ok(())
    }

    /// Add or remove the client order id mapping
    pub fn modify_client_oid(&mut self, op: IndexOp, order: &Order) -> Result<(), StoreError> {
        match op {
            IndexOp::Add => {
                self.guards.push(TxGuard::ClientOidAbsent(order.client_order_id));
                self.ops.push(TxOp::PutClientOid {
                    client_order_id: order.client_order_id,
                    order_id: order.id,
                });
            }
            IndexOp::Remove => self.ops.push(TxOp::DeleteClientOid(order.client_order_id)),
            IndexOp::Update => return Err(unsupported("update", "client order id")),
        }
        Ok(())
    }

    /// Add or remove the order in its owner's open-orders index
    pub fn modify_user_open_orders(&mut self, op: IndexOp, order: &Order) -> Result<(), StoreError> {
        match op {
            IndexOp::Add => self.ops.push(TxOp::AddUserOpenOrder {
                user_id: order.user_id,
                order_id: order.id,
                score: arrival_score(&order.timestamp),
            }),
            IndexOp::Remove => self.ops.push(TxOp::RemoveUserOpenOrder {
                user_id: order.user_id,
                order_id: order.id,
            }),
            IndexOp::Update => return Err(unsupported("update", "user open orders")),
        }
        Ok(())
    }

    /// Record the order in its owner's filled-orders history
    pub fn modify_user_filled_orders(&mut self, op: IndexOp, order: &Order) -> Result<(), StoreError> {
        match op {
            IndexOp::Add => self.ops.push(TxOp::AddUserFilledOrder {
                user_id: order.user_id,
                order_id: order.id,
                score: arrival_score(&order.timestamp),
            }),
            _ => return Err(unsupported("update/remove", "user filled orders")),
        }
        Ok(())
    }

    // ── Composites ─────────────────────────────────────────────────

    /// A new order starts resting: record, price, client id and user indices
    pub fn store_open_order(&mut self, order: &mut Order) -> Result<(), StoreError> {
        self.modify_order(IndexOp::Add, order)?;
        self.modify_prices(IndexOp::Add, order)?;
        self.modify_client_oid(IndexOp::Add, order)?;
        self.modify_user_open_orders(IndexOp::Add, order)
    }

    /// Erase every trace of an order that never filled
    pub fn remove_order(&mut self, order: &mut Order) -> Result<(), StoreError> {
        self.modify_client_oid(IndexOp::Remove, order)?;
        self.modify_user_open_orders(IndexOp::Remove, order)?;
        self.modify_prices(IndexOp::Remove, order)?;
        self.modify_order(IndexOp::Remove, order)
    }

    /// Take a filled (or partially filled then cancelled) order off the
    /// book while keeping its record for audit
    pub fn close_order(&mut self, order: &mut Order) -> Result<(), StoreError> {
        self.modify_prices(IndexOp::Remove, order)?;
        self.modify_user_open_orders(IndexOp::Remove, order)?;
        self.modify_user_filled_orders(IndexOp::Add, order)?;
        self.modify_order(IndexOp::Update, order)
    }

    // ── Swaps ──────────────────────────────────────────────────────

    /// Create or overwrite an open swap record
    pub fn store_swap(&mut self, swap: &Swap) {
        self.ops.push(TxOp::PutSwap(swap.clone()));
    }

    pub fn remove_swap(&mut self, swap_id: SwapId) {
        self.ops.push(TxOp::DeleteSwap(swap_id));
    }

    pub fn add_pending_swap(&mut self, pending: &SwapTx) {
        self.ops.push(TxOp::AddPendingSwap(pending.clone()));
    }

    pub fn remove_pending_swap(&mut self, pending: &SwapTx) {
        self.ops.push(TxOp::RemovePendingSwap(pending.clone()));
    }

    /// Keep a resolved swap for audit and link it to the users it touched
    pub fn archive_resolved_swap(&mut self, swap: &Swap, users: Vec<UserId>) {
        self.ops.push(TxOp::ArchiveSwap {
            swap: swap.clone(),
            users,
        });
    }

    /// Record that `swap_id` went through `status`; lands with the transition itself
    pub fn track_swap(&mut self, status: TrackerStatus, swap_id: SwapId) {
        self.ops.push(TxOp::TrackSwap { status, swap_id });
    }

    pub fn guard_swap_exists(&mut self, swap_id: SwapId) {
        self.guards.push(TxGuard::SwapExists(swap_id));
    }

    pub fn guard_swap_not_started(&mut self, swap_id: SwapId) {
        self.guards.push(TxGuard::SwapNotStarted(swap_id));
    }
}

impl Drop for Tx {
    fn drop(&mut self) {
        if !self.finished && !self.ops.is_empty() {
            debug!(staged_ops = self.ops.len(), "discarding uncommitted transaction");
        }
    }
}

fn unsupported(op: &str, index: &str) -> StoreError {
    StoreError::Unsupported(format!("{op} on {index} index"))
}
