//! In-process store
//!
//! All records sit behind one mutex. A commit validates every guard and
//! applies every write while holding it, together with the write locks of
//! the symbols whose price index it touches (record lock first, then
//! symbols), so no reader sees half a transaction.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};
use types::ids::{ClientOrderId, OrderId, SwapId, UserId};
use types::order::Order;
use types::swap::{Swap, SwapTx};

use super::tx::{arrival_score, IndexOp, Tx, TxGuard, TxOp};
use super::{OrderBookStore, TrackerStatus};
use crate::book::{MemoryPriceIndex, PriceEntry, PriceIndex};
use crate::error::StoreError;

/// Sorted-set stand-in: (score, member), ascending
type ScoredSet<T> = BTreeSet<(i64, T)>;

fn zadd<T: Ord + Copy>(set: &mut ScoredSet<T>, score: i64, member: T) {
    set.retain(|(_, existing)| *existing != member);
    set.insert((score, member));
}

#[derive(Debug, Default)]
struct Records {
    orders: HashMap<OrderId, Order>,
    client_oids: HashMap<ClientOrderId, OrderId>,
    user_open: HashMap<UserId, ScoredSet<OrderId>>,
    user_filled: HashMap<UserId, ScoredSet<OrderId>>,
    swaps: HashMap<SwapId, Swap>,
    open_swaps: BTreeSet<SwapId>,
    pending: Vec<SwapTx>,
    resolved: HashMap<SwapId, Swap>,
    user_resolved: HashMap<UserId, ScoredSet<SwapId>>,
    trackers: HashMap<TrackerStatus, HashSet<SwapId>>,
}

impl Records {
    fn check(&self, guard: &TxGuard) -> Result<(), StoreError> {
        let ok = match guard {
            TxGuard::OrderVersion { order_id, version } => {
                self.orders.get(order_id).map(|order| order.version) == Some(*version)
            }
            TxGuard::OrderAbsent(order_id) => !self.orders.contains_key(order_id),
            TxGuard::ClientOidAbsent(client_oid) => !self.client_oids.contains_key(client_oid),
            TxGuard::SwapExists(swap_id) => self.swaps.contains_key(swap_id),
            TxGuard::SwapNotStarted(swap_id) => self
                .swaps
                .get(swap_id)
                .map(|swap| !swap.is_started())
                .unwrap_or(false),
        };
        if ok {
            Ok(())
        } else {
            Err(StoreError::Conflict(format!("{guard:?} failed")))
        }
    }

    fn apply(&mut self, op: TxOp) {
        match op {
            TxOp::PutOrder(order) => {
                self.orders.insert(order.id, order);
            }
            TxOp::DeleteOrder(order_id) => {
                self.orders.remove(&order_id);
            }
            // price changes land in the index
            TxOp::AddPrice(_) | TxOp::RemovePrice(_) => {}
            TxOp::PutClientOid {
                client_order_id,
                order_id,
            } => {
                self.client_oids.insert(client_order_id, order_id);
            }
            TxOp::DeleteClientOid(client_order_id) => {
                self.client_oids.remove(&client_order_id);
            }
            TxOp::AddUserOpenOrder {
                user_id,
                order_id,
                score,
            } => zadd(self.user_open.entry(user_id).or_default(), score, order_id),
            TxOp::RemoveUserOpenOrder { user_id, order_id } => {
                if let Some(set) = self.user_open.get_mut(&user_id) {
                    set.retain(|(_, id)| *id != order_id);
                }
            }
            TxOp::AddUserFilledOrder {
                user_id,
                order_id,
                score,
            } => zadd(self.user_filled.entry(user_id).or_default(), score, order_id),
            TxOp::PutSwap(swap) => {
                if !swap.is_resolved() {
                    self.open_swaps.insert(swap.id);
                }
                self.swaps.insert(swap.id, swap);
            }
            TxOp::DeleteSwap(swap_id) => {
                self.swaps.remove(&swap_id);
                self.open_swaps.remove(&swap_id);
            }
            TxOp::AddPendingSwap(pending) => self.pending.push(pending),
            TxOp::RemovePendingSwap(pending) => self.pending.retain(|p| *p != pending),
            TxOp::TrackSwap { status, swap_id } => {
                self.trackers.entry(status).or_default().insert(swap_id);
            }
            TxOp::ArchiveSwap { swap, users } => {
                let score = arrival_score(&swap.resolved.unwrap_or(swap.created));
                for user_id in users {
                    zadd(self.user_resolved.entry(user_id).or_default(), score, swap.id);
                }
                self.resolved.insert(swap.id, swap);
            }
        }
    }
}

fn members<T: Copy>(set: Option<&ScoredSet<T>>) -> Vec<T> {
    set.map(|set| set.iter().map(|(_, member)| *member).collect())
        .unwrap_or_default()
}

/// Store keeping every record in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    index: MemoryPriceIndex,
    records: Mutex<Records>,
    fail_next_commit: AtomicBool,
    commit_delay: Mutex<Option<Duration>>,
    commits: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The concrete in-process index
    pub fn index(&self) -> &MemoryPriceIndex {
        &self.index
    }

    /// Make the next commit fail before any write lands
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Sleep this long at the start of every commit
    pub fn set_commit_delay(&self, delay: Option<Duration>) {
        *self.commit_delay.lock() = delay;
    }

    /// Number of successful commits
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Whether the swap id is in the tracker set
    pub fn is_tracked(&self, status: TrackerStatus, id: &SwapId) -> bool {
        self.records
            .lock()
            .trackers
            .get(&status)
            .map(|set| set.contains(id))
            .unwrap_or(false)
    }
}

#[async_trait]
impl OrderBookStore for MemoryStore {
    fn price_index(&self) -> &dyn PriceIndex {
        &self.index
    }

    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.records.lock().orders.get(id).cloned())
    }

    async fn find_order_by_client_oid(&self, id: &ClientOrderId) -> Result<Option<Order>, StoreError> {
        let records = self.records.lock();
        Ok(records
            .client_oids
            .get(id)
            .and_then(|order_id| records.orders.get(order_id))
            .cloned())
    }

    async fn find_orders(&self, ids: &[OrderId]) -> Result<Vec<Option<Order>>, StoreError> {
        let records = self.records.lock();
        Ok(ids.iter().map(|id| records.orders.get(id).cloned()).collect())
    }

    async fn user_open_orders(&self, user_id: &UserId) -> Result<Vec<OrderId>, StoreError> {
        Ok(members(self.records.lock().user_open.get(user_id)))
    }

    async fn user_filled_orders(&self, user_id: &UserId) -> Result<Vec<OrderId>, StoreError> {
        Ok(members(self.records.lock().user_filled.get(user_id)))
    }

    async fn get_swap(&self, id: &SwapId) -> Result<Option<Swap>, StoreError> {
        Ok(self.records.lock().swaps.get(id).cloned())
    }

    async fn open_swaps(&self) -> Result<Vec<SwapId>, StoreError> {
        Ok(self.records.lock().open_swaps.iter().copied().collect())
    }

    async fn pending_swaps(&self) -> Result<Vec<SwapTx>, StoreError> {
        Ok(self.records.lock().pending.clone())
    }

    async fn resolved_swap(&self, id: &SwapId) -> Result<Option<Swap>, StoreError> {
        Ok(self.records.lock().resolved.get(id).cloned())
    }

    async fn user_resolved_swaps(&self, user_id: &UserId) -> Result<Vec<SwapId>, StoreError> {
        Ok(members(self.records.lock().user_resolved.get(user_id)))
    }

    async fn track_swap(&self, status: TrackerStatus, id: &SwapId) -> Result<bool, StoreError> {
        Ok(self.records.lock().trackers.entry(status).or_default().insert(*id))
    }

    async fn is_swap_tracked(&self, status: TrackerStatus, id: &SwapId) -> Result<bool, StoreError> {
        Ok(self.is_tracked(status, id))
    }

    async fn untrack_swap(&self, status: TrackerStatus, id: &SwapId) -> Result<(), StoreError> {
        if let Some(set) = self.records.lock().trackers.get_mut(&status) {
            set.remove(id);
        }
        Ok(())
    }

    async fn commit(&self, tx: Tx) -> Result<(), StoreError> {
        let (ops, guards) = tx.into_parts();

        let delay = *self.commit_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            warn!(staged_ops = ops.len(), "injected commit failure");
            return Err(StoreError::CommitFailed("injected failure".to_string()));
        }

        let mut records = self.records.lock();
        for guard in &guards {
            records.check(guard)?;
        }

        let price_changes: Vec<(IndexOp, &PriceEntry)> = ops
            .iter()
            .filter_map(|op| match op {
                TxOp::AddPrice(entry) => Some((IndexOp::Add, entry)),
                TxOp::RemovePrice(entry) => Some((IndexOp::Remove, entry)),
                _ => None,
            })
            .collect();
        let op_count = ops.len();

        self.index.apply_batch_then(&price_changes, || {
            for op in ops.iter().cloned() {
                records.apply(op);
            }
        });
        drop(records);

        self.commits.fetch_add(1, Ordering::SeqCst);
        debug!(ops = op_count, guards = guards.len(), "transaction committed");
        Ok(())
    }
}
