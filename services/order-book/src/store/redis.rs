//! Redis-backed store
//!
//! Layout (see [`crate::keys`]): order hashes, one price zset per side,
//! per-user zsets, client-id strings, JSON swap records, the pending
//! submission list and the tracker sets.
//!
//! Unguarded transactions are sent as one `MULTI/EXEC` pipeline on the
//! shared connection manager. Guarded transactions need `WATCH`, which is
//! connection-scoped, so they run on a dedicated connection: watch the
//! guarded keys, check the guards, then `EXEC`. A nil `EXEC` reply means a
//! watched key moved and the commit is reported as a conflict.
//!
//! Dedicated connections are checked out of a small idle pool, one
//! transaction at a time. A connection goes back only after `EXEC` or
//! `UNWATCH` left it clean; one that failed midway is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{AsyncCommands, Client, Pipeline};
use tracing::debug;
use types::ids::{ClientOrderId, OrderId, SwapId, UserId};
use types::order::Order;
use types::swap::{Swap, SwapTx};

use super::tx::{Tx, TxGuard, TxOp};
use super::{OrderBookStore, TrackerStatus};
use crate::book::{PriceIndex, RedisPriceIndex};
use crate::error::StoreError;
use crate::keys;

/// Idle dedicated connections kept for guarded commits
const WATCH_POOL_SIZE: usize = 8;

#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    conn: ConnectionManager,
    index: RedisPriceIndex,
    watch_pool: Arc<Mutex<Vec<MultiplexedConnection>>>,
}

impl RedisStore {
    /// Connect to `url` and start the shared connection manager
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        debug!(url, "redis store connected");
        Ok(Self {
            index: RedisPriceIndex::new(conn.clone()),
            client,
            conn,
            watch_pool: Arc::new(Mutex::new(Vec::with_capacity(WATCH_POOL_SIZE))),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    fn parse_ids<T, E>(key: &str, members: Vec<String>) -> Result<Vec<T>, StoreError>
    where
        T: std::str::FromStr<Err = E>,
        E: std::fmt::Display,
    {
        members
            .iter()
            .map(|member| {
                member.parse::<T>().map_err(|e| StoreError::InvalidValue {
                    key: key.to_string(),
                    reason: format!("member {member}: {e}"),
                })
            })
            .collect()
    }

    fn decode_order(key: &str, record: HashMap<String, String>) -> Result<Option<Order>, StoreError> {
        if record.is_empty() {
            return Ok(None);
        }
        Order::from_record(&record)
            .map(Some)
            .map_err(|source| StoreError::Record {
                key: key.to_string(),
                source,
            })
    }

    async fn get_json_swap(&self, key: String) -> Result<Option<Swap>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(&key).await?;
        raw.map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .transpose()
    }

    async fn zrange_ids<T, E>(&self, key: String) -> Result<Vec<T>, StoreError>
    where
        T: std::str::FromStr<Err = E>,
        E: std::fmt::Display,
    {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.zrange(&key, 0, -1).await?;
        Self::parse_ids(&key, members)
    }

    /// Queue every staged write on `pipe`
    fn stage(pipe: &mut Pipeline, ops: &[TxOp]) -> Result<(), StoreError> {
        for op in ops {
            match op {
                TxOp::PutOrder(order) => {
                    pipe.hset_multiple(keys::order(&order.id), &order.to_record()).ignore();
                }
                TxOp::DeleteOrder(order_id) => {
                    pipe.del(keys::order(order_id)).ignore();
                }
                TxOp::AddPrice(entry) => RedisPriceIndex::stage_add(pipe, entry)?,
                TxOp::RemovePrice(entry) => RedisPriceIndex::stage_remove(pipe, entry),
                TxOp::PutClientOid {
                    client_order_id,
                    order_id,
                } => {
                    pipe.set(keys::client_oid(client_order_id), order_id.to_string())
                        .ignore();
                }
                TxOp::DeleteClientOid(client_order_id) => {
                    pipe.del(keys::client_oid(client_order_id)).ignore();
                }
                TxOp::AddUserOpenOrder {
                    user_id,
                    order_id,
                    score,
                } => {
                    pipe.zadd(keys::user_open_orders(user_id), order_id.to_string(), *score)
                        .ignore();
                }
                TxOp::RemoveUserOpenOrder { user_id, order_id } => {
                    pipe.zrem(keys::user_open_orders(user_id), order_id.to_string())
                        .ignore();
                }
                TxOp::AddUserFilledOrder {
                    user_id,
                    order_id,
                    score,
                } => {
                    pipe.zadd(keys::user_filled_orders(user_id), order_id.to_string(), *score)
                        .ignore();
                }
                TxOp::PutSwap(swap) => {
                    pipe.set(keys::swap(&swap.id), serde_json::to_string(swap)?)
                        .ignore();
                    if !swap.is_resolved() {
                        pipe.sadd(keys::OPEN_SWAPS, swap.id.to_string()).ignore();
                    }
                }
                TxOp::DeleteSwap(swap_id) => {
                    pipe.del(keys::swap(swap_id)).ignore();
                    pipe.srem(keys::OPEN_SWAPS, swap_id.to_string()).ignore();
                }
                TxOp::AddPendingSwap(pending) => {
                    pipe.rpush(keys::PENDING_SWAP_TXS, serde_json::to_string(pending)?)
                        .ignore();
                }
                TxOp::RemovePendingSwap(pending) => {
                    pipe.lrem(keys::PENDING_SWAP_TXS, 0, serde_json::to_string(pending)?)
                        .ignore();
                }
                TxOp::TrackSwap { status, swap_id } => {
                    pipe.sadd(keys::swap_tracker(status.as_str()), swap_id.to_string())
                        .ignore();
                }
                TxOp::ArchiveSwap { swap, users } => {
                    pipe.set(keys::resolved_swap(&swap.id), serde_json::to_string(swap)?)
                        .ignore();
                    let score = super::tx::arrival_score(&swap.resolved.unwrap_or(swap.created));
                    for user_id in users {
                        pipe.zadd(keys::user_resolved_swaps(user_id), swap.id.to_string(), score)
                            .ignore();
                    }
                }
            }
        }
        Ok(())
    }

    fn guard_key(guard: &TxGuard) -> String {
        match guard {
            TxGuard::OrderVersion { order_id, .. } | TxGuard::OrderAbsent(order_id) => keys::order(order_id),
            TxGuard::ClientOidAbsent(client_oid) => keys::client_oid(client_oid),
            TxGuard::SwapExists(swap_id) | TxGuard::SwapNotStarted(swap_id) => keys::swap(swap_id),
        }
    }

    async fn check_guard(conn: &mut MultiplexedConnection, guard: &TxGuard) -> Result<bool, StoreError> {
        let key = Self::guard_key(guard);
        let ok = match guard {
            TxGuard::OrderVersion { version, .. } => {
                let stored: Option<u64> = conn.hget(&key, "version").await?;
                stored == Some(*version)
            }
            TxGuard::OrderAbsent(_) | TxGuard::ClientOidAbsent(_) => {
                let exists: bool = conn.exists(&key).await?;
                !exists
            }
            TxGuard::SwapExists(_) => conn.exists(&key).await?,
            TxGuard::SwapNotStarted(_) => {
                let raw: Option<String> = conn.get(&key).await?;
                match raw {
                    Some(json) => !serde_json::from_str::<Swap>(&json)?.is_started(),
                    None => false,
                }
            }
        };
        Ok(ok)
    }

    async fn checkout(&self) -> Result<MultiplexedConnection, StoreError> {
        let idle = self.watch_pool.lock().pop();
        match idle {
            Some(conn) => Ok(conn),
            None => Ok(self.client.get_multiplexed_async_connection().await?),
        }
    }

    fn checkin(&self, conn: MultiplexedConnection) {
        let mut idle = self.watch_pool.lock();
        if idle.len() < WATCH_POOL_SIZE {
            idle.push(conn);
        }
    }

    /// Connections currently idle in the watch pool
    pub fn idle_watch_connections(&self) -> usize {
        self.watch_pool.lock().len()
    }

    async fn commit_guarded(&self, ops: &[TxOp], guards: &[TxGuard]) -> Result<(), StoreError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        Self::stage(&mut pipe, ops)?;

        let mut conn = self.checkout().await?;
        let outcome = Self::watch_and_exec(&mut conn, &pipe, guards).await;
        match &outcome {
            Ok(()) | Err(StoreError::Conflict(_)) => self.checkin(conn),
            Err(e) => debug!(error = %e, "dropping watch connection after failed commit"),
        }
        outcome
    }

    async fn watch_and_exec(
        conn: &mut MultiplexedConnection,
        pipe: &Pipeline,
        guards: &[TxGuard],
    ) -> Result<(), StoreError> {
        let watched: Vec<String> = guards.iter().map(Self::guard_key).collect();
        let _: () = redis::cmd("WATCH").arg(&watched).query_async(conn).await?;

        for guard in guards {
            if !Self::check_guard(conn, guard).await? {
                let _: () = redis::cmd("UNWATCH").query_async(conn).await?;
                return Err(StoreError::Conflict(format!("{guard:?} failed")));
            }
        }

        let applied: Option<()> = pipe.query_async(conn).await?;
        applied.ok_or_else(|| StoreError::Conflict("watched key changed before commit".to_string()))
    }
}

#[async_trait]
impl OrderBookStore for RedisStore {
    fn price_index(&self) -> &dyn PriceIndex {
        &self.index
    }

    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        let key = keys::order(id);
        let mut conn = self.conn.clone();
        let record: HashMap<String, String> = conn.hgetall(&key).await?;
        Self::decode_order(&key, record)
    }

    async fn find_order_by_client_oid(&self, id: &ClientOrderId) -> Result<Option<Order>, StoreError> {
        let key = keys::client_oid(id);
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(&key).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let order_id: OrderId = raw.parse().map_err(|e: uuid::Error| StoreError::InvalidValue {
            key,
            reason: e.to_string(),
        })?;
        self.find_order(&order_id).await
    }

    async fn find_orders(&self, ids: &[OrderId]) -> Result<Vec<Option<Order>>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let order_keys: Vec<String> = ids.iter().map(keys::order).collect();
        let mut pipe = redis::pipe();
        for key in &order_keys {
            pipe.hgetall(key);
        }
        let mut conn = self.conn.clone();
        let records: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;
        order_keys
            .iter()
            .zip(records)
            .map(|(key, record)| Self::decode_order(key, record))
            .collect()
    }

    async fn user_open_orders(&self, user_id: &UserId) -> Result<Vec<OrderId>, StoreError> {
        self.zrange_ids(keys::user_open_orders(user_id)).await
    }

    async fn user_filled_orders(&self, user_id: &UserId) -> Result<Vec<OrderId>, StoreError> {
        self.zrange_ids(keys::user_filled_orders(user_id)).await
    }

    async fn get_swap(&self, id: &SwapId) -> Result<Option<Swap>, StoreError> {
        self.get_json_swap(keys::swap(id)).await
    }

    async fn open_swaps(&self) -> Result<Vec<SwapId>, StoreError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(keys::OPEN_SWAPS).await?;
        let mut ids: Vec<SwapId> = Self::parse_ids(keys::OPEN_SWAPS, members)?;
        ids.sort();
        Ok(ids)
    }

    async fn pending_swaps(&self) -> Result<Vec<SwapTx>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(keys::PENDING_SWAP_TXS, 0, -1).await?;
        raw.iter()
            .map(|json| serde_json::from_str(json).map_err(StoreError::from))
            .collect()
    }

    async fn resolved_swap(&self, id: &SwapId) -> Result<Option<Swap>, StoreError> {
        self.get_json_swap(keys::resolved_swap(id)).await
    }

    async fn user_resolved_swaps(&self, user_id: &UserId) -> Result<Vec<SwapId>, StoreError> {
        self.zrange_ids(keys::user_resolved_swaps(user_id)).await
    }

    async fn track_swap(&self, status: TrackerStatus, id: &SwapId) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let added: i64 = conn
            .sadd(keys::swap_tracker(status.as_str()), id.to_string())
            .await?;
        Ok(added > 0)
    }

    async fn is_swap_tracked(&self, status: TrackerStatus, id: &SwapId) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn
            .sismember(keys::swap_tracker(status.as_str()), id.to_string())
            .await?)
    }

    async fn untrack_swap(&self, status: TrackerStatus, id: &SwapId) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .srem(keys::swap_tracker(status.as_str()), id.to_string())
            .await?;
        Ok(())
    }

    async fn commit(&self, tx: Tx) -> Result<(), StoreError> {
        let (ops, guards) = tx.into_parts();
        if ops.is_empty() {
            return Ok(());
        }

        if guards.is_empty() {
            let mut pipe = redis::pipe();
            pipe.atomic();
            Self::stage(&mut pipe, &ops)?;
            let mut conn = self.conn.clone();
            let _: () = pipe.query_async(&mut conn).await?;
        } else {
            self.commit_guarded(&ops, &guards).await?;
        }
        debug!(ops = ops.len(), guards = guards.len(), "transaction committed");
        Ok(())
    }
}
