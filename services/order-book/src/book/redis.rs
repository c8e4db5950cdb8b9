//! Redis-backed price index
//!
//! One sorted set per (symbol, side). Asks are scored by price and bids by
//! the negated price, so an ascending `ZRANGE` is best-first on both sides.
//! Members are v7 order ids; Redis orders equal scores by member bytes,
//! which for v7 ids is the order in which the ids were generated.
//!
//! Two limits follow from this layout:
//! - Scores are `f64`, exact to about 15 significant digits. Prices that
//!   differ only beyond that share a score and fall back to id order, and
//!   very large magnitudes can sort out of price order.
//! - An id is generated when the order is built, not when it is inserted.
//!   Ids minted in the same millisecond by different processes compare by
//!   their random bits, so same-price FIFO is only millisecond-exact across
//!   writers.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Pipeline};
use rust_decimal::prelude::ToPrimitive;
use types::ids::{OrderId, Symbol};
use types::numeric::Price;
use types::order::Side;

use super::{PriceEntry, PriceIndex};
use crate::error::StoreError;
use crate::keys;

/// Sorted-set score for a resting order
pub fn score(side: Side, price: Price) -> Result<f64, StoreError> {
    let value = price.to_f64().ok_or_else(|| StoreError::InvalidValue {
        key: format!("price {price}"),
        reason: "not representable as a score".to_string(),
    })?;
    Ok(match side {
        Side::SELL => value,
        Side::BUY => -value,
    })
}

#[derive(Clone)]
pub struct RedisPriceIndex {
    conn: ConnectionManager,
}

impl RedisPriceIndex {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Queue a ZADD for `entry` on a caller-owned pipeline
    pub fn stage_add(pipe: &mut Pipeline, entry: &PriceEntry) -> Result<(), StoreError> {
        pipe.zadd(
            keys::prices(&entry.symbol, entry.side),
            entry.order_id.to_string(),
            score(entry.side, entry.price)?,
        )
        .ignore();
        Ok(())
    }

    /// Queue a ZREM for `entry` on a caller-owned pipeline
    pub fn stage_remove(pipe: &mut Pipeline, entry: &PriceEntry) {
        pipe.zrem(keys::prices(&entry.symbol, entry.side), entry.order_id.to_string())
            .ignore();
    }
}

#[async_trait]
impl PriceIndex for RedisPriceIndex {
    async fn add(&self, entry: &PriceEntry) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .zadd(
                keys::prices(&entry.symbol, entry.side),
                entry.order_id.to_string(),
                score(entry.side, entry.price)?,
            )
            .await?;
        Ok(())
    }

    async fn remove(&self, entry: &PriceEntry) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .zrem(keys::prices(&entry.symbol, entry.side), entry.order_id.to_string())
            .await?;
        Ok(removed > 0)
    }

    async fn snapshot(
        &self,
        symbol: &Symbol,
        side: Side,
        limit: Option<usize>,
    ) -> Result<Vec<OrderId>, StoreError> {
        if limit == Some(0) {
            return Ok(Vec::new());
        }
        let stop = limit.map(|n| n as isize - 1).unwrap_or(-1);
        let key = keys::prices(symbol, side);

        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.zrange(&key, 0, stop).await?;
        members
            .iter()
            .map(|member| {
                member.parse::<OrderId>().map_err(|e| StoreError::InvalidValue {
                    key: key.clone(),
                    reason: format!("member {member}: {e}"),
                })
            })
            .collect()
    }
}
