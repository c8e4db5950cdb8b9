//! Swap, fragment and pending-transaction types
//!
//! A swap is one attempted atomic execution of a set of fragments against
//! resting orders, settled by a single on-chain transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{OrderId, SwapId, Symbol};
use crate::numeric::Size;
use crate::order::{Order, Side};

/// The portion of one order committed to one swap, seen from the taker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFrag {
    pub order_id: OrderId,
    /// Amount the taker pays into this order
    pub in_size: Size,
    /// Amount the taker receives from this order
    pub out_size: Size,
}

impl OrderFrag {
    pub fn new(order_id: OrderId, in_size: Size, out_size: Size) -> Self {
        Self {
            order_id,
            in_size,
            out_size,
        }
    }
}

/// Result of walking the book for a taker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResult {
    pub symbol: Symbol,
    /// Taker side: BUY spends quote token, SELL spends base token
    pub side: Side,
    pub in_amount: Decimal,
    pub out_amount: Decimal,
    pub frags: Vec<OrderFrag>,
}

/// Outcome of locking a quote's fragments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginSwapResult {
    pub swap_id: SwapId,
    pub out_amount: Decimal,
    /// Orders in their locked state, index-aligned with `frags`
    pub orders: Vec<Order>,
    pub frags: Vec<OrderFrag>,
}

/// One swap attempt and its lifecycle timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Swap {
    pub id: SwapId,
    pub symbol: Symbol,
    pub side: Side,
    pub frags: Vec<OrderFrag>,
    pub created: DateTime<Utc>,
    /// First on-chain submission; set at most once
    pub started: Option<DateTime<Utc>>,
    pub mined: Option<DateTime<Utc>>,
    /// Final outcome recorded; set at most once
    pub resolved: Option<DateTime<Utc>>,
    pub succeeded: bool,
    pub tx_hash: Option<String>,
}

impl Swap {
    pub fn new(symbol: Symbol, side: Side, frags: Vec<OrderFrag>, created: DateTime<Utc>) -> Self {
        Self {
            id: SwapId::new(),
            symbol,
            side,
            frags,
            created,
            started: None,
            mined: None,
            resolved: None,
            succeeded: false,
            tx_hash: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.is_some()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// Started but not yet resolved: the poll loop owns it
    pub fn is_in_flight(&self) -> bool {
        self.is_started() && !self.is_resolved()
    }

    pub fn order_ids(&self) -> impl Iterator<Item = OrderId> + '_ {
        self.frags.iter().map(|frag| frag.order_id)
    }

    /// Seconds elapsed since creation, clamped at zero
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created).num_seconds().max(0)
    }
}

/// An outstanding on-chain submission for a swap
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTx {
    pub swap_id: SwapId,
    pub tx_hash: String,
}

impl SwapTx {
    pub fn new(swap_id: SwapId, tx_hash: impl Into<String>) -> Self {
        Self {
            swap_id,
            tx_hash: tx_hash.into(),
        }
    }
}
