//! Redis key naming conventions
//!
//! Format: {entity}:{identifier}[:{index}]. Every key the Redis store and
//! the Redis price index touch is built here.

use types::ids::{ClientOrderId, OrderId, SwapId, Symbol, UserId};
use types::order::Side;

/// Key prefixes
pub mod prefix {
    pub const ORDER: &str = "order";
    pub const USER: &str = "user";
    pub const CLIENT_OID: &str = "client-oid";
    pub const SWAP: &str = "swap";
    pub const SWAP_RESOLVED: &str = "swap:resolved";
    pub const SWAP_TRACKER: &str = "swap-tracker";
    pub const USER_ORDERS_CHANNEL: &str = "user_orders";
    pub const USER_FILLS_CHANNEL: &str = "user_fills";
}

/// List of `{swapId, txHash}` records awaiting on-chain finality
pub const PENDING_SWAP_TXS: &str = "pending-swap-txs";

/// Set of swap ids that exist and are not yet resolved or aborted
pub const OPEN_SWAPS: &str = "swaps:open";

/// Order hash: order:{orderId}
pub fn order(id: &OrderId) -> String {
    format!("{}:{}", prefix::ORDER, id)
}

/// Price-sorted set: {symbol}:{buy|sell}:prices
pub fn prices(symbol: &Symbol, side: Side) -> String {
    format!("{}:{}:prices", symbol, side)
}

/// User open orders, scored by arrival: user:{userId}:open-orders
pub fn user_open_orders(user_id: &UserId) -> String {
    format!("{}:{}:open-orders", prefix::USER, user_id)
}

/// User filled or cancelled-after-fill orders: user:{userId}:filled-orders
pub fn user_filled_orders(user_id: &UserId) -> String {
    format!("{}:{}:filled-orders", prefix::USER, user_id)
}

/// Swaps that touched a user's orders: user:{userId}:resolved-swaps
pub fn user_resolved_swaps(user_id: &UserId) -> String {
    format!("{}:{}:resolved-swaps", prefix::USER, user_id)
}

/// Client order id mapping: client-oid:{clientOrderId}
pub fn client_oid(id: &ClientOrderId) -> String {
    format!("{}:{}", prefix::CLIENT_OID, id)
}

/// Open swap record: swap:{swapId}
pub fn swap(id: &SwapId) -> String {
    format!("{}:{}", prefix::SWAP, id)
}

/// Archived resolved swap: swap:resolved:{swapId}
pub fn resolved_swap(id: &SwapId) -> String {
    format!("{}:{}", prefix::SWAP_RESOLVED, id)
}

/// Idempotency set: swap-tracker:{status}
pub fn swap_tracker(status: &str) -> String {
    format!("{}:{}", prefix::SWAP_TRACKER, status)
}

/// Pub/sub topic for a user's order updates: user_orders:{userId}
pub fn user_orders_channel(user_id: &UserId) -> String {
    format!("{}:{}", prefix::USER_ORDERS_CHANNEL, user_id)
}

/// Pub/sub topic for a user's fills: user_fills:{userId}
pub fn user_fills_channel(user_id: &UserId) -> String {
    format!("{}:{}", prefix::USER_FILLS_CHANNEL, user_id)
}
