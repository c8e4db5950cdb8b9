//! Types library for the off-chain order book
//!
//! Value types and invariants shared by the order book service and the
//! swap tracker. Nothing in here performs I/O.
//!
//! # Modules
//! - `ids`: Unique identifiers (OrderId, ClientOrderId, UserId, SwapId, Symbol)
//! - `numeric`: Fixed-point decimal helpers (Price, Size, truncating division)
//! - `order`: Resting orders and their lock/unlock/fill accounting
//! - `swap`: Swaps, fragments, quotes and pending-transaction records
//! - `fill`: Settlement records published to makers
//! - `market`: Market depth snapshots
//! - `errors`: Error taxonomy

pub mod errors;
pub mod fill;
pub mod ids;
pub mod market;
pub mod numeric;
pub mod order;
pub mod swap;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::errors::*;
    pub use crate::fill::*;
    pub use crate::ids::*;
    pub use crate::market::*;
    pub use crate::numeric::*;
    pub use crate::order::*;
    pub use crate::swap::*;
}
