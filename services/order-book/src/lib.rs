//! Order Book Service
//!
//! Off-chain limit order book with on-chain settlement. Makers rest limit
//! orders; takers are quoted against the book, the quoted fragments are
//! locked as a swap, and the swap is resolved once its transaction is
//! final on chain.
//!
//! **Key Invariants:**
//! - `size_filled + size_pending <= size` for every order
//! - Quotes walk each side best price first, FIFO within a price
//! - A quote never consumes more than an order's available size
//! - Every state transition commits atomically or not at all
//! - A swap starts at most once and resolves at most once

pub mod book;
pub mod chain;
pub mod config;
pub mod error;
pub mod events;
pub mod keys;
pub mod quote;
pub mod service;
pub mod store;
pub mod tracker;

pub use config::{BookConfig, StoreBackend, TrackerConfig};
pub use error::{BookError, ErrorKind, StoreError};
pub use service::{CancelOrderInput, OrderBookService, PlaceOrderInput, Transition};
pub use store::{MemoryStore, OrderBookStore, RedisStore};
pub use tracker::{PollSummary, SwapTracker};
