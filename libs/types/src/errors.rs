//! Error types for the order book model
//!
//! Model-level error taxonomy using thiserror. Storage and service errors
//! wrap these in the `order-book` crate.

use thiserror::Error;

/// Order-specific errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("order not found: {order_id}")]
    NotFound { order_id: String },

    #[error("order {order_id} is cancelled")]
    Cancelled { order_id: String },

    #[error("order {order_id} is already filled")]
    Filled { order_id: String },

    #[error("order {order_id} has size locked by an in-flight swap")]
    Pending { order_id: String },

    #[error("order {order_id} is not open")]
    NotOpen { order_id: String },

    #[error("insufficient available size on order {order_id}: required {required}, available {available}")]
    InsufficientAvailable {
        order_id: String,
        required: String,
        available: String,
    },

    #[error("unexpected size filled on order {order_id}: size {size}, filled {filled}, requested {requested}")]
    UnexpectedSizeFilled {
        order_id: String,
        size: String,
        filled: String,
        requested: String,
    },

    #[error("unexpected size pending on order {order_id}: pending {pending}, requested {requested}")]
    UnexpectedSizePending {
        order_id: String,
        pending: String,
        requested: String,
    },

    #[error("order with that id already exists")]
    ClashingOrderId,

    #[error("order with client order id {client_order_id} already exists")]
    AlreadyExists { client_order_id: String },

    #[error("{side} at {price} would cross the opposite best price {best}")]
    CrossTrade {
        side: String,
        price: String,
        best: String,
    },

    #[error("invalid price: {0}")]
    InvalidPrice(String),

    #[error("invalid size: {0}")]
    InvalidSize(String),
}

/// Quote and swap errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SwapError {
    #[error("swap not found: {swap_id}")]
    NotFound { swap_id: String },

    #[error("swap is invalid: {reason}")]
    Invalid { reason: String },

    #[error("swap {swap_id} already started")]
    AlreadyStarted { swap_id: String },

    #[error("swap {swap_id} already resolved")]
    AlreadyResolved { swap_id: String },

    #[error("not enough liquidity in book to satisfy amountIn")]
    InsufficientLiquidity,

    #[error("amountOut {out_amount} is less than minOutAmount {min_out_amount}")]
    MinOutAmount {
        out_amount: String,
        min_out_amount: String,
    },

    #[error("amountIn should be positive, got {0}")]
    InvalidInAmount(String),
}

/// Errors decoding a persisted record back into a model value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("no data provided")]
    Empty,

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Symbol validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SymbolError {
    #[error("invalid symbol {0}: expected BASE-QUOTE")]
    InvalidFormat(String),

    #[error("invalid symbol {0}: base and quote are the same token")]
    SameToken(String),
}

/// Fixed-point arithmetic errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumericError {
    #[error("decimal overflow in {op}: {lhs} and {rhs}")]
    Overflow {
        op: &'static str,
        lhs: String,
        rhs: String,
    },

    #[error("division by zero: {numerator} / 0")]
    DivisionByZero { numerator: String },
}
