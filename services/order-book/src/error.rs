//! Service and storage errors
//!
//! `StoreError` covers everything that can go wrong talking to a backing
//! store; `BookError` is what service operations return. Callers map
//! [`BookError::kind`] to their own responses.

use thiserror::Error;
use types::errors::{NumericError, OrderError, RecordError, SwapError, SymbolError};

/// Errors raised by a store, price index or commit
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt record at {key}: {source}")]
    Record {
        key: String,
        #[source]
        source: RecordError,
    },

    #[error("invalid stored value at {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    /// A staged guard failed or a watched key changed before commit
    #[error("transaction conflict: {0}")]
    Conflict(String),

    #[error("commit failed: {0}")]
    CommitFailed(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

/// Errors returned by order book service operations
#[derive(Error, Debug)]
pub enum BookError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Swap(#[from] SwapError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Symbol(#[from] SymbolError),

    #[error(transparent)]
    Numeric(#[from] NumericError),

    #[error("result exceeds {limit} records")]
    MaxRecordsExceeded { limit: usize },

    /// State the indices promised but could not deliver
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

/// Coarse classification for callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input or unsatisfiable request; nothing was mutated
    Validation,
    /// Entity does not exist
    NotFound,
    /// Current state forbids the operation; re-fetch before retrying
    Conflict,
    /// Store commit failed; no writes landed, safe to retry
    Transactional,
    /// Index corruption or a broken invariant
    Unexpected,
}

impl BookError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookError::Order(err) => match err {
                OrderError::NotFound { .. } => ErrorKind::NotFound,
                OrderError::InvalidPrice(_) | OrderError::InvalidSize(_) | OrderError::CrossTrade { .. } => {
                    ErrorKind::Validation
                }
                OrderError::UnexpectedSizeFilled { .. } | OrderError::UnexpectedSizePending { .. } => {
                    ErrorKind::Unexpected
                }
                _ => ErrorKind::Conflict,
            },
            BookError::Swap(err) => match err {
                SwapError::NotFound { .. } => ErrorKind::NotFound,
                SwapError::AlreadyStarted { .. } | SwapError::AlreadyResolved { .. } => ErrorKind::Conflict,
                SwapError::Invalid { .. } => ErrorKind::Conflict,
                _ => ErrorKind::Validation,
            },
            BookError::Store(StoreError::Conflict(_)) => ErrorKind::Conflict,
            BookError::Store(StoreError::Record { .. }) | BookError::Store(StoreError::InvalidValue { .. }) => {
                ErrorKind::Unexpected
            }
            BookError::Store(_) => ErrorKind::Transactional,
            BookError::Symbol(_) | BookError::Numeric(_) | BookError::MaxRecordsExceeded { .. } => {
                ErrorKind::Validation
            }
            BookError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

pub type Result<T, E = BookError> = std::result::Result<T, E>;
