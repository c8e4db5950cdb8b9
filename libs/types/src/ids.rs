//! Identifier types for order book entities
//!
//! Every system-generated id is a UUID v7, so ids sort by creation time.
//! The Redis price index relies on that: orders resting at the same price
//! are returned in member order, which is arrival order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::SymbolError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new id with the current timestamp
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a resting order, generated on placement
    OrderId
);

uuid_id!(
    /// Caller-supplied order identifier, unique per user
    ClientOrderId
);

uuid_id!(
    /// Identifier of the user (market maker) owning an order
    UserId
);

uuid_id!(
    /// Identifier of one swap attempt
    SwapId
);

/// Trading pair identifier
///
/// Format: "BASE-QUOTE" (e.g., "ETH-USDC"). The base token is the A token
/// that order sizes are denominated in; prices are quoted in the B token.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub const SEPARATOR: char = '-';

    /// Validate and create a symbol
    pub fn try_new(symbol: impl Into<String>) -> Result<Self, SymbolError> {
        let s = symbol.into();
        let mut parts = s.split(Self::SEPARATOR);
        let (base, quote) = match (parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(quote), None) => (base, quote),
            _ => return Err(SymbolError::InvalidFormat(s)),
        };

        let valid_leg = |leg: &str| !leg.is_empty() && leg.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid_leg(base) || !valid_leg(quote) {
            return Err(SymbolError::InvalidFormat(s));
        }
        if base == quote {
            return Err(SymbolError::SameToken(s));
        }

        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into base (A) and quote (B) tokens
    pub fn split(&self) -> (&str, &str) {
        // validated in try_new
        self.0
            .split_once(Self::SEPARATOR)
            .unwrap_or((self.0.as_str(), ""))
    }

    pub fn base(&self) -> &str {
        self.split().0
    }

    pub fn quote(&self) -> &str {
        self.split().1
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_new(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}
