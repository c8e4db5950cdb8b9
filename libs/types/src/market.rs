//! Market depth snapshots

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::Symbol;
use crate::numeric::{Price, Size};

/// Aggregated book levels, best price first on both sides.
///
/// Rows are `[price, available size]` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDepth {
    pub symbol: Symbol,
    pub asks: Vec<[Decimal; 2]>,
    pub bids: Vec<[Decimal; 2]>,
    /// Unix millis when the snapshot was taken
    pub time: i64,
}

impl MarketDepth {
    pub fn empty(symbol: Symbol, time: i64) -> Self {
        Self {
            symbol,
            asks: Vec::new(),
            bids: Vec::new(),
            time,
        }
    }

    pub fn best_ask(&self) -> Option<(Price, Size)> {
        self.asks.first().map(|[price, size]| (*price, *size))
    }

    pub fn best_bid(&self) -> Option<(Price, Size)> {
        self.bids.first().map(|[price, size]| (*price, *size))
    }

    /// Best ask minus best bid, when both sides have liquidity
    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask()?.0 - self.best_bid()?.0)
    }
}
