//! Liquidity aggregation
//!
//! A taker spending the quote token (B) walks the asks upward; a taker
//! spending the base token (A) walks the bids downward. Each matchable
//! order is consumed greedily until the input is spent. A quote is all or
//! nothing: if the book runs out first the walk fails with
//! `InsufficientLiquidity`. Quoting never mutates anything.
//!
//! Amounts of A derived from B are truncated toward zero at 18 fractional
//! digits, so a fragment never promises more A than the order holds.

use rust_decimal::Decimal;
use tracing::{debug, trace};
use types::errors::SwapError;
use types::ids::Symbol;
use types::numeric::{checked_mul, is_positive, truncating_div};
use types::order::{Order, Side};
use types::swap::{OrderFrag, QuoteResult};

use crate::book::OrderIter;
use crate::error::Result;
use crate::store::OrderBookStore;

/// Greedy accumulation state for one quote
#[derive(Debug, Clone)]
pub struct QuoteWalk {
    symbol: Symbol,
    taker_side: Side,
    in_amount: Decimal,
    remaining: Decimal,
    out_amount: Decimal,
    frags: Vec<OrderFrag>,
}

impl QuoteWalk {
    pub fn new(symbol: Symbol, taker_side: Side, in_amount: Decimal) -> Result<Self, SwapError> {
        if !is_positive(in_amount) {
            return Err(SwapError::InvalidInAmount(in_amount.to_string()));
        }
        Ok(Self {
            symbol,
            taker_side,
            in_amount,
            remaining: in_amount,
            out_amount: Decimal::ZERO,
            frags: Vec::new(),
        })
    }

    /// Side of the resting orders this walk consumes
    pub fn resting_side(&self) -> Side {
        self.taker_side.opposite()
    }

    pub fn is_complete(&self) -> bool {
        !is_positive(self.remaining)
    }

    pub fn remaining(&self) -> Decimal {
        self.remaining
    }

    /// Consume as much of `order` as the remaining input allows
    pub fn consume(&mut self, order: &Order) -> Result<()> {
        if self.is_complete() {
            return Ok(());
        }
        if !order.is_matchable() {
            trace!(order_id = %order.id, "skipping unmatchable order");
            return Ok(());
        }
        let available = order.available_size();

        let frag = match self.taker_side {
            // spend B, receive A
            Side::BUY => {
                let order_size_b = checked_mul(order.price, available)?;
                let spend_b = order_size_b.min(self.remaining);
                let gain_a = truncating_div(spend_b, order.price)?;
                if !is_positive(gain_a) {
                    trace!(order_id = %order.id, %spend_b, "input below precision at this price");
                    return Ok(());
                }
                OrderFrag::new(order.id, spend_b, gain_a)
            }
            // spend A, receive B
            Side::SELL => {
                let spend_a = available.min(self.remaining);
                let gain_b = checked_mul(order.price, spend_a)?;
                OrderFrag::new(order.id, spend_a, gain_b)
            }
        };

        self.remaining -= frag.in_size;
        self.out_amount += frag.out_size;
        self.frags.push(frag);
        Ok(())
    }

    /// Close the walk, enforcing full liquidity and the minimum output
    pub fn finish(self, min_out_amount: Option<Decimal>) -> Result<QuoteResult, SwapError> {
        if is_positive(self.remaining) {
            return Err(SwapError::InsufficientLiquidity);
        }
        if let Some(min_out) = min_out_amount {
            if self.out_amount < min_out {
                return Err(SwapError::MinOutAmount {
                    out_amount: self.out_amount.to_string(),
                    min_out_amount: min_out.to_string(),
                });
            }
        }
        Ok(QuoteResult {
            symbol: self.symbol,
            side: self.taker_side,
            in_amount: self.in_amount,
            out_amount: self.out_amount,
            frags: self.frags,
        })
    }
}

async fn walk(
    store: &dyn OrderBookStore,
    symbol: &Symbol,
    taker_side: Side,
    in_amount: Decimal,
    min_out_amount: Option<Decimal>,
) -> Result<QuoteResult> {
    let mut quote = QuoteWalk::new(symbol.clone(), taker_side, in_amount)?;
    let mut orders = OrderIter::resting(store, symbol, quote.resting_side()).await?;

    while !quote.is_complete() {
        let Some(order) = orders.next().await? else {
            break;
        };
        quote.consume(&order)?;
    }

    let result = quote.finish(min_out_amount)?;
    debug!(
        symbol = %symbol,
        side = %taker_side,
        in_amount = %result.in_amount,
        out_amount = %result.out_amount,
        frags = result.frags.len(),
        "quote computed"
    );
    Ok(result)
}

/// Spend `in_amount_b` of the quote token against the asks
pub async fn get_out_amount_in_a_token(
    store: &dyn OrderBookStore,
    symbol: &Symbol,
    in_amount_b: Decimal,
    min_out_amount: Option<Decimal>,
) -> Result<QuoteResult> {
    walk(store, symbol, Side::BUY, in_amount_b, min_out_amount).await
}

/// Spend `in_amount_a` of the base token against the bids
pub async fn get_out_amount_in_b_token(
    store: &dyn OrderBookStore,
    symbol: &Symbol,
    in_amount_a: Decimal,
    min_out_amount: Option<Decimal>,
) -> Result<QuoteResult> {
    walk(store, symbol, Side::SELL, in_amount_a, min_out_amount).await
}
