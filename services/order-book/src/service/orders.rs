//! Placement, queries and quoting

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use types::errors::OrderError;
use types::fill::Fill;
use types::ids::{ClientOrderId, OrderId, SwapId, Symbol, UserId};
use types::market::MarketDepth;
use types::numeric::Price;
use types::order::{Order, Side};
use types::swap::{QuoteResult, Swap};

use super::{OrderBookService, PlaceOrderInput};
use crate::book::OrderIter;
use crate::error::{BookError, Result};
use crate::keys;
use crate::quote;
use crate::store::perform_tx;

/// Cap on fills returned by one history query
pub const MAX_FILLS: usize = 256;

impl OrderBookService {
    /// Validate and rest a new limit order
    pub async fn place_order(&self, input: PlaceOrderInput) -> Result<Order> {
        if let Some(existing) = self.store.find_order_by_client_oid(&input.client_order_id).await? {
            if existing.user_id != input.user_id {
                warn!(
                    client_order_id = %input.client_order_id,
                    user_id = %input.user_id,
                    "client order id belongs to another user"
                );
                return Err(OrderError::ClashingOrderId.into());
            }
            return Err(OrderError::AlreadyExists {
                client_order_id: input.client_order_id.to_string(),
            }
            .into());
        }

        let mut order = Order::try_new(
            input.user_id,
            input.client_order_id,
            input.symbol,
            input.side,
            input.price,
            input.size,
            Utc::now(),
        )?;
        self.check_cross_trade(&order).await?;

        perform_tx(self.store(), |tx| Ok(tx.store_open_order(&mut order)?)).await?;

        info!(
            order_id = %order.id,
            user_id = %order.user_id,
            symbol = %order.symbol,
            side = %order.side,
            price = %order.price,
            size = %order.size,
            "order placed"
        );
        self.publish_orders(std::slice::from_ref(&order)).await;
        Ok(order)
    }

    /// A new order may not rest at or through the opposite best price
    async fn check_cross_trade(&self, order: &Order) -> Result<()> {
        let opposite = order.side.opposite();
        let Some(best) = self.get_best_price(&order.symbol, opposite).await? else {
            return Ok(());
        };
        let crosses = match order.side {
            Side::BUY => order.price >= best,
            Side::SELL => order.price <= best,
        };
        if crosses {
            return Err(OrderError::CrossTrade {
                side: order.side.to_string(),
                price: order.price.to_string(),
                best: best.to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub async fn get_order_by_id(&self, id: &OrderId) -> Result<Option<Order>> {
        Ok(self.store.find_order(id).await?)
    }

    pub async fn get_order_by_client_oid(&self, id: &ClientOrderId) -> Result<Option<Order>> {
        Ok(self.store.find_order_by_client_oid(id).await?)
    }

    /// A user's open orders, oldest first, optionally for one symbol
    pub async fn get_open_orders_for_user(&self, user_id: &UserId, symbol: Option<&Symbol>) -> Result<Vec<Order>> {
        let ids = self.store.user_open_orders(user_id).await?;
        let orders = self.store.find_orders(&ids).await?;
        let open: Vec<Order> = orders
            .into_iter()
            .flatten()
            .filter(|order| order.is_open())
            .filter(|order| symbol.map_or(true, |s| &order.symbol == s))
            .collect();
        debug!(user_id = %user_id, orders = open.len(), "open orders loaded");
        Ok(open)
    }

    /// A user's filled orders and cancelled partial fills, oldest first
    pub async fn get_filled_orders_for_user(&self, user_id: &UserId) -> Result<Vec<Order>> {
        let ids = self.store.user_filled_orders(user_id).await?;
        let orders = self.store.find_orders(&ids).await?;
        Ok(orders.into_iter().flatten().collect())
    }

    /// Book levels aggregated per price, best first on both sides
    pub async fn get_market_depth(&self, symbol: &Symbol, depth: Option<usize>) -> Result<MarketDepth> {
        let limit = depth.unwrap_or(self.config.market_depth_limit);
        let mut market = MarketDepth::empty(symbol.clone(), Utc::now().timestamp_millis());
        market.asks = self.depth_levels(symbol, Side::SELL, limit).await?;
        market.bids = self.depth_levels(symbol, Side::BUY, limit).await?;
        debug!(
            symbol = %symbol,
            asks = market.asks.len(),
            bids = market.bids.len(),
            "market depth computed"
        );
        Ok(market)
    }

    async fn depth_levels(&self, symbol: &Symbol, side: Side, limit: usize) -> Result<Vec<[Decimal; 2]>> {
        let mut levels: Vec<[Decimal; 2]> = Vec::new();
        if limit == 0 {
            return Ok(levels);
        }
        let mut orders = OrderIter::resting(self.store(), symbol, side).await?;
        while let Some(order) = orders.next().await? {
            if !order.is_matchable() {
                continue;
            }
            match levels.last_mut() {
                Some([price, size]) if *price == order.price => *size += order.available_size(),
                _ => {
                    if levels.len() == limit {
                        break;
                    }
                    levels.push([order.price, order.available_size()]);
                }
            }
        }
        Ok(levels)
    }

    /// Price of the first matchable resting order on `side`
    pub async fn get_best_price(&self, symbol: &Symbol, side: Side) -> Result<Option<Price>> {
        let mut orders = OrderIter::resting(self.store(), symbol, side).await?;
        while let Some(order) = orders.next().await? {
            if order.is_matchable() {
                return Ok(Some(order.price));
            }
        }
        debug!(symbol = %symbol, side = %side, "no resting orders");
        Ok(None)
    }

    /// Quote a taker spending `in_amount`: BUY spends the quote token
    /// against asks, SELL spends the base token against bids
    pub async fn get_quote(
        &self,
        symbol: &Symbol,
        taker_side: Side,
        in_amount: Decimal,
        min_out_amount: Option<Decimal>,
    ) -> Result<QuoteResult> {
        match taker_side {
            Side::BUY => quote::get_out_amount_in_a_token(self.store(), symbol, in_amount, min_out_amount).await,
            Side::SELL => quote::get_out_amount_in_b_token(self.store(), symbol, in_amount, min_out_amount).await,
        }
    }

    pub fn get_symbols(&self) -> Vec<Symbol> {
        self.config.symbols.clone()
    }

    /// An open or resolved swap
    pub async fn get_swap(&self, id: &SwapId) -> Result<Option<Swap>> {
        if let Some(swap) = self.store.get_swap(id).await? {
            return Ok(Some(swap));
        }
        Ok(self.store.resolved_swap(id).await?)
    }

    /// Resolved swaps that touched a user's orders, oldest first
    pub async fn get_user_resolved_swaps(&self, user_id: &UserId) -> Result<Vec<Swap>> {
        let ids = self.store.user_resolved_swaps(user_id).await?;
        let mut swaps = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.resolved_swap(&id).await? {
                Some(swap) => swaps.push(swap),
                None => warn!(swap_id = %id, user_id = %user_id, "resolved swap index points at missing record"),
            }
        }
        Ok(swaps)
    }

    /// Fills of a user's orders by successful swaps resolved in `[start, end)`
    pub async fn get_swap_fills(
        &self,
        user_id: &UserId,
        symbol: Option<&Symbol>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Fill>> {
        let mut fills = Vec::new();
        let mut seen: HashSet<(SwapId, OrderId)> = HashSet::new();

        for swap in self.get_user_resolved_swaps(user_id).await? {
            let in_range = swap.resolved.is_some_and(|at| at >= start && at < end);
            if !swap.succeeded || !in_range {
                continue;
            }
            if symbol.is_some_and(|s| &swap.symbol != s) {
                continue;
            }
            for frag in &swap.frags {
                let Some(order) = self.store.find_order(&frag.order_id).await? else {
                    warn!(swap_id = %swap.id, order_id = %frag.order_id, "filled order no longer stored");
                    continue;
                };
                if &order.user_id != user_id || !seen.insert((swap.id, order.id)) {
                    continue;
                }
                if fills.len() == MAX_FILLS {
                    return Err(BookError::MaxRecordsExceeded { limit: MAX_FILLS });
                }
                fills.push(Fill::new(&swap, frag, &order));
            }
        }
        Ok(fills)
    }

    /// Live order events for one user
    pub async fn subscribe_user_orders(&self, user_id: &UserId) -> Result<BoxStream<'static, String>> {
        Ok(self.events.subscribe(&keys::user_orders_channel(user_id)).await?)
    }

    /// Live fill events for one user
    pub async fn subscribe_user_fills(&self, user_id: &UserId) -> Result<BoxStream<'static, String>> {
        Ok(self.events.subscribe(&keys::user_fills_channel(user_id)).await?)
    }
}
