//! One side of an in-process order book
//!
//! Price levels are kept in a BTreeMap for deterministic ordering. Asks are
//! walked ascending, bids descending, so "best first" is a plain iteration
//! in the side's direction. An `OrderId -> arena key` index makes removal
//! O(1) inside the level plus O(log P) when the level empties.

use std::collections::{BTreeMap, HashMap};

use slab::Slab;
use types::ids::OrderId;
use types::numeric::Price;
use types::order::Side;

use super::price_level::{OrderNode, PriceLevel};

#[derive(Debug, Clone)]
pub struct SideBook {
    side: Side,
    levels: BTreeMap<Price, PriceLevel>,
    nodes: Slab<OrderNode>,
    index: HashMap<OrderId, usize>,
}

impl SideBook {
    /// Create a new empty side
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
            nodes: Slab::new(),
            index: HashMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Insert an order at the back of its price level.
    ///
    /// Returns false if the order is already resting on this side.
    pub fn insert(&mut self, order_id: OrderId, price: Price) -> bool {
        if self.index.contains_key(&order_id) {
            return false;
        }
        let level = self.levels.entry(price).or_default();
        let key = level.push_back(&mut self.nodes, order_id, price);
        self.index.insert(order_id, key);
        true
    }

    /// Remove an order, returning the price it rested at
    pub fn remove(&mut self, order_id: &OrderId) -> Option<Price> {
        let key = self.index.remove(order_id)?;
        let price = self.nodes[key].price;

        let level = self.levels.get_mut(&price)?;
        level.unlink(&mut self.nodes, key);
        // Remove empty price levels to keep book clean
        if level.is_empty() {
            self.levels.remove(&price);
        }
        Some(price)
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.index.contains_key(order_id)
    }

    /// Price levels, best first
    pub fn levels(&self) -> Box<dyn Iterator<Item = (&Price, &PriceLevel)> + '_> {
        match self.side {
            Side::SELL => Box::new(self.levels.iter()),
            Side::BUY => Box::new(self.levels.iter().rev()),
        }
    }

    /// Order ids in price-time priority, optionally capped
    pub fn snapshot(&self, limit: Option<usize>) -> Vec<OrderId> {
        let limit = limit.unwrap_or(usize::MAX);
        self.levels()
            .flat_map(|(_, level)| level.iter(&self.nodes))
            .take(limit)
            .collect()
    }

    /// Get the best price on this side
    pub fn best_price(&self) -> Option<Price> {
        self.levels().next().map(|(price, _)| *price)
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Get the total number of price levels
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn order_count(&self) -> usize {
        self.index.len()
    }
}
