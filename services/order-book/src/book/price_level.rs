//! Price level implementation with FIFO queue
//!
//! A price level contains all orders resting at one price. Orders are kept
//! in arrival order to enforce time priority. Nodes live in a slab arena
//! owned by the side book; the level only stores the head/tail keys and
//! each node links to its neighbours, so unlinking an order whose key is
//! known is O(1).

use slab::Slab;
use types::ids::OrderId;
use types::numeric::Price;

/// Arena node for one resting order
#[derive(Debug, Clone)]
pub struct OrderNode {
    pub order_id: OrderId,
    pub price: Price,
    prev: Option<usize>,
    next: Option<usize>,
}

/// A price level containing orders at a specific price
#[derive(Debug, Clone, Default)]
pub struct PriceLevel {
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl PriceLevel {
    /// Create a new empty price level
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an order at the back of the queue (time priority).
    ///
    /// Returns the arena key of the new node.
    pub fn push_back(&mut self, nodes: &mut Slab<OrderNode>, order_id: OrderId, price: Price) -> usize {
        let key = nodes.insert(OrderNode {
            order_id,
            price,
            prev: self.tail,
            next: None,
        });

        match self.tail {
            Some(tail) => nodes[tail].next = Some(key),
            None => self.head = Some(key),
        }
        self.tail = Some(key);
        self.len += 1;
        key
    }

    /// Unlink a node of this level and free its arena slot
    ///
    /// The caller guarantees `key` belongs to this level.
    pub fn unlink(&mut self, nodes: &mut Slab<OrderNode>, key: usize) -> OrderNode {
        let node = nodes.remove(key);

        match node.prev {
            Some(prev) => nodes[prev].next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => nodes[next].prev = node.prev,
            None => self.tail = node.prev,
        }
        self.len -= 1;
        node
    }

    /// Front order id without removing it
    pub fn peek_front(&self, nodes: &Slab<OrderNode>) -> Option<OrderId> {
        self.head.map(|key| nodes[key].order_id)
    }

    /// Walk the level front to back
    pub fn iter<'a>(&self, nodes: &'a Slab<OrderNode>) -> LevelIter<'a> {
        LevelIter {
            nodes,
            cursor: self.head,
        }
    }

    /// Check if the price level is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the number of orders at this level
    pub fn order_count(&self) -> usize {
        self.len
    }
}

/// Front-to-back iterator over a level's order ids
pub struct LevelIter<'a> {
    nodes: &'a Slab<OrderNode>,
    cursor: Option<usize>,
}

impl Iterator for LevelIter<'_> {
    type Item = OrderId;

    fn next(&mut self) -> Option<Self::Item> {
        let node = &self.nodes[self.cursor?];
        self.cursor = node.next;
        Some(node.order_id)
    }
}
