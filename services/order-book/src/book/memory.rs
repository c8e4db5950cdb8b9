//! In-process price index
//!
//! One [`SymbolBook`] per symbol, each behind its own read-write lock:
//! quote walks and depth snapshots read concurrently, writers take the
//! book exclusively. Multi-symbol batches lock books in symbol order.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use types::ids::{OrderId, Symbol};
use types::order::Side;

use super::side_book::SideBook;
use super::{PriceEntry, PriceIndex};
use crate::error::StoreError;
use crate::store::tx::IndexOp;

/// Both sides of one symbol's book
#[derive(Debug, Clone)]
pub struct SymbolBook {
    pub bids: SideBook,
    pub asks: SideBook,
}

impl SymbolBook {
    pub fn new() -> Self {
        Self {
            bids: SideBook::new(Side::BUY),
            asks: SideBook::new(Side::SELL),
        }
    }

    pub fn side(&self, side: Side) -> &SideBook {
        match side {
            Side::BUY => &self.bids,
            Side::SELL => &self.asks,
        }
    }

    pub fn side_mut(&mut self, side: Side) -> &mut SideBook {
        match side {
            Side::BUY => &mut self.bids,
            Side::SELL => &mut self.asks,
        }
    }

    fn apply(&mut self, op: IndexOp, entry: &PriceEntry) -> bool {
        let book = self.side_mut(entry.side);
        match op {
            IndexOp::Add => book.insert(entry.order_id, entry.price),
            IndexOp::Remove | IndexOp::Update => book.remove(&entry.order_id).is_some(),
        }
    }
}

impl Default for SymbolBook {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-symbol order books held in process memory
#[derive(Debug, Default)]
pub struct MemoryPriceIndex {
    books: DashMap<Symbol, Arc<RwLock<SymbolBook>>>,
}

impl MemoryPriceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self, symbol: &Symbol) -> Arc<RwLock<SymbolBook>> {
        Arc::clone(self.books.entry(symbol.clone()).or_default().value())
    }

    fn existing(&self, symbol: &Symbol) -> Option<Arc<RwLock<SymbolBook>>> {
        self.books.get(symbol).map(|book| Arc::clone(book.value()))
    }

    /// Run `f` under the symbol's read lock, if the symbol has a book
    fn with_book<T>(&self, symbol: &Symbol, f: impl FnOnce(&SymbolBook) -> T) -> Option<T> {
        let book = self.existing(symbol)?;
        let guard = book.read();
        Some(f(&guard))
    }

    /// Apply a batch of index changes as one step.
    ///
    /// Every affected symbol is write-locked (in symbol order) before the
    /// first change lands, so readers see all of the batch or none of it.
    pub fn apply_batch(&self, changes: &[(IndexOp, &PriceEntry)]) {
        self.apply_batch_then(changes, || ());
    }

    /// [`apply_batch`](Self::apply_batch), then run `then` before the
    /// symbol locks are released
    pub fn apply_batch_then<T>(&self, changes: &[(IndexOp, &PriceEntry)], then: impl FnOnce() -> T) -> T {
        let symbols: BTreeSet<&Symbol> = changes.iter().map(|(_, entry)| &entry.symbol).collect();
        let books: Vec<(&Symbol, Arc<RwLock<SymbolBook>>)> =
            symbols.into_iter().map(|symbol| (symbol, self.book(symbol))).collect();
        let mut guards: Vec<_> = books.iter().map(|(symbol, book)| (*symbol, book.write())).collect();

        for (op, entry) in changes {
            if let Some((_, guard)) = guards.iter_mut().find(|(symbol, _)| *symbol == &entry.symbol) {
                guard.apply(*op, entry);
            }
        }
        let value = then();
        drop(guards);
        value
    }

    /// Symbols that have ever held an order
    pub fn symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.books.iter().map(|book| book.key().clone()).collect();
        symbols.sort();
        symbols
    }

    pub fn contains(&self, entry: &PriceEntry) -> bool {
        self.with_book(&entry.symbol, |book| book.side(entry.side).contains(&entry.order_id))
            .unwrap_or(false)
    }

    /// Resting orders on one side of a symbol
    pub fn order_count(&self, symbol: &Symbol, side: Side) -> usize {
        self.with_book(symbol, |book| book.side(side).order_count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl PriceIndex for MemoryPriceIndex {
    async fn add(&self, entry: &PriceEntry) -> Result<(), StoreError> {
        self.apply_batch(&[(IndexOp::Add, entry)]);
        Ok(())
    }

    async fn remove(&self, entry: &PriceEntry) -> Result<bool, StoreError> {
        let Some(book) = self.existing(&entry.symbol) else {
            return Ok(false);
        };
        let removed = book.write().apply(IndexOp::Remove, entry);
        Ok(removed)
    }

    async fn snapshot(
        &self,
        symbol: &Symbol,
        side: Side,
        limit: Option<usize>,
    ) -> Result<Vec<OrderId>, StoreError> {
        Ok(self
            .with_book(symbol, |book| book.side(side).snapshot(limit))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn entry(symbol: &str, side: Side, price: i64) -> PriceEntry {
        PriceEntry {
            symbol: Symbol::try_new(symbol).unwrap(),
            side,
            order_id: OrderId::new(),
            price: Decimal::from(price),
        }
    }

    #[tokio::test]
    async fn test_min_ask_and_max_bid() {
        let index = MemoryPriceIndex::new();
        let ask_high = entry("ETH-USDC", Side::SELL, 1002);
        let ask_low = entry("ETH-USDC", Side::SELL, 1000);
        let bid_low = entry("ETH-USDC", Side::BUY, 990);
        let bid_high = entry("ETH-USDC", Side::BUY, 995);
        for e in [&ask_high, &ask_low, &bid_low, &bid_high] {
            index.add(e).await.unwrap();
        }

        let symbol = ask_low.symbol.clone();
        assert_eq!(
            index.get_min_ask(&symbol).await.unwrap(),
            vec![ask_low.order_id, ask_high.order_id]
        );
        assert_eq!(
            index.get_max_bid(&symbol).await.unwrap(),
            vec![bid_high.order_id, bid_low.order_id]
        );
    }

    #[tokio::test]
    async fn test_remove_and_unknown_symbol() {
        let index = MemoryPriceIndex::new();
        let ask = entry("ETH-USDC", Side::SELL, 1000);
        index.add(&ask).await.unwrap();

        assert!(index.remove(&ask).await.unwrap());
        assert!(!index.remove(&ask).await.unwrap());
        assert!(!index.contains(&ask));

        let other = Symbol::try_new("BTC-USDC").unwrap();
        assert!(index.snapshot(&other, Side::SELL, None).await.unwrap().is_empty());
    }

    #[test]
    fn test_apply_batch_across_symbols() {
        let index = MemoryPriceIndex::new();
        let eth = entry("ETH-USDC", Side::SELL, 1000);
        let btc = entry("BTC-USDC", Side::BUY, 60000);
        index.apply_batch(&[(IndexOp::Add, &eth), (IndexOp::Add, &btc)]);

        assert!(index.contains(&eth));
        assert!(index.contains(&btc));
        assert_eq!(index.symbols().len(), 2);

        index.apply_batch(&[(IndexOp::Remove, &eth)]);
        assert_eq!(index.order_count(&eth.symbol, Side::SELL), 0);
        assert_eq!(index.order_count(&btc.symbol, Side::BUY), 1);
    }
}
