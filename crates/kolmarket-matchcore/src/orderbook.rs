//! The order book for a single outcome market.
//!
//! Uses `BTreeMap` for price-level ordering:
//! - **Bids** (buys): `BTreeMap<Reverse<Decimal>, PriceLevel>` -- highest price first
//! - **Asks** (sells): `BTreeMap<Decimal, PriceLevel>` -- lowest price first
//!
//! An auxiliary `HashMap<OrderId, (Side, Price)>` enables O(log N) cancellation.
//! Only active orders (OPEN / PARTIALLY_FILLED) rest in the book.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use kolmarket_types::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::price_level::PriceLevel;

/// Aggregated view of one price level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSummary {
    pub price: Decimal,
    /// Sum of remaining quantity at this price.
    pub quantity: Decimal,
    pub order_count: usize,
}

/// Depth-limited snapshot of an outcome's book, best prices first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub outcome_id: OutcomeId,
    pub bids: Vec<LevelSummary>,
    pub asks: Vec<LevelSummary>,
}

/// The order book for a single outcome market.
#[derive(Debug)]
pub struct OrderBook {
    pub outcome_id: OutcomeId,
    /// Buy side: highest price first (`Reverse` key).
    bids: BTreeMap<Reverse<Decimal>, PriceLevel>,
    /// Sell side: lowest price first.
    asks: BTreeMap<Decimal, PriceLevel>,
    /// Fast lookup: `OrderId -> (side, price)` for O(log N) cancel.
    index: HashMap<OrderId, (OrderSide, Decimal)>,
    /// Next arrival sequence handed out by [`OrderBook::next_sequence`].
    sequence: u64,
}

impl OrderBook {
    #[must_use]
    pub fn new(outcome_id: OutcomeId) -> Self {
        Self {
            outcome_id,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
            sequence: 0,
        }
    }

    /// Allocate the next arrival sequence number for this book.
    pub fn next_sequence(&mut self) -> u64 {
        let seq = self.sequence;
        self.sequence += 1;
        seq
    }

    // =================================================================
    // Insertion
    // =================================================================

    /// Rest an active order at its limit price.
    pub fn insert_order(&mut self, order: Order) -> Result<()> {
        if self.index.contains_key(&order.id) {
            return Err(KolmarketError::DuplicateOrder(order.id));
        }
        if !order.is_active() || order.is_filled() {
            return Err(KolmarketError::OrderNotActive {
                order_id: order.id,
                status: order.status,
            });
        }

        let price = order.price;
        self.index.insert(order.id, (order.side, price));

        match order.side {
            OrderSide::Buy => {
                self.bids
                    .entry(Reverse(price))
                    .or_insert_with(|| PriceLevel::new(price))
                    .push_back(order);
            }
            OrderSide::Sell => {
                self.asks
                    .entry(price)
                    .or_insert_with(|| PriceLevel::new(price))
                    .push_back(order);
            }
        }
        Ok(())
    }

    // =================================================================
    // Removal
    // =================================================================

    /// Remove a resting order by ID. Returns the removed order.
    pub fn remove_order(&mut self, order_id: &OrderId) -> Result<Order> {
        let (side, price) = self
            .index
            .remove(order_id)
            .ok_or(KolmarketError::OrderNotFound(*order_id))?;

        let level = self
            .level_mut(side, price)
            .ok_or(KolmarketError::OrderNotFound(*order_id))?;
        let order = level
            .remove_order(order_id)
            .ok_or(KolmarketError::OrderNotFound(*order_id))?;
        self.prune_level(side, price);
        Ok(order)
    }

    /// Drop index entries for orders the matcher removed from a level.
    pub(crate) fn forget(&mut self, order_ids: &[OrderId]) {
        for id in order_ids {
            self.index.remove(id);
        }
    }

    /// Remove the level at `price` if it holds no orders.
    pub(crate) fn prune_level(&mut self, side: OrderSide, price: Decimal) {
        match side {
            OrderSide::Buy => {
                if self.bids.get(&Reverse(price)).is_some_and(PriceLevel::is_empty) {
                    self.bids.remove(&Reverse(price));
                }
            }
            OrderSide::Sell => {
                if self.asks.get(&price).is_some_and(PriceLevel::is_empty) {
                    self.asks.remove(&price);
                }
            }
        }
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Best (highest) bid price, or `None` if no bids.
    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next().map(|r| r.0)
    }

    /// Best (lowest) ask price, or `None` if no asks.
    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// Spread = best_ask - best_bid. `None` if either side is empty.
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    #[must_use]
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }

    #[must_use]
    pub fn ask_depth(&self) -> usize {
        self.asks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn contains_order(&self, order_id: &OrderId) -> bool {
        self.index.contains_key(order_id)
    }

    /// Look up a resting order.
    #[must_use]
    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        let (side, price) = self.index.get(order_id)?;
        match side {
            OrderSide::Buy => self.bids.get(&Reverse(*price))?.get(order_id),
            OrderSide::Sell => self.asks.get(price)?.get(order_id),
        }
    }

    // =================================================================
    // Iteration (for the matcher and snapshots)
    // =================================================================

    /// Iterate bid levels from best (highest) to worst.
    pub fn bid_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.bids.values()
    }

    /// Iterate ask levels from best (lowest) to worst.
    pub fn ask_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.asks.values()
    }

    /// Prices on `side` that a taker limit of `limit` crosses, best first.
    #[must_use]
    pub fn crossing_prices(&self, side: OrderSide, limit: Decimal) -> Vec<Decimal> {
        match side {
            OrderSide::Buy => self
                .bids
                .keys()
                .map(|r| r.0)
                .take_while(|p| *p >= limit)
                .collect(),
            OrderSide::Sell => self
                .asks
                .keys()
                .copied()
                .take_while(|p| *p <= limit)
                .collect(),
        }
    }

    pub(crate) fn level_mut(&mut self, side: OrderSide, price: Decimal) -> Option<&mut PriceLevel> {
        match side {
            OrderSide::Buy => self.bids.get_mut(&Reverse(price)),
            OrderSide::Sell => self.asks.get_mut(&price),
        }
    }

    /// Aggregate up to `depth` levels per side, best first. `side`
    /// restricts the snapshot to one side.
    #[must_use]
    pub fn snapshot(&self, side: Option<OrderSide>, depth: usize) -> OrderBookSnapshot {
        let summarize = |level: &PriceLevel| LevelSummary {
            price: level.price,
            quantity: level.total_quantity(),
            order_count: level.len(),
        };
        let bids = if side.is_none_or(|s| s == OrderSide::Buy) {
            self.bid_levels().take(depth).map(summarize).collect()
        } else {
            Vec::new()
        };
        let asks = if side.is_none_or(|s| s == OrderSide::Sell) {
            self.ask_levels().take(depth).map(summarize).collect()
        } else {
            Vec::new()
        };
        OrderBookSnapshot {
            outcome_id: self.outcome_id,
            bids,
            asks,
        }
    }

    // =================================================================
    // Maintenance
    // =================================================================

    /// Drain all resting orders from the book (round lock / settlement).
    pub fn drain_all(&mut self) -> Vec<Order> {
        self.index.clear();
        let mut all = Vec::new();
        for level in self.bids.values_mut() {
            all.extend(level.orders.drain(..));
        }
        for level in self.asks.values_mut() {
            all.extend(level.orders.drain(..));
        }
        self.bids.clear();
        self.asks.clear();
        all.sort_by_key(|o| o.sequence);
        all
    }
}

#[cfg(test)]
mod tests {
    use kolmarket_types::*;
    use rust_decimal::Decimal;

    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn make_order(side: OrderSide, price: &str, qty: Decimal) -> Order {
        Order::dummy(side, dec(price), qty)
    }

    fn book() -> OrderBook {
        OrderBook::new(OutcomeId::from_bytes([9; 16]))
    }

    #[test]
    fn insert_and_query_best_bid_ask() {
        let mut book = book();
        book.insert_order(make_order(OrderSide::Buy, "0.40", Decimal::ONE)).unwrap();
        book.insert_order(make_order(OrderSide::Buy, "0.39", Decimal::ONE)).unwrap();
        book.insert_order(make_order(OrderSide::Sell, "0.45", Decimal::ONE)).unwrap();
        book.insert_order(make_order(OrderSide::Sell, "0.47", Decimal::ONE)).unwrap();

        assert_eq!(book.best_bid(), Some(dec("0.40")));
        assert_eq!(book.best_ask(), Some(dec("0.45")));
        assert_eq!(book.spread(), Some(dec("0.05")));
        assert_eq!(book.order_count(), 4);
    }

    #[test]
    fn remove_order_prunes_empty_level() {
        let mut book = book();
        let order = make_order(OrderSide::Buy, "0.40", Decimal::ONE);
        let id = order.id;

        book.insert_order(order).unwrap();
        assert_eq!(book.bid_depth(), 1);
        assert!(book.get(&id).is_some());

        let removed = book.remove_order(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(book.is_empty());
        assert_eq!(book.bid_depth(), 0);
        assert!(book.remove_order(&id).is_err());
    }

    #[test]
    fn duplicate_order_rejected() {
        let mut book = book();
        let order = make_order(OrderSide::Buy, "0.40", Decimal::ONE);
        let dup = order.clone();

        book.insert_order(order).unwrap();
        assert!(matches!(
            book.insert_order(dup),
            Err(KolmarketError::DuplicateOrder(_))
        ));
    }

    #[test]
    fn terminal_order_cannot_rest() {
        let mut book = book();
        let mut order = make_order(OrderSide::Sell, "0.40", Decimal::ONE);
        order.cancel(chrono::Utc::now()).unwrap();
        assert!(book.insert_order(order).is_err());
    }

    #[test]
    fn crossing_prices_best_first() {
        let mut book = book();
        for p in ["0.50", "0.45", "0.60"] {
            book.insert_order(make_order(OrderSide::Sell, p, Decimal::ONE)).unwrap();
        }
        assert_eq!(
            book.crossing_prices(OrderSide::Sell, dec("0.55")),
            vec![dec("0.45"), dec("0.50")]
        );
        assert!(book.crossing_prices(OrderSide::Buy, dec("0.10")).is_empty());
    }

    #[test]
    fn snapshot_aggregates_and_limits_depth() {
        let mut book = book();
        book.insert_order(make_order(OrderSide::Buy, "0.40", Decimal::new(2, 0))).unwrap();
        book.insert_order(make_order(OrderSide::Buy, "0.40", Decimal::new(3, 0))).unwrap();
        book.insert_order(make_order(OrderSide::Buy, "0.30", Decimal::ONE)).unwrap();
        book.insert_order(make_order(OrderSide::Sell, "0.55", Decimal::ONE)).unwrap();

        let snap = book.snapshot(None, 1);
        assert_eq!(snap.bids.len(), 1);
        assert_eq!(snap.bids[0].price, dec("0.40"));
        assert_eq!(snap.bids[0].quantity, Decimal::new(5, 0));
        assert_eq!(snap.bids[0].order_count, 2);
        assert_eq!(snap.asks.len(), 1);

        let bids_only = book.snapshot(Some(OrderSide::Buy), 10);
        assert_eq!(bids_only.bids.len(), 2);
        assert!(bids_only.asks.is_empty());
    }

    #[test]
    fn drain_all_returns_arrival_order() {
        let mut book = book();
        let mut a = make_order(OrderSide::Sell, "0.60", Decimal::ONE);
        a.sequence = book.next_sequence();
        let mut b = make_order(OrderSide::Buy, "0.40", Decimal::ONE);
        b.sequence = book.next_sequence();
        let (ida, idb) = (a.id, b.id);
        book.insert_order(a).unwrap();
        book.insert_order(b).unwrap();

        let drained = book.drain_all();
        assert_eq!(drained.iter().map(|o| o.id).collect::<Vec<_>>(), vec![ida, idb]);
        assert!(book.is_empty());
        assert_eq!(book.bid_depth() + book.ask_depth(), 0);
    }
}
