//! A single price level in an outcome's order book.
//!
//! Orders at the same price are stored in FIFO order (time priority)
//! using a [`VecDeque`].

use std::collections::VecDeque;

use kolmarket_types::{Order, OrderId};
use rust_decimal::Decimal;

/// A single price level containing all resting orders at that price.
///
/// Orders are stored in arrival order (FIFO): the front of the deque
/// has the highest time priority and will be filled first.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    pub price: Decimal,
    /// Orders in time-priority order (front = oldest = highest priority).
    pub orders: VecDeque<Order>,
}

impl PriceLevel {
    #[must_use]
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
        }
    }

    /// Add an order to the back of this level (lowest time priority).
    pub fn push_back(&mut self, order: Order) {
        self.orders.push_back(order);
    }

    #[must_use]
    pub fn front(&self) -> Option<&Order> {
        self.orders.front()
    }

    /// Total remaining quantity across all orders at this level.
    #[must_use]
    pub fn total_quantity(&self) -> Decimal {
        self.orders.iter().map(|o| o.remaining_qty).sum()
    }

    pub fn remove_order(&mut self, order_id: &OrderId) -> Option<Order> {
        let pos = self.orders.iter().position(|o| o.id == *order_id)?;
        self.orders.remove(pos)
    }

    #[must_use]
    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == *order_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }
}

#[cfg(test)]
mod tests {
    use kolmarket_types::*;
    use rust_decimal::Decimal;

    use super::*;

    fn make_order(qty: Decimal, seq: u64) -> Order {
        let mut order = Order::dummy(OrderSide::Buy, Decimal::new(45, 2), qty);
        order.sequence = seq;
        order
    }

    #[test]
    fn fifo_front_is_oldest() {
        let mut level = PriceLevel::new(Decimal::new(45, 2));
        let o1 = make_order(Decimal::ONE, 0);
        let o2 = make_order(Decimal::ONE, 1);
        let id1 = o1.id;

        level.push_back(o1);
        level.push_back(o2);

        assert_eq!(level.len(), 2);
        assert_eq!(level.front().unwrap().id, id1);
    }

    #[test]
    fn total_quantity_uses_remaining() {
        let mut level = PriceLevel::new(Decimal::new(45, 2));
        let mut partially = make_order(Decimal::new(5, 0), 0);
        partially.remaining_qty = Decimal::new(2, 0);
        level.push_back(partially);
        level.push_back(make_order(Decimal::new(3, 0), 1));
        assert_eq!(level.total_quantity(), Decimal::new(5, 0));
    }

    #[test]
    fn remove_order_by_id() {
        let mut level = PriceLevel::new(Decimal::new(45, 2));
        let o1 = make_order(Decimal::ONE, 0);
        let o2 = make_order(Decimal::ONE, 1);
        let target_id = o2.id;

        level.push_back(o1);
        level.push_back(o2);

        assert_eq!(level.remove_order(&target_id).unwrap().id, target_id);
        assert_eq!(level.len(), 1);
        assert!(level.remove_order(&OrderId::new()).is_none());
    }

    #[test]
    fn empty_level() {
        let level = PriceLevel::new(Decimal::new(45, 2));
        assert!(level.is_empty());
        assert_eq!(level.total_quantity(), Decimal::ZERO);
        assert!(level.front().is_none());
    }
}
