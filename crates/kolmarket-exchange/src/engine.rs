//! Per-outcome matching engine.
//!
//! Every outcome has its own [`OutcomeBook`] behind a `parking_lot::Mutex`,
//! looked up through a read-mostly map, so independent outcomes match in
//! parallel while placements on one outcome serialize.
//!
//! ## Lock Order
//!
//! ```text
//! outcome book → idempotency keys → order records
//! ```
//!
//! No path takes an outcome book while holding either of the other two.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kolmarket_matchcore::{OrderBook, OrderBookSnapshot, match_order};
use kolmarket_types::{
    Fill, FillId, KolmarketError, Order, OrderId, OrderSide, OrderStatus, OutcomeId, Result,
    RoundId, RoundStatus, WalletPubkey,
};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Book, fills, and trading status of one outcome market.
#[derive(Debug)]
pub struct OutcomeBook {
    pub round_id: RoundId,
    pub status: RoundStatus,
    book: OrderBook,
    /// Chronological.
    fills: Vec<Fill>,
}

/// Outcome of a placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderResult {
    pub order: Order,
    pub fills: Vec<Fill>,
    /// The idempotency key was already used; `order` is the original and
    /// nothing new happened.
    pub replayed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResult {
    pub order: Order,
    /// `false` when the order was already cancelled.
    pub cancelled: bool,
}

/// What a new order should look like. Terms are validated by the engine.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub outcome_id: OutcomeId,
    pub user: WalletPubkey,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub idempotency_key: String,
}

#[derive(Debug, Default)]
pub struct MatchingEngine {
    fee_bps: u16,
    books: RwLock<HashMap<OutcomeId, Arc<Mutex<OutcomeBook>>>>,
    idempotency: Mutex<HashMap<(WalletPubkey, String), OrderId>>,
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl MatchingEngine {
    #[must_use]
    pub fn new(fee_bps: u16) -> Self {
        Self {
            fee_bps,
            ..Self::default()
        }
    }

    /// Create the (empty, OPEN) book of a new outcome.
    pub fn open_book(&self, outcome_id: OutcomeId, round_id: RoundId) -> Result<()> {
        match self.books.write().entry(outcome_id) {
            Entry::Occupied(_) => Err(KolmarketError::Internal(format!(
                "book for {outcome_id} already exists"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(OutcomeBook {
                    round_id,
                    status: RoundStatus::Open,
                    book: OrderBook::new(outcome_id),
                    fills: Vec::new(),
                })));
                Ok(())
            }
        }
    }

    fn book(&self, outcome_id: OutcomeId) -> Result<Arc<Mutex<OutcomeBook>>> {
        self.books
            .read()
            .get(&outcome_id)
            .cloned()
            .ok_or(KolmarketError::OutcomeNotFound(outcome_id))
    }

    // =================================================================
    // Mutations
    // =================================================================

    /// Match `new` against its outcome's book and rest any remainder.
    ///
    /// A reused `(user, idempotency_key)` returns the original order with
    /// no fills and `replayed = true`.
    pub fn place(&self, new: NewOrder, now: DateTime<Utc>) -> Result<PlaceOrderResult> {
        let taker = Order::new_limit(
            new.outcome_id,
            new.user,
            new.side,
            new.price,
            new.quantity,
            new.idempotency_key,
            now,
        )?;
        let book = self.book(new.outcome_id)?;
        let mut book = book.lock();

        {
            let mut keys = self.idempotency.lock();
            match keys.entry((taker.user, taker.idempotency_key.clone())) {
                Entry::Occupied(existing) => {
                    let original = self.order(*existing.get())?;
                    tracing::info!(
                        order_id = %original.id,
                        key = %taker.idempotency_key,
                        "placement replayed"
                    );
                    return Ok(PlaceOrderResult {
                        order: original,
                        fills: Vec::new(),
                        replayed: true,
                    });
                }
                Entry::Vacant(slot) => {
                    if book.status != RoundStatus::Open {
                        return Err(KolmarketError::OutcomeNotOpen {
                            outcome_id: new.outcome_id,
                            status: book.status,
                        });
                    }
                    slot.insert(taker.id);
                    self.orders.write().insert(taker.id, taker.clone());
                }
            }
        }

        let result = match match_order(&mut book.book, taker, self.fee_bps, now) {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "matching failed");
                return Err(e);
            }
        };
        book.fills.extend(result.fills.iter().cloned());

        {
            let mut orders = self.orders.write();
            for maker in &result.makers {
                orders.insert(maker.id, maker.clone());
            }
            orders.insert(result.taker.id, result.taker.clone());
        }

        tracing::info!(
            order_id = %result.taker.id,
            outcome_id = %result.taker.outcome_id,
            side = %result.taker.side,
            price = %result.taker.price,
            qty = %result.taker.quantity,
            filled = %result.filled_quantity(),
            fills = result.fills.len(),
            status = %result.taker.status,
            "order placed"
        );

        Ok(PlaceOrderResult {
            order: result.taker,
            fills: result.fills,
            replayed: false,
        })
    }

    /// Cancel a resting order owned by `user`.
    pub fn cancel(&self, order_id: OrderId, user: WalletPubkey, now: DateTime<Utc>) -> Result<CancelResult> {
        let outcome_id = {
            let orders = self.orders.read();
            let order = orders
                .get(&order_id)
                .ok_or(KolmarketError::OrderNotFound(order_id))?;
            if order.user != user {
                return Err(KolmarketError::Unauthorized {
                    reason: format!("order {order_id} belongs to another wallet"),
                });
            }
            order.outcome_id
        };

        let book = self.book(outcome_id)?;
        let mut book = book.lock();

        // Re-read under the book lock; a fill may have landed meanwhile.
        let current = self
            .orders
            .read()
            .get(&order_id)
            .cloned()
            .ok_or(KolmarketError::OrderNotFound(order_id))?;
        match current.status {
            OrderStatus::Cancelled => {
                return Ok(CancelResult {
                    order: current,
                    cancelled: false,
                });
            }
            OrderStatus::Filled | OrderStatus::Expired => {
                return Err(KolmarketError::OrderNotActive {
                    order_id,
                    status: current.status,
                });
            }
            OrderStatus::Open | OrderStatus::PartiallyFilled => {}
        }

        let mut order = book.book.remove_order(&order_id)?;
        order.cancel(now)?;
        self.orders.write().insert(order_id, order.clone());

        tracing::info!(
            order_id = %order_id,
            voided = %order.remaining_qty,
            "order cancelled"
        );
        Ok(CancelResult {
            order,
            cancelled: true,
        })
    }

    /// Move an outcome's book to `status` and expire everything resting.
    /// Returns the number of orders expired.
    ///
    /// The status flips under the book's lock, so a concurrent placement
    /// either completes first (and is expired here) or is rejected.
    pub fn freeze_outcome(&self, outcome_id: OutcomeId, status: RoundStatus, now: DateTime<Utc>) -> Result<usize> {
        let book = self.book(outcome_id)?;
        let mut book = book.lock();
        book.status = status;

        let resting = book.book.drain_all();
        let expired = resting.len();
        let mut orders = self.orders.write();
        for mut order in resting {
            order.expire(now)?;
            orders.insert(order.id, order);
        }
        if expired > 0 {
            tracing::info!(outcome_id = %outcome_id, expired, status = %status, "resting orders expired");
        }
        Ok(expired)
    }

    // =================================================================
    // Reads
    // =================================================================

    pub fn order_book(&self, outcome_id: OutcomeId, side: Option<OrderSide>, depth: usize) -> Result<OrderBookSnapshot> {
        let book = self.book(outcome_id)?;
        let snapshot = book.lock().book.snapshot(side, depth);
        Ok(snapshot)
    }

    /// Newest fills first, at most `limit`. With `before`, only fills
    /// recorded strictly earlier than that fill are returned.
    pub fn fills(&self, outcome_id: OutcomeId, limit: usize, before: Option<FillId>) -> Result<Vec<Fill>> {
        let book = self.book(outcome_id)?;
        let book = book.lock();
        let end = match before {
            None => book.fills.len(),
            Some(cursor) => book
                .fills
                .iter()
                .position(|f| f.id == cursor)
                .ok_or_else(|| KolmarketError::InvalidField {
                    field: "before",
                    reason: format!("unknown fill {cursor} for outcome {outcome_id}"),
                })?,
        };
        Ok(book.fills[..end].iter().rev().take(limit).cloned().collect())
    }

    /// The order already placed under `(user, key)`, if any.
    pub fn replayed_order(&self, user: &WalletPubkey, key: &str) -> Result<Option<Order>> {
        let order_id = self
            .idempotency
            .lock()
            .get(&(*user, key.to_string()))
            .copied();
        order_id.map(|id| self.order(id)).transpose()
    }

    /// Every fill of an outcome, oldest first.
    pub fn all_fills(&self, outcome_id: OutcomeId) -> Result<Vec<Fill>> {
        let book = self.book(outcome_id)?;
        let fills = book.lock().fills.clone();
        Ok(fills)
    }

    pub fn order(&self, order_id: OrderId) -> Result<Order> {
        self.orders
            .read()
            .get(&order_id)
            .cloned()
            .ok_or(KolmarketError::OrderNotFound(order_id))
    }

    pub fn outcome_status(&self, outcome_id: OutcomeId) -> Result<RoundStatus> {
        let book = self.book(outcome_id)?;
        let status = book.lock().status;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn engine_with_book() -> (MatchingEngine, OutcomeId) {
        let engine = MatchingEngine::new(100);
        let outcome = OutcomeId::new();
        engine.open_book(outcome, RoundId::new()).unwrap();
        (engine, outcome)
    }

    fn new_order(outcome: OutcomeId, user: u8, side: OrderSide, price: &str, qty: &str, key: &str) -> NewOrder {
        NewOrder {
            outcome_id: outcome,
            user: WalletPubkey([user; 32]),
            side,
            price: dec(price),
            quantity: dec(qty),
            idempotency_key: key.into(),
        }
    }

    #[test]
    fn cross_fills_at_maker_price_with_fee() {
        let (engine, outcome) = engine_with_book();
        engine.place(new_order(outcome, 1, OrderSide::Sell, "0.40", "10", "a"), Utc::now()).unwrap();
        let res = engine
            .place(new_order(outcome, 2, OrderSide::Buy, "0.55", "4", "b"), Utc::now())
            .unwrap();

        assert_eq!(res.fills.len(), 1);
        assert_eq!(res.fills[0].price, dec("0.40"));
        assert_eq!(res.fills[0].fee_amount, dec("0.016"));
        assert_eq!(res.order.status, OrderStatus::Filled);

        let maker = engine.order(res.fills[0].maker_order_id).unwrap();
        assert_eq!(maker.status, OrderStatus::PartiallyFilled);
        assert_eq!(maker.remaining_qty, dec("6"));
    }

    #[test]
    fn replayed_key_returns_original_without_fills() {
        let (engine, outcome) = engine_with_book();
        let first = engine
            .place(new_order(outcome, 1, OrderSide::Buy, "0.30", "5", "k1"), Utc::now())
            .unwrap();
        let again = engine
            .place(new_order(outcome, 1, OrderSide::Buy, "0.35", "9", "k1"), Utc::now())
            .unwrap();

        assert!(again.replayed);
        assert_eq!(again.order.id, first.order.id);
        assert_eq!(again.order.price, dec("0.30"));
        assert_eq!(engine.order_book(outcome, None, 10).unwrap().bids.len(), 1);

        // same key, different wallet: independent
        let other = engine
            .place(new_order(outcome, 2, OrderSide::Buy, "0.30", "5", "k1"), Utc::now())
            .unwrap();
        assert!(!other.replayed);
    }

    #[test]
    fn replay_survives_a_frozen_book() {
        let (engine, outcome) = engine_with_book();
        let first = engine
            .place(new_order(outcome, 1, OrderSide::Sell, "0.60", "2", "once"), Utc::now())
            .unwrap();
        engine.freeze_outcome(outcome, RoundStatus::Locked, Utc::now()).unwrap();

        let again = engine
            .place(new_order(outcome, 1, OrderSide::Sell, "0.60", "2", "once"), Utc::now())
            .unwrap();
        assert!(again.replayed);
        assert_eq!(again.order.id, first.order.id);
        assert_eq!(again.order.status, OrderStatus::Expired);
        assert_eq!(
            engine.replayed_order(&WalletPubkey([1; 32]), "once").unwrap().map(|o| o.id),
            Some(first.order.id)
        );

        let fresh = engine
            .place(new_order(outcome, 1, OrderSide::Sell, "0.60", "2", "new"), Utc::now())
            .unwrap_err();
        assert!(matches!(fresh, KolmarketError::OutcomeNotOpen { .. }));
        assert!(engine.replayed_order(&WalletPubkey([1; 32]), "new").unwrap().is_none());
    }

    #[test]
    fn cancel_rules() {
        let (engine, outcome) = engine_with_book();
        let resting = engine
            .place(new_order(outcome, 1, OrderSide::Buy, "0.30", "5", "r"), Utc::now())
            .unwrap()
            .order;

        let err = engine.cancel(resting.id, WalletPubkey([9; 32]), Utc::now()).unwrap_err();
        assert!(matches!(err, KolmarketError::Unauthorized { .. }));

        let first = engine.cancel(resting.id, WalletPubkey([1; 32]), Utc::now()).unwrap();
        assert!(first.cancelled);
        assert_eq!(first.order.status, OrderStatus::Cancelled);
        let second = engine.cancel(resting.id, WalletPubkey([1; 32]), Utc::now()).unwrap();
        assert!(!second.cancelled);
        assert!(engine.order_book(outcome, None, 10).unwrap().bids.is_empty());

        engine.place(new_order(outcome, 2, OrderSide::Sell, "0.50", "1", "s"), Utc::now()).unwrap();
        let taker = engine
            .place(new_order(outcome, 3, OrderSide::Buy, "0.50", "1", "t"), Utc::now())
            .unwrap();
        let filled_maker = taker.fills[0].maker_order_id;
        let err = engine.cancel(filled_maker, WalletPubkey([2; 32]), Utc::now()).unwrap_err();
        assert!(matches!(err, KolmarketError::OrderNotActive { status: OrderStatus::Filled, .. }));
    }

    #[test]
    fn locked_outcome_expires_and_rejects() {
        let (engine, outcome) = engine_with_book();
        let resting = engine
            .place(new_order(outcome, 1, OrderSide::Buy, "0.30", "5", "r"), Utc::now())
            .unwrap()
            .order;

        assert_eq!(engine.freeze_outcome(outcome, RoundStatus::Locked, Utc::now()).unwrap(), 1);
        assert_eq!(engine.order(resting.id).unwrap().status, OrderStatus::Expired);
        assert_eq!(engine.freeze_outcome(outcome, RoundStatus::Locked, Utc::now()).unwrap(), 0);

        let err = engine
            .place(new_order(outcome, 2, OrderSide::Sell, "0.30", "5", "late"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, KolmarketError::OutcomeNotOpen { status: RoundStatus::Locked, .. }));
        assert!(matches!(
            engine.cancel(resting.id, WalletPubkey([1; 32]), Utc::now()),
            Err(KolmarketError::OrderNotActive { status: OrderStatus::Expired, .. })
        ));
    }

    #[test]
    fn fills_feed_paginates_newest_first() {
        let (engine, outcome) = engine_with_book();
        engine.place(new_order(outcome, 1, OrderSide::Sell, "0.40", "10", "m"), Utc::now()).unwrap();
        for i in 0..5 {
            engine
                .place(new_order(outcome, 2, OrderSide::Buy, "0.40", "1", &format!("t{i}")), Utc::now())
                .unwrap();
        }

        let all = engine.all_fills(outcome).unwrap();
        let page = engine.fills(outcome, 2, None).unwrap();
        assert_eq!(page.iter().map(|f| f.id).collect::<Vec<_>>(), vec![all[4].id, all[3].id]);

        let next = engine.fills(outcome, 2, Some(page[1].id)).unwrap();
        assert_eq!(next.iter().map(|f| f.id).collect::<Vec<_>>(), vec![all[2].id, all[1].id]);

        assert!(engine.fills(outcome, 10, Some(all[0].id)).unwrap().is_empty());
        assert!(engine.fills(outcome, 10, Some(FillId::new())).is_err());
    }

    #[test]
    fn concurrent_takers_never_overfill_a_maker() {
        let (engine, outcome) = engine_with_book();
        let engine = Arc::new(engine);
        let maker = engine
            .place(new_order(outcome, 1, OrderSide::Sell, "0.50", "10", "m"), Utc::now())
            .unwrap()
            .order;

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    engine
                        .place(
                            new_order(outcome, 10 + i, OrderSide::Buy, "0.50", "3", "t"),
                            Utc::now(),
                        )
                        .unwrap()
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let filled: Decimal = engine.all_fills(outcome).unwrap().iter().map(|f| f.quantity).sum();
        assert_eq!(filled, dec("10"));
        let maker = engine.order(maker.id).unwrap();
        assert_eq!(maker.status, OrderStatus::Filled);
        assert!(maker.remaining_qty.is_zero());
    }
}
