//! Signed placement, matching, cancellation, and the read side.

mod common;

use chrono::Duration;
use common::{Harness, Wallet, dec};
use kolmarket_types::*;

#[test]
fn taker_sweeps_levels_at_maker_prices() {
    let h = Harness::new();
    let (_, outcomes) = h.round_with_outcomes(0, 1);
    let outcome = outcomes[0].id;
    let (a, b, c) = (Wallet::new(), Wallet::new(), Wallet::new());

    h.place(&a, outcome, OrderSide::Sell, "0.40", "5").unwrap();
    h.place(&b, outcome, OrderSide::Sell, "0.45", "5").unwrap();
    let res = h.place(&c, outcome, OrderSide::Buy, "0.50", "8").unwrap();

    assert_eq!(res.fills.len(), 2);
    assert!(res.fills.iter().all(|f| f.price <= dec("0.50")));
    assert_eq!(res.fills[0].price, dec("0.40"));
    assert_eq!(res.fills[1].price, dec("0.45"));
    assert!(res.fills.iter().all(|f| f.match_id == res.fills[0].match_id));
    assert_eq!(res.order.status, OrderStatus::Filled);

    let book = h.ex.get_order_book(outcome, None, None).unwrap();
    assert!(book.bids.is_empty());
    assert_eq!(book.asks.len(), 1);
    assert_eq!(book.asks[0].quantity, dec("2"));

    let fills = h.ex.get_fills(outcome, None, None).unwrap();
    assert_eq!(fills[0].id, res.fills[1].id, "newest first");
}

#[test]
fn remaining_quantity_only_decreases() {
    let h = Harness::new();
    let (_, outcomes) = h.round_with_outcomes(0, 1);
    let outcome = outcomes[0].id;
    let maker = Wallet::new();
    let resting = h.place(&maker, outcome, OrderSide::Buy, "0.60", "10").unwrap().order;

    let mut last = resting.remaining_qty;
    for qty in ["3", "3", "3", "3"] {
        h.place(&Wallet::new(), outcome, OrderSide::Sell, "0.55", qty).unwrap();
        let now = h.ex.get_order(resting.id).unwrap();
        assert!(now.remaining_qty <= last);
        last = now.remaining_qty;
    }
    let done = h.ex.get_order(resting.id).unwrap();
    assert_eq!(done.status, OrderStatus::Filled);
    assert_eq!(done.filled_qty(), done.quantity);
}

#[test]
fn self_trade_is_skipped() {
    let h = Harness::new();
    let (_, outcomes) = h.round_with_outcomes(0, 1);
    let outcome = outcomes[0].id;
    let (me, other) = (Wallet::new(), Wallet::new());

    h.place(&me, outcome, OrderSide::Sell, "0.40", "5").unwrap();
    h.place(&other, outcome, OrderSide::Sell, "0.42", "5").unwrap();
    let res = h.place(&me, outcome, OrderSide::Buy, "0.50", "5").unwrap();

    assert_eq!(res.fills.len(), 1);
    assert_eq!(res.fills[0].maker, other.pubkey());
    let book = h.ex.get_order_book(outcome, Some(OrderSide::Sell), None).unwrap();
    assert_eq!(book.asks[0].price, dec("0.40"));
}

#[test]
fn nonce_reuse_is_rejected() {
    let h = Harness::new();
    let (_, outcomes) = h.round_with_outcomes(0, 1);
    let w = Wallet::new();
    let place = |key: &str| Command::PlaceOrder {
        outcome_id: outcomes[0].id,
        side: OrderSide::Buy,
        price: dec("0.3"),
        quantity: dec("1"),
        idempotency_key: key.into(),
    };

    h.ex.place_order(&w.sign_with_nonce(place("a"), "same", h.now())).unwrap();
    let err = h
        .ex
        .place_order(&w.sign_with_nonce(place("b"), "same", h.now()))
        .unwrap_err();
    assert!(matches!(err, KolmarketError::NonceReused { .. }));
    assert_eq!(err.reason_code(), "NONCE_REUSED");
    assert_eq!(err.http_status(), 409);
}

#[test]
fn rejected_commands_do_not_mutate() {
    let h = Harness::new();
    let (_, outcomes) = h.round_with_outcomes(0, 1);
    let outcome = outcomes[0].id;
    let w = Wallet::new();
    let cmd = |price: &str| Command::PlaceOrder {
        outcome_id: outcome,
        side: OrderSide::Buy,
        price: dec(price),
        quantity: dec("1"),
        idempotency_key: "x".into(),
    };

    // tampered payload
    let mut forged = w.sign(cmd("0.3"), h.now());
    forged.command = cmd("0.9");
    assert!(matches!(h.ex.place_order(&forged), Err(KolmarketError::InvalidSignature)));

    // stale
    let stale = w.sign(cmd("0.3"), h.now() - Duration::minutes(10));
    assert!(matches!(h.ex.place_order(&stale), Err(KolmarketError::CommandExpired { .. })));

    // out of range price passes the envelope but fails validation
    let bad = w.sign(cmd("1.2"), h.now());
    assert!(matches!(h.ex.place_order(&bad), Err(KolmarketError::InvalidOrder { .. })));

    // wrong action for the endpoint
    let cancel = w.sign(Command::CancelOrder { order_id: OrderId::new() }, h.now());
    assert!(matches!(
        h.ex.place_order(&cancel),
        Err(KolmarketError::InvalidField { field: "action", .. })
    ));

    let book = h.ex.get_order_book(outcome, None, None).unwrap();
    assert!(book.bids.is_empty() && book.asks.is_empty());
}

#[test]
fn idempotent_replay_returns_original() {
    let h = Harness::new();
    let (_, outcomes) = h.round_with_outcomes(0, 1);
    let w = Wallet::new();
    let cmd = Command::PlaceOrder {
        outcome_id: outcomes[0].id,
        side: OrderSide::Sell,
        price: dec("0.7"),
        quantity: dec("2"),
        idempotency_key: "client-42".into(),
    };

    let first = h.ex.place_order(&w.sign(cmd.clone(), h.now())).unwrap();
    let again = h.ex.place_order(&w.sign(cmd, h.now())).unwrap();
    assert!(again.replayed);
    assert_eq!(again.order.id, first.order.id);
    assert!(again.fills.is_empty());
    let book = h.ex.get_order_book(outcomes[0].id, None, None).unwrap();
    assert_eq!(book.asks[0].order_count, 1);
}

#[test]
fn cancel_by_owner_only_and_idempotent() {
    let h = Harness::new();
    let (_, outcomes) = h.round_with_outcomes(0, 1);
    let (owner, stranger) = (Wallet::new(), Wallet::new());
    let order = h.place(&owner, outcomes[0].id, OrderSide::Buy, "0.2", "4").unwrap().order;
    let cancel = Command::CancelOrder { order_id: order.id };

    let err = h.ex.cancel_order(&stranger.sign(cancel.clone(), h.now())).unwrap_err();
    assert!(matches!(err, KolmarketError::Unauthorized { .. }));

    let first = h.ex.cancel_order(&owner.sign(cancel.clone(), h.now())).unwrap();
    assert!(first.cancelled);
    let second = h.ex.cancel_order(&owner.sign(cancel, h.now())).unwrap();
    assert!(!second.cancelled);
    assert_eq!(second.order.status, OrderStatus::Cancelled);
}

#[test]
fn depth_and_limit_are_clamped() {
    let h = Harness::new();
    let (_, outcomes) = h.round_with_outcomes(0, 1);
    let outcome = outcomes[0].id;
    let w = Wallet::new();
    for p in ["0.10", "0.11", "0.12"] {
        h.place(&w, outcome, OrderSide::Buy, p, "1").unwrap();
    }

    assert_eq!(h.ex.get_order_book(outcome, None, Some(0)).unwrap().bids.len(), 1);
    assert_eq!(h.ex.get_order_book(outcome, None, Some(10_000)).unwrap().bids.len(), 3);
    assert_eq!(
        h.ex.get_order_book(outcome, None, Some(1)).unwrap().bids[0].price,
        dec("0.12")
    );
    assert!(h.ex.get_fills(outcome, Some(0), None).unwrap().is_empty());
    assert!(matches!(
        h.ex.get_order_book(OutcomeId::new(), None, None),
        Err(KolmarketError::OutcomeNotFound(_))
    ));
}

#[test]
fn orders_after_lock_ts_are_rejected() {
    let h = Harness::new();
    let (_, outcomes) = h.round_with_outcomes(0, 1);
    h.clock.advance(Duration::hours(2));
    let err = h
        .place(&Wallet::new(), outcomes[0].id, OrderSide::Buy, "0.3", "1")
        .unwrap_err();
    assert!(matches!(err, KolmarketError::RoundNotOpen { .. }));
}
