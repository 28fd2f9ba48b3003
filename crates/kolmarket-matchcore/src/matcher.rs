//! Continuous price/time matcher.
//!
//! ```text
//! match_order(&mut OrderBook, taker, fee_bps, now) -> MatchResult
//! ```
//!
//! The taker walks the opposite side of the book from the best price
//! outward. At each crossing level, resting orders fill in arrival order at
//! the **maker's** price, so a taker never executes worse than its limit.
//! Any remainder rests in the book.
//!
//! ## Self-Trade Prevention
//!
//! A resting order owned by the taker's wallet is skipped: it stays in the
//! book untouched and matching continues with the next maker.

use chrono::{DateTime, Utc};
use kolmarket_types::{Fill, FillId, MatchId, Order, Result};

use crate::OrderBook;

/// Everything one placement produced.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Taker state after matching (and resting, if any remainder).
    pub taker: Order,
    /// Fills in execution order; all share one `match_id`.
    pub fills: Vec<Fill>,
    /// Post-fill state of every maker touched, in execution order.
    pub makers: Vec<Order>,
    /// Whether a remainder was rested in the book.
    pub rested: bool,
    /// Same-wallet makers skipped by self-trade prevention.
    pub self_trade_skips: usize,
}

impl MatchResult {
    #[must_use]
    pub fn filled_quantity(&self) -> rust_decimal::Decimal {
        self.fills.iter().map(|f| f.quantity).sum()
    }
}

/// Match an incoming order against `book`, then rest any remainder.
///
/// The taker must be active with `remaining_qty == quantity`; its
/// `sequence` is assigned here.
pub fn match_order(
    book: &mut OrderBook,
    mut taker: Order,
    fee_bps: u16,
    now: DateTime<Utc>,
) -> Result<MatchResult> {
    taker.sequence = book.next_sequence();
    let match_id = MatchId::new();
    let maker_side = taker.side.opposite();

    let mut fills = Vec::new();
    let mut makers = Vec::new();
    let mut self_trade_skips = 0usize;

    for price in book.crossing_prices(maker_side, taker.price) {
        if taker.is_filled() {
            break;
        }
        let Some(level) = book.level_mut(maker_side, price) else {
            continue;
        };

        let mut filled_makers = Vec::new();
        let mut i = 0;
        while i < level.orders.len() && !taker.is_filled() {
            let maker = &mut level.orders[i];
            if maker.user == taker.user {
                self_trade_skips += 1;
                tracing::warn!(
                    taker_order = %taker.id,
                    maker_order = %maker.id,
                    wallet = %taker.user.short(),
                    "self-trade skipped"
                );
                i += 1;
                continue;
            }

            let qty = taker.remaining_qty.min(maker.remaining_qty);
            maker.apply_fill(qty, now)?;
            taker.apply_fill(qty, now)?;

            let fill = Fill {
                id: FillId::new(),
                outcome_id: taker.outcome_id,
                taker_order_id: taker.id,
                taker: taker.user,
                maker_order_id: maker.id,
                maker: maker.user,
                taker_side: taker.side,
                price: maker.price,
                quantity: qty,
                fee_bps,
                fee_amount: Fill::compute_fee(maker.price, qty, fee_bps),
                match_id,
                created_at: now,
            };
            tracing::debug!(
                fill_id = %fill.id,
                price = %fill.price,
                qty = %fill.quantity,
                maker_order = %maker.id,
                "fill"
            );
            fills.push(fill);
            makers.push(maker.clone());

            if maker.is_filled() {
                filled_makers.push(maker.id);
                level.orders.remove(i);
            } else {
                i += 1;
            }
        }

        book.forget(&filled_makers);
        book.prune_level(maker_side, price);
    }

    let rested = !taker.is_filled();
    if rested {
        book.insert_order(taker.clone())?;
    }

    Ok(MatchResult {
        taker,
        fills,
        makers,
        rested,
        self_trade_skips,
    })
}
