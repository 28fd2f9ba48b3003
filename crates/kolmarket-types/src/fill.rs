//! Fill records produced by the matching engine.
//!
//! A [`Fill`] is the immutable record of one match between a taker and a
//! resting maker at the maker's price.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::{FillId, MatchId, OrderId, OrderSide, OutcomeId, WalletPubkey, constants};

/// One executed match. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub id: FillId,
    pub outcome_id: OutcomeId,
    /// The incoming order that triggered the match.
    pub taker_order_id: OrderId,
    pub taker: WalletPubkey,
    /// The resting order matched against.
    pub maker_order_id: OrderId,
    pub maker: WalletPubkey,
    pub taker_side: OrderSide,
    /// Execution price (always the maker's limit price).
    pub price: Decimal,
    pub quantity: Decimal,
    /// Taker fee rate applied to this fill.
    pub fee_bps: u16,
    /// Fee owed by the taker, netted at settlement.
    pub fee_amount: Decimal,
    /// Shared by every fill produced by the same taker placement.
    pub match_id: MatchId,
    pub created_at: DateTime<Utc>,
}

impl Fill {
    /// Fee on `price × quantity` at `fee_bps`, rounded half-up to the
    /// price precision.
    #[must_use]
    pub fn compute_fee(price: Decimal, quantity: Decimal, fee_bps: u16) -> Decimal {
        (price * quantity * Decimal::from(fee_bps) / Decimal::from(constants::BPS_DENOMINATOR))
            .round_dp_with_strategy(constants::PRICE_PRECISION, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Collateral value exchanged: `price × quantity`.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }

    /// The wallet that bought YES units in this fill.
    #[must_use]
    pub fn buyer(&self) -> WalletPubkey {
        match self.taker_side {
            OrderSide::Buy => self.taker,
            OrderSide::Sell => self.maker,
        }
    }

    /// The wallet that sold YES units (is long NO) in this fill.
    #[must_use]
    pub fn seller(&self) -> WalletPubkey {
        match self.taker_side {
            OrderSide::Buy => self.maker,
            OrderSide::Sell => self.taker,
        }
    }
}

impl std::fmt::Display for Fill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Fill[{}] {} {} {} @ {} fee {}",
            self.id, self.outcome_id, self.taker_side, self.quantity, self.price, self.fee_amount,
        )
    }
}
