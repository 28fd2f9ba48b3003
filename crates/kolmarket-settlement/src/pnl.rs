//! Realized P&L fold over raw trade legs.
//!
//! Read-side analytic used for KOL ranking, not a ledger. For each token a
//! running weighted-average cost basis (lamports per unit) is kept:
//!
//! - **BUY** adds to held quantity and total cost.
//! - **SELL** realizes `proceeds − sold × avg_cost` and reduces held
//!   quantity and cost basis proportionally.
//!
//! Selling more than is held clamps the cost removed to the remaining basis
//! and leaves inventory at zero, never negative. Such legs are counted in
//! [`PnlSummary::oversold_legs`].
//!
//! A sell whose realized delta is positive is a win, negative a loss; flat
//! sells count toward neither. The fold is pure and replayable.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kolmarket_types::constants;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegSide {
    Buy,
    Sell,
}

/// One swap leg of a wallet's trading history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeLeg {
    /// Token mint or symbol.
    pub token: String,
    pub side: LegSide,
    /// Units of the token bought or sold.
    pub token_amount: Decimal,
    /// SOL paid (buy) or received (sell), in lamports.
    pub sol_amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Running position in one token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPosition {
    pub held: Decimal,
    /// Total cost basis of `held`, in lamports.
    pub cost_basis: Decimal,
    pub realized_lamports: Decimal,
}

impl TokenPosition {
    /// Weighted-average cost in lamports per unit; zero when flat.
    #[must_use]
    pub fn avg_cost(&self) -> Decimal {
        if self.held.is_zero() {
            Decimal::ZERO
        } else {
            self.cost_basis / self.held
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnlSummary {
    pub realized_lamports: Decimal,
    pub wins: u32,
    pub losses: u32,
    pub tx_count: u32,
    /// Sells that exceeded the held quantity and were clamped.
    pub oversold_legs: u32,
    pub positions: BTreeMap<String, TokenPosition>,
}

impl PnlSummary {
    #[must_use]
    pub fn realized_sol(&self) -> Decimal {
        self.realized_lamports / Decimal::from(constants::LAMPORTS_PER_SOL)
    }

    /// Realized profit in USD at `sol_usd_price`.
    #[must_use]
    pub fn to_usd(&self, sol_usd_price: Decimal) -> Decimal {
        self.realized_sol() * sol_usd_price
    }
}

/// Fold `legs` into a realized P&L summary.
///
/// Legs are ordered by timestamp first (stable, so same-instant legs keep
/// their input order).
#[must_use]
pub fn realized_pnl(legs: &[TradeLeg]) -> PnlSummary {
    let mut ordered: Vec<&TradeLeg> = legs.iter().collect();
    ordered.sort_by_key(|l| l.timestamp);

    let mut summary = PnlSummary::default();
    for leg in ordered {
        summary.tx_count += 1;
        let pos = summary.positions.entry(leg.token.clone()).or_default();

        match leg.side {
            LegSide::Buy => {
                pos.held += leg.token_amount;
                pos.cost_basis += leg.sol_amount;
            }
            LegSide::Sell => {
                let avg = pos.avg_cost();
                let sold = if leg.token_amount > pos.held {
                    summary.oversold_legs += 1;
                    tracing::warn!(
                        token = %leg.token,
                        selling = %leg.token_amount,
                        held = %pos.held,
                        "oversell clamped to held quantity"
                    );
                    pos.held
                } else {
                    leg.token_amount
                };

                let cost_removed = if sold == pos.held {
                    pos.cost_basis
                } else {
                    sold * avg
                };
                let delta = leg.sol_amount - cost_removed;

                pos.held -= sold;
                pos.cost_basis -= cost_removed;
                pos.realized_lamports += delta;
                summary.realized_lamports += delta;

                if delta > Decimal::ZERO {
                    summary.wins += 1;
                } else if delta < Decimal::ZERO {
                    summary.losses += 1;
                }
            }
        }
    }
    summary
}
