//! Round payout computation.
//!
//! Every fill gives the buyer `q` YES units and the seller `q` NO units.
//! At settlement, units on the resolved side pay 1 each and the rest pay
//! nothing. Per `(user, outcome)`:
//!
//! ```text
//! gross = winning units
//! rake  = gross × rake_bps / 10_000
//! fees  = Σ taker fees paid on that outcome
//! net   = max(gross − rake − fees, 0)
//! ```
//!
//! Trade collateral (`price × quantity` from buyers, the complement from
//! sellers) is assumed to be escrowed outside the exchange core; only the
//! payouts are credited here.
//!
//! The report is deterministic (lines sorted by outcome, then wallet), and
//! its `snapshot_hash` commits to the whole payout set.

use std::collections::{BTreeMap, HashMap};

use kolmarket_matchcore::fill_root_hex;
use kolmarket_types::{
    FinalOutcome, Fill, KolmarketError, OutcomeId, OutcomeMarket, Result, Round,
    RoundId, WalletPubkey, constants,
};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Settlement facts for one outcome market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSettlement {
    pub outcome_id: OutcomeId,
    pub final_outcome: FinalOutcome,
    pub fill_count: usize,
    /// Hex root over the outcome's fills at settlement time.
    pub fills_root: String,
}

/// What one wallet receives for one outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutLine {
    pub outcome_id: OutcomeId,
    pub user: WalletPubkey,
    pub yes_units: Decimal,
    pub no_units: Decimal,
    pub gross: Decimal,
    pub rake: Decimal,
    pub fees: Decimal,
    pub net: Decimal,
}

/// Full payout set of a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutReport {
    pub round_id: RoundId,
    pub rake_bps: u16,
    pub outcomes: Vec<OutcomeSettlement>,
    pub lines: Vec<PayoutLine>,
    pub total_gross: Decimal,
    pub total_rake: Decimal,
    pub total_fees: Decimal,
    pub total_net: Decimal,
}

impl PayoutReport {
    /// Hex SHA-256 over the canonical JSON of the report.
    pub fn snapshot_hash(&self) -> Result<String> {
        let body = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(b"kolmarket:round_snapshot:v1:");
        hasher.update(&body);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Net credit per wallet across all outcomes, zero lines omitted.
    #[must_use]
    pub fn credits(&self) -> BTreeMap<WalletPubkey, Decimal> {
        let mut credits = BTreeMap::new();
        for line in self.lines.iter().filter(|l| l.net > Decimal::ZERO) {
            *credits.entry(line.user).or_insert(Decimal::ZERO) += line.net;
        }
        credits
    }
}

#[derive(Default)]
struct Position {
    yes: Decimal,
    no: Decimal,
    fees: Decimal,
}

fn bps_of(amount: Decimal, bps: u16) -> Decimal {
    (amount * Decimal::from(bps) / Decimal::from(constants::BPS_DENOMINATOR))
        .round_dp_with_strategy(constants::PRICE_PRECISION, RoundingStrategy::MidpointAwayFromZero)
}

/// Compute the payout report for `round`.
///
/// `fills` maps each outcome to its fills; an outcome without an entry
/// had no trades. Every outcome needs a resolution.
pub fn compute_round_payouts(
    round: &Round,
    outcomes: &[OutcomeMarket],
    resolutions: &HashMap<OutcomeId, FinalOutcome>,
    fills: &HashMap<OutcomeId, Vec<Fill>>,
) -> Result<PayoutReport> {
    let mut settled = Vec::with_capacity(outcomes.len());
    let mut positions: BTreeMap<(OutcomeId, WalletPubkey), Position> = BTreeMap::new();

    let mut sorted: Vec<&OutcomeMarket> = outcomes.iter().collect();
    sorted.sort_by_key(|o| o.id);

    for outcome in sorted {
        if outcome.round_id != round.id {
            return Err(KolmarketError::Internal(format!(
                "outcome {} does not belong to round {}",
                outcome.id, round.id
            )));
        }
        let final_outcome = *resolutions
            .get(&outcome.id)
            .ok_or(KolmarketError::MissingResolution(outcome.id))?;
        let outcome_fills = fills.get(&outcome.id).map_or(&[][..], Vec::as_slice);

        for fill in outcome_fills {
            positions
                .entry((outcome.id, fill.buyer()))
                .or_default()
                .yes += fill.quantity;
            positions
                .entry((outcome.id, fill.seller()))
                .or_default()
                .no += fill.quantity;
            positions
                .entry((outcome.id, fill.taker))
                .or_default()
                .fees += fill.fee_amount;
        }

        settled.push(OutcomeSettlement {
            outcome_id: outcome.id,
            final_outcome,
            fill_count: outcome_fills.len(),
            fills_root: fill_root_hex(outcome_fills),
        });
    }

    let finals: HashMap<OutcomeId, FinalOutcome> = settled
        .iter()
        .map(|s| (s.outcome_id, s.final_outcome))
        .collect();

    let mut lines = Vec::with_capacity(positions.len());
    for ((outcome_id, user), pos) in positions {
        let final_outcome = finals
            .get(&outcome_id)
            .copied()
            .ok_or(KolmarketError::MissingResolution(outcome_id))?;
        let gross = match final_outcome {
            FinalOutcome::Yes => pos.yes,
            FinalOutcome::No => pos.no,
        };
        let rake = bps_of(gross, round.rake_bps);
        let net = (gross - rake - pos.fees).max(Decimal::ZERO);
        lines.push(PayoutLine {
            outcome_id,
            user,
            yes_units: pos.yes,
            no_units: pos.no,
            gross,
            rake,
            fees: pos.fees,
            net,
        });
    }

    let sum = |f: fn(&PayoutLine) -> Decimal| lines.iter().map(f).sum::<Decimal>();
    let report = PayoutReport {
        round_id: round.id,
        rake_bps: round.rake_bps,
        total_gross: sum(|l| l.gross),
        total_rake: sum(|l| l.rake),
        total_fees: sum(|l| l.fees),
        total_net: sum(|l| l.net),
        outcomes: settled,
        lines,
    };
    Ok(report)
}
