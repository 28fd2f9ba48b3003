//! Rounds, outcome markets, wager markets, and the tracked-KOL list.
//!
//! The registry is plain state. [`Exchange`](crate::Exchange) wraps it in a
//! lock and coordinates it with the engine; nothing here touches order
//! books.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use kolmarket_types::{
    FinalOutcome, KolmarketError, Market, MarketId, OutcomeId, OutcomeMarket,
    Result, Round, RoundId, RoundParams, RoundStatus, WalletPubkey, WindowKey,
};
use serde::{Deserialize, Serialize};

/// Tracking state of one KOL wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KolEntry {
    pub wallet: WalletPubkey,
    pub active: bool,
}

#[derive(Debug, Default)]
pub struct Registry {
    rounds: HashMap<RoundId, Round>,
    outcomes: HashMap<OutcomeId, OutcomeMarket>,
    round_outcomes: HashMap<RoundId, Vec<OutcomeId>>,
    markets: HashMap<MarketId, Market>,
    kols: HashMap<WalletPubkey, KolEntry>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =================================================================
    // Rounds and outcomes
    // =================================================================

    pub fn create_round(&mut self, params: RoundParams) -> Result<Round> {
        let round = Round::open(params)?;
        self.round_outcomes.insert(round.id, Vec::new());
        self.rounds.insert(round.id, round.clone());
        Ok(round)
    }

    /// Attach a new outcome market to an OPEN round.
    pub fn add_outcome(
        &mut self,
        round_id: RoundId,
        kol_wallet_address: WalletPubkey,
        question_text: String,
    ) -> Result<OutcomeMarket> {
        if question_text.trim().is_empty() {
            return Err(KolmarketError::InvalidField {
                field: "question_text",
                reason: "must not be empty".into(),
            });
        }
        let round = self.round(round_id)?;
        if round.status != RoundStatus::Open {
            return Err(KolmarketError::RoundNotOpen {
                round_id,
                status: round.status,
            });
        }
        let outcome = OutcomeMarket::new(round_id, kol_wallet_address, question_text);
        self.outcomes.insert(outcome.id, outcome.clone());
        self.round_outcomes.entry(round_id).or_default().push(outcome.id);
        Ok(outcome)
    }

    pub fn round(&self, round_id: RoundId) -> Result<&Round> {
        self.rounds
            .get(&round_id)
            .ok_or(KolmarketError::RoundNotFound(round_id))
    }

    pub fn outcome(&self, outcome_id: OutcomeId) -> Result<&OutcomeMarket> {
        self.outcomes
            .get(&outcome_id)
            .ok_or(KolmarketError::OutcomeNotFound(outcome_id))
    }

    /// Outcomes of a round in creation order.
    pub fn outcomes_of(&self, round_id: RoundId) -> Result<Vec<OutcomeMarket>> {
        let ids = self
            .round_outcomes
            .get(&round_id)
            .ok_or(KolmarketError::RoundNotFound(round_id))?;
        ids.iter()
            .map(|id| self.outcome(*id).cloned())
            .collect()
    }

    /// OPEN rounds with `lock_ts ≤ lock_before`, earliest first, at most
    /// `limit`. `only` restricts the search to a single round.
    #[must_use]
    pub fn rounds_due_for_lock(
        &self,
        only: Option<RoundId>,
        lock_before: DateTime<Utc>,
        limit: usize,
    ) -> Vec<RoundId> {
        let mut due: Vec<&Round> = self
            .rounds
            .values()
            .filter(|r| only.is_none_or(|id| r.id == id))
            .filter(|r| r.is_due_for_lock(lock_before))
            .collect();
        due.sort_by_key(|r| (r.lock_ts, r.id));
        due.into_iter().take(limit).map(|r| r.id).collect()
    }

    /// Flip a round and all its outcomes to LOCKED. Returns the outcome ids.
    pub fn lock_round(&mut self, round_id: RoundId) -> Result<Vec<OutcomeId>> {
        let round = self
            .rounds
            .get_mut(&round_id)
            .ok_or(KolmarketError::RoundNotFound(round_id))?;
        round.transition(RoundStatus::Locked)?;

        let ids = self.round_outcomes.get(&round_id).cloned().unwrap_or_default();
        for id in &ids {
            if let Some(outcome) = self.outcomes.get_mut(id) {
                outcome.status = RoundStatus::Locked;
            }
        }
        Ok(ids)
    }

    /// Record settlement of a LOCKED round: final outcomes, hashes, and
    /// the SETTLED status on the round and every outcome.
    pub fn settle_round(
        &mut self,
        round_id: RoundId,
        finals: &HashMap<OutcomeId, FinalOutcome>,
        snapshot_hash: String,
        inputs_hash: Option<String>,
    ) -> Result<Round> {
        let ids = self.round_outcomes.get(&round_id).cloned().unwrap_or_default();
        if let Some(missing) = ids.iter().find(|id| !finals.contains_key(id)) {
            return Err(KolmarketError::MissingResolution(*missing));
        }

        let round = self
            .rounds
            .get_mut(&round_id)
            .ok_or(KolmarketError::RoundNotFound(round_id))?;
        round.transition(RoundStatus::Settled)?;
        round.snapshot_hash = Some(snapshot_hash);
        round.inputs_hash = inputs_hash;
        let settled = round.clone();

        for id in &ids {
            if let Some(outcome) = self.outcomes.get_mut(id) {
                outcome.status = RoundStatus::Settled;
                outcome.final_outcome = finals.get(id).copied();
            }
        }
        Ok(settled)
    }

    // =================================================================
    // Wager markets
    // =================================================================

    pub fn create_market(
        &mut self,
        window_key: WindowKey,
        kol_wallet_address: WalletPubkey,
        escrow_wallet_address: WalletPubkey,
        closes_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Market> {
        if closes_at <= now {
            return Err(KolmarketError::InvalidField {
                field: "closes_at",
                reason: format!("{closes_at} is not in the future"),
            });
        }
        let market = Market::new(window_key, kol_wallet_address, escrow_wallet_address, closes_at, now);
        self.markets.insert(market.id, market.clone());
        Ok(market)
    }

    pub fn market(&self, market_id: MarketId) -> Result<&Market> {
        self.markets
            .get(&market_id)
            .ok_or(KolmarketError::MarketNotFound(market_id))
    }

    pub fn market_mut(&mut self, market_id: MarketId) -> Result<&mut Market> {
        self.markets
            .get_mut(&market_id)
            .ok_or(KolmarketError::MarketNotFound(market_id))
    }

    /// Open markets with `closes_at ≤ closes_before`, earliest first, at
    /// most `limit`. An empty `window_keys` matches every window.
    #[must_use]
    pub fn markets_due_for_close(
        &self,
        window_keys: &[WindowKey],
        closes_before: DateTime<Utc>,
        limit: usize,
    ) -> Vec<MarketId> {
        let mut due: Vec<&Market> = self
            .markets
            .values()
            .filter(|m| window_keys.is_empty() || window_keys.contains(&m.window_key))
            .filter(|m| m.is_due_for_close(closes_before))
            .collect();
        due.sort_by_key(|m| (m.closes_at, m.id));
        due.into_iter().take(limit).map(|m| m.id).collect()
    }

    pub fn close_market(&mut self, market_id: MarketId) -> Result<()> {
        self.market_mut(market_id)?.close()
    }

    pub fn cancel_market(&mut self, market_id: MarketId) -> Result<Market> {
        let market = self.market_mut(market_id)?;
        market.cancel()?;
        Ok(market.clone())
    }

    /// Markets eligible for hard deletion: those whose KOL is untracked or
    /// inactive, and terminal markets that closed before `cutoff`.
    #[must_use]
    pub fn cleanup_candidates(&self, cutoff: DateTime<Utc>) -> Vec<MarketId> {
        let mut candidates: Vec<&Market> = self
            .markets
            .values()
            .filter(|m| {
                let kol_tracked = self
                    .kols
                    .get(&m.kol_wallet_address)
                    .is_some_and(|k| k.active);
                !kol_tracked || (m.status.is_terminal() && m.closes_at < cutoff)
            })
            .collect();
        candidates.sort_by_key(|m| (m.closes_at, m.id));
        candidates.into_iter().map(|m| m.id).collect()
    }

    /// Remove markets for good. Returns how many existed.
    pub fn delete_markets(&mut self, ids: &[MarketId]) -> usize {
        ids.iter()
            .filter(|id| self.markets.remove(id).is_some())
            .count()
    }

    pub fn market_count(&self) -> usize {
        self.markets.len()
    }

    // =================================================================
    // KOL registry
    // =================================================================

    pub fn register_kol(&mut self, wallet: WalletPubkey, active: bool) -> KolEntry {
        let entry = KolEntry { wallet, active };
        self.kols.insert(wallet, entry);
        entry
    }

    #[must_use]
    pub fn kol(&self, wallet: &WalletPubkey) -> Option<KolEntry> {
        self.kols.get(wallet).copied()
    }
}
