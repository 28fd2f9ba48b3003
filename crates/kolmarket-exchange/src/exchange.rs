//! The exchange facade.
//!
//! [`Exchange`] owns every component and is the only way state changes.
//! Wallet mutations arrive as [`SignedCommand`]s and pass the
//! [`CommandVerifier`] first; admin operations and sweeps check the halt
//! switch directly. The facade is `Send + Sync` and meant to be shared
//! through an `Arc`.
//!
//! ## Lock Discipline
//!
//! The registry lock and outcome-book locks are never held together. Round
//! lock and settlement flip the registry first, then each outcome's book
//! under its own lock. Withdrawal proposals hold no lock while awaiting
//! the escrow.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kolmarket_ingress::{
    Clock, CommandVerifier, HaltStore, HaltSwitch, InMemoryHaltStore, InMemoryNonceStore,
    NonceStore, SystemClock, VerifierConfig,
};
use kolmarket_matchcore::OrderBookSnapshot;
use kolmarket_settlement::{
    IdempotencyGuard, MultisigClient, PayoutReport, WithdrawalCoordinator, compute_round_payouts,
    resolve_market,
};
use kolmarket_types::{
    Command, ExchangeConfig, Fill, FillId, FinalOutcome, HaltState, KolmarketError, Market,
    MarketId, MarketResolution, Order, OrderId, OrderSide, OutcomeId, OutcomeMarket, Result,
    Round, RoundId, RoundParams, RoundStatus, SignedCommand, WalletPubkey, WindowKey,
    Withdrawal, WithdrawalId, WithdrawalStatus, constants, validate_tx_signature,
};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::engine::{CancelResult, MatchingEngine, NewOrder, PlaceOrderResult};
use crate::registry::{KolEntry, Registry};
use crate::withdrawals::WithdrawalLedger;

// =================================================================
// Reports
// =================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRoundsReport {
    /// Rounds locked (or, in a dry run, that would be).
    pub locked: Vec<RoundId>,
    pub expired_orders: usize,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseMarketsReport {
    pub closed_count: usize,
    pub market_ids: Vec<MarketId>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub candidates: Vec<MarketId>,
    pub deleted: usize,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleRoundReport {
    pub round: Round,
    /// The round was settled before this call; nothing was credited.
    pub already_settled: bool,
    /// Present only when this call performed the settlement.
    pub payouts: Option<PayoutReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveMarketReport {
    pub market: Market,
    pub already_settled: bool,
}

// =================================================================
// Exchange
// =================================================================

pub struct Exchange<M> {
    config: ExchangeConfig,
    clock: Arc<dyn Clock>,
    halt: Arc<HaltSwitch>,
    verifier: CommandVerifier,
    registry: RwLock<Registry>,
    engine: MatchingEngine,
    settled_rounds: Mutex<IdempotencyGuard<RoundId>>,
    ledger: Mutex<WithdrawalLedger>,
    coordinator: WithdrawalCoordinator<M>,
}

impl<M> std::fmt::Debug for Exchange<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<M: MultisigClient> Exchange<M> {
    /// Build an exchange over the given stores. The config is validated.
    pub fn new(
        config: ExchangeConfig,
        clock: Arc<dyn Clock>,
        halt_store: Box<dyn HaltStore>,
        nonces: Arc<dyn NonceStore>,
        multisig: M,
    ) -> Result<Self> {
        config.validate()?;
        let halt = Arc::new(HaltSwitch::new(
            halt_store,
            Duration::from_millis(config.halt_cache_ttl_ms),
        ));
        let verifier = CommandVerifier::new(VerifierConfig::from(&config), Arc::clone(&halt), nonces);
        let coordinator = WithdrawalCoordinator::new(multisig, config.escrow.clone());
        tracing::info!(
            engine = constants::ENGINE_NAME,
            version = constants::VERSION,
            taker_fee_bps = config.taker_fee_bps,
            enforce_nonces = config.enforce_nonces,
            "exchange started"
        );
        Ok(Self {
            engine: MatchingEngine::new(config.taker_fee_bps),
            config,
            clock,
            halt,
            verifier,
            registry: RwLock::new(Registry::new()),
            settled_rounds: Mutex::new(IdempotencyGuard::new(
                constants::SETTLEMENT_IDEMPOTENCY_CACHE_SIZE,
            )),
            ledger: Mutex::new(WithdrawalLedger::new()),
            coordinator,
        })
    }

    /// Everything in memory, on the wall clock.
    pub fn in_memory(config: ExchangeConfig, multisig: M) -> Result<Self> {
        Self::new(
            config,
            Arc::new(SystemClock),
            Box::new(InMemoryHaltStore::new()),
            Arc::new(InMemoryNonceStore::new()),
            multisig,
        )
    }

    /// Swap the coordinator's poll interval (tests and slow chains).
    #[must_use]
    pub fn with_escrow_poll_interval(mut self, interval: Duration) -> Self {
        self.coordinator = self.coordinator.with_poll_interval(interval);
        self
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn multisig(&self) -> &M {
        self.coordinator.client()
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // =================================================================
    // Admin setup
    // =================================================================

    pub fn create_round(&self, params: RoundParams) -> Result<Round> {
        self.halt.ensure_not_halted()?;
        let round = self.registry.write().create_round(params)?;
        tracing::info!(
            round_id = %round.id,
            market_type = %round.market_type,
            lock_ts = %round.lock_ts,
            rake_bps = round.rake_bps,
            "round created"
        );
        Ok(round)
    }

    pub fn add_outcome(
        &self,
        round_id: RoundId,
        kol_wallet_address: WalletPubkey,
        question_text: String,
    ) -> Result<OutcomeMarket> {
        self.halt.ensure_not_halted()?;
        // The book must exist before a lock sweep can see the outcome.
        let outcome = {
            let mut registry = self.registry.write();
            let outcome = registry.add_outcome(round_id, kol_wallet_address, question_text)?;
            self.engine.open_book(outcome.id, round_id)?;
            outcome
        };
        tracing::info!(outcome_id = %outcome.id, round_id = %round_id, "outcome added");
        Ok(outcome)
    }

    pub fn create_market(
        &self,
        window_key: WindowKey,
        kol_wallet_address: WalletPubkey,
        escrow_wallet_address: WalletPubkey,
        closes_at: DateTime<Utc>,
    ) -> Result<Market> {
        self.halt.ensure_not_halted()?;
        let market = self.registry.write().create_market(
            window_key,
            kol_wallet_address,
            escrow_wallet_address,
            closes_at,
            self.now(),
        )?;
        tracing::info!(market_id = %market.id, window = %window_key, closes_at = %closes_at, "market created");
        Ok(market)
    }

    pub fn cancel_market(&self, market_id: MarketId) -> Result<Market> {
        self.halt.ensure_not_halted()?;
        let market = self.registry.write().cancel_market(market_id)?;
        tracing::info!(market_id = %market_id, "market cancelled");
        Ok(market)
    }

    pub fn register_kol(&self, wallet: WalletPubkey, active: bool) -> Result<KolEntry> {
        self.halt.ensure_not_halted()?;
        let entry = self.registry.write().register_kol(wallet, active);
        tracing::info!(wallet = %wallet.short(), active, "kol registered");
        Ok(entry)
    }

    // =================================================================
    // Trading
    // =================================================================

    pub fn place_order(&self, cmd: &SignedCommand) -> Result<PlaceOrderResult> {
        let now = self.now();
        let Command::PlaceOrder {
            outcome_id,
            side,
            price,
            quantity,
            idempotency_key,
        } = &cmd.command
        else {
            return Err(wrong_action("place_order", cmd));
        };
        self.verifier.admit(cmd, now)?;
        Order::validate_terms(*price, *quantity)?;

        // A replay answers with the original order whatever the round's
        // state is now.
        if let Some(original) = self.engine.replayed_order(&cmd.wallet, idempotency_key)? {
            return Ok(PlaceOrderResult {
                order: original,
                fills: Vec::new(),
                replayed: true,
            });
        }

        {
            let registry = self.registry.read();
            let outcome = registry.outcome(*outcome_id)?;
            if outcome.status != RoundStatus::Open {
                return Err(KolmarketError::OutcomeNotOpen {
                    outcome_id: *outcome_id,
                    status: outcome.status,
                });
            }
            let round = registry.round(outcome.round_id)?;
            if !round.accepts_orders_at(now) {
                return Err(KolmarketError::RoundNotOpen {
                    round_id: round.id,
                    status: round.status,
                });
            }
        }

        self.engine.place(
            NewOrder {
                outcome_id: *outcome_id,
                user: cmd.wallet,
                side: *side,
                price: *price,
                quantity: *quantity,
                idempotency_key: idempotency_key.clone(),
            },
            now,
        )
    }

    pub fn cancel_order(&self, cmd: &SignedCommand) -> Result<CancelResult> {
        let now = self.now();
        let Command::CancelOrder { order_id } = &cmd.command else {
            return Err(wrong_action("cancel_order", cmd));
        };
        self.verifier.admit(cmd, now)?;
        self.engine.cancel(*order_id, cmd.wallet, now)
    }

    /// Aggregated book; `depth` defaults and is clamped per config.
    pub fn get_order_book(
        &self,
        outcome_id: OutcomeId,
        side: Option<OrderSide>,
        depth: Option<usize>,
    ) -> Result<OrderBookSnapshot> {
        self.engine
            .order_book(outcome_id, side, self.config.clamp_depth(depth))
    }

    /// Newest fills first; `limit` defaults and is clamped per config.
    pub fn get_fills(
        &self,
        outcome_id: OutcomeId,
        limit: Option<usize>,
        before: Option<FillId>,
    ) -> Result<Vec<Fill>> {
        self.engine
            .fills(outcome_id, self.config.clamp_fills_limit(limit), before)
    }

    pub fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.engine.order(order_id)
    }

    pub fn get_round(&self, round_id: RoundId) -> Result<Round> {
        self.registry.read().round(round_id).cloned()
    }

    pub fn get_outcome(&self, outcome_id: OutcomeId) -> Result<OutcomeMarket> {
        self.registry.read().outcome(outcome_id).cloned()
    }

    pub fn get_market(&self, market_id: MarketId) -> Result<Market> {
        self.registry.read().market(market_id).cloned()
    }

    // =================================================================
    // Round lifecycle
    // =================================================================

    /// Lock OPEN rounds due at `lock_before`, earliest first. Re-running
    /// with the same cursor locks nothing new.
    pub fn lock_rounds(
        &self,
        round_id: Option<RoundId>,
        lock_before: DateTime<Utc>,
        limit: Option<usize>,
        dry_run: bool,
    ) -> Result<LockRoundsReport> {
        self.halt.ensure_not_halted()?;
        let limit = limit.unwrap_or(self.config.sweep_batch_limit).max(1);
        let due = self
            .registry
            .read()
            .rounds_due_for_lock(round_id, lock_before, limit);

        if dry_run {
            return Ok(LockRoundsReport {
                locked: due,
                expired_orders: 0,
                dry_run,
            });
        }

        let mut locked = Vec::with_capacity(due.len());
        let mut expired_orders = 0;
        for id in due {
            match self.lock_round(id) {
                Ok(expired) => {
                    locked.push(id);
                    expired_orders += expired;
                }
                // Locked concurrently by another sweep.
                Err(KolmarketError::InvalidRoundTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        tracing::info!(locked = locked.len(), expired_orders, "lock sweep finished");
        Ok(LockRoundsReport {
            locked,
            expired_orders,
            dry_run,
        })
    }

    /// OPEN → LOCKED for one round, expiring its resting orders.
    fn lock_round(&self, round_id: RoundId) -> Result<usize> {
        let outcomes = self.registry.write().lock_round(round_id)?;
        let now = self.now();
        let mut expired = 0;
        for outcome_id in outcomes {
            expired += self
                .engine
                .freeze_outcome(outcome_id, RoundStatus::Locked, now)?;
        }
        tracing::info!(round_id = %round_id, expired, "round locked");
        Ok(expired)
    }

    /// Settle a round with one YES/NO per outcome.
    ///
    /// An OPEN round is locked first. A SETTLED round is returned as-is with
    /// `already_settled = true` and nothing is credited again.
    pub fn settle_round(
        &self,
        round_id: RoundId,
        resolutions: &HashMap<OutcomeId, FinalOutcome>,
        inputs_hash: Option<String>,
    ) -> Result<SettleRoundReport> {
        self.halt.ensure_not_halted()?;

        let (round, outcomes) = {
            let registry = self.registry.read();
            (registry.round(round_id)?.clone(), registry.outcomes_of(round_id)?)
        };
        if round.status == RoundStatus::Settled {
            return Ok(already_settled(round));
        }
        if let Some(missing) = outcomes.iter().find(|o| !resolutions.contains_key(&o.id)) {
            return Err(KolmarketError::MissingResolution(missing.id));
        }
        if !self.settled_rounds.lock().mark_settled(round_id) {
            tracing::warn!(round_id = %round_id, "settlement already in progress");
            return Ok(already_settled(round));
        }

        let result = self.settle_locked(round, &outcomes, resolutions, inputs_hash);
        if result.is_err() {
            self.settled_rounds.lock().release(&round_id);
        }
        result
    }

    fn settle_locked(
        &self,
        round: Round,
        outcomes: &[OutcomeMarket],
        resolutions: &HashMap<OutcomeId, FinalOutcome>,
        inputs_hash: Option<String>,
    ) -> Result<SettleRoundReport> {
        if round.status == RoundStatus::Open {
            match self.lock_round(round.id) {
                // The lock sweep got there first.
                Ok(_) | Err(KolmarketError::InvalidRoundTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        let now = self.now();
        let mut fills = HashMap::with_capacity(outcomes.len());
        for outcome in outcomes {
            self.engine
                .freeze_outcome(outcome.id, RoundStatus::Settled, now)?;
            fills.insert(outcome.id, self.engine.all_fills(outcome.id)?);
        }
        let round = self.registry.read().round(round.id)?.clone();

        let payouts = compute_round_payouts(&round, outcomes, resolutions, &fills)?;
        let snapshot_hash = payouts.snapshot_hash()?;
        let settled = self.registry.write().settle_round(
            round.id,
            resolutions,
            snapshot_hash.clone(),
            inputs_hash,
        )?;

        let credits = payouts.credits();
        {
            let mut ledger = self.ledger.lock();
            for (user, amount) in &credits {
                ledger.credit(*user, *amount)?;
            }
        }

        tracing::info!(
            round_id = %settled.id,
            outcomes = outcomes.len(),
            credited_wallets = credits.len(),
            total_net = %payouts.total_net,
            total_rake = %payouts.total_rake,
            snapshot_hash = %snapshot_hash,
            "round settled"
        );
        Ok(SettleRoundReport {
            round: settled,
            already_settled: false,
            payouts: Some(payouts),
        })
    }

    // =================================================================
    // Wager markets
    // =================================================================

    /// Close OPEN markets due at `closes_before`, optionally restricted to
    /// some windows. Idempotent.
    pub fn close_markets(
        &self,
        window_keys: &[WindowKey],
        closes_before: DateTime<Utc>,
        limit: Option<usize>,
        dry_run: bool,
    ) -> Result<CloseMarketsReport> {
        self.halt.ensure_not_halted()?;
        let limit = limit.unwrap_or(self.config.sweep_batch_limit).max(1);

        let mut registry = self.registry.write();
        let due = registry.markets_due_for_close(window_keys, closes_before, limit);
        if dry_run {
            return Ok(CloseMarketsReport {
                closed_count: due.len(),
                market_ids: due,
                dry_run,
            });
        }
        for id in &due {
            registry.close_market(*id)?;
            tracing::info!(market_id = %id, "market closed");
        }
        Ok(CloseMarketsReport {
            closed_count: due.len(),
            market_ids: due,
            dry_run,
        })
    }

    pub fn resolve_market(
        &self,
        market_id: MarketId,
        resolution: MarketResolution,
    ) -> Result<ResolveMarketReport> {
        self.halt.ensure_not_halted()?;
        let now = self.now();
        let mut registry = self.registry.write();
        let market = registry.market_mut(market_id)?;
        let outcome = resolve_market(market, resolution, now)?;
        Ok(ResolveMarketReport {
            market: outcome.market,
            already_settled: outcome.already_settled,
        })
    }

    /// Hard-delete markets of untracked KOLs and terminal markets that
    /// closed before `cutoff`. Irreversible unless `dry_run`.
    pub fn cleanup_markets(&self, cutoff: DateTime<Utc>, dry_run: bool) -> Result<CleanupReport> {
        self.halt.ensure_not_halted()?;
        let mut registry = self.registry.write();
        let candidates = registry.cleanup_candidates(cutoff);
        let deleted = if dry_run {
            0
        } else {
            registry.delete_markets(&candidates)
        };
        if deleted > 0 {
            tracing::warn!(deleted, cutoff = %cutoff, "markets deleted");
        }
        Ok(CleanupReport {
            candidates,
            deleted,
            dry_run,
        })
    }

    // =================================================================
    // Withdrawals
    // =================================================================

    pub fn balance(&self, user: &WalletPubkey) -> Decimal {
        self.ledger.lock().balance(user)
    }

    pub fn get_withdrawal(&self, id: WithdrawalId) -> Result<Withdrawal> {
        self.ledger.lock().get(id).cloned()
    }

    pub fn withdrawals_of(&self, user: &WalletPubkey) -> Vec<Withdrawal> {
        self.ledger.lock().for_user(user)
    }

    /// Debit the wallet, create a PENDING withdrawal, and propose it.
    ///
    /// An escrow failure during the proposal leaves the record PENDING
    /// (the debit stands) and is logged; [`Self::retry_proposal`] picks it
    /// up again.
    pub async fn request_withdrawal(&self, cmd: &SignedCommand) -> Result<Withdrawal> {
        let now = self.now();
        let Command::RequestWithdrawal { amount } = &cmd.command else {
            return Err(wrong_action("request_withdrawal", cmd));
        };
        self.verifier.admit(cmd, now)?;
        let min = self.config.escrow.min_withdrawal;
        if *amount < min {
            return Err(KolmarketError::InvalidField {
                field: "amount",
                reason: format!("{amount} is below the minimum withdrawal of {min}"),
            });
        }

        let withdrawal = self.ledger.lock().open_withdrawal(cmd.wallet, *amount, now)?;
        tracing::info!(
            withdrawal_id = %withdrawal.id,
            user = %cmd.wallet.short(),
            amount = %amount,
            "withdrawal requested"
        );

        match self.propose(withdrawal.id).await {
            Ok(proposed) => Ok(proposed),
            Err(e) => {
                tracing::warn!(withdrawal_id = %withdrawal.id, error = %e, "proposal failed, left pending");
                self.get_withdrawal(withdrawal.id)
            }
        }
    }

    /// Propose a PENDING withdrawal again after an escrow failure. A vault
    /// transaction or proposal already submitted for it is polled again,
    /// never resubmitted.
    pub async fn retry_proposal(&self, id: WithdrawalId) -> Result<Withdrawal> {
        self.halt.ensure_not_halted()?;
        self.propose(id).await
    }

    async fn propose(&self, id: WithdrawalId) -> Result<Withdrawal> {
        let mut working = self.ledger.lock().begin_proposal(id)?;
        let proposal = self
            .coordinator
            .propose(&mut working, self.now(), |w| self.ledger.lock().sync_submission(w))
            .await;
        let now = self.now();
        let mut ledger = self.ledger.lock();
        match proposal {
            Ok(p) => {
                let proposed = ledger.finish_proposal(id, Some(p), now)?;
                tracing::info!(
                    withdrawal_id = %id,
                    transaction_index = ?proposed.transaction_index,
                    "withdrawal proposed"
                );
                Ok(proposed)
            }
            Err(e) => {
                ledger.finish_proposal(id, None, now)?;
                Err(e)
            }
        }
    }

    /// Wait for the executed transfer `tx_sig` to confirm, then mark the
    /// withdrawal SENT.
    pub async fn confirm_withdrawal(&self, id: WithdrawalId, tx_sig: &str) -> Result<Withdrawal> {
        self.halt.ensure_not_halted()?;
        validate_tx_signature(tx_sig)?;
        let status = self.ledger.lock().get(id)?.status;
        if status != WithdrawalStatus::Proposed {
            return Err(KolmarketError::InvalidWithdrawalTransition {
                withdrawal_id: id,
                from: status,
                to: WithdrawalStatus::Sent,
            });
        }
        self.coordinator.await_confirmation(tx_sig).await?;
        self.mark_sent(id, tx_sig)
    }

    /// Admin override: PROPOSED → SENT with an externally observed
    /// signature.
    pub fn mark_withdrawal_sent(&self, id: WithdrawalId, tx_sig: &str) -> Result<Withdrawal> {
        self.halt.ensure_not_halted()?;
        self.mark_sent(id, tx_sig)
    }

    fn mark_sent(&self, id: WithdrawalId, tx_sig: &str) -> Result<Withdrawal> {
        let sent = self.ledger.lock().mark_sent(id, tx_sig, self.now())?;
        tracing::info!(withdrawal_id = %id, tx_sig = %tx_sig, "withdrawal sent");
        Ok(sent)
    }

    /// PENDING/PROPOSED → FAILED, refunding the settled balance. Refused
    /// with `WithdrawalCommitted` while a proposal is in flight or a PENDING
    /// record already has a vault transaction at the escrow.
    pub fn fail_withdrawal(&self, id: WithdrawalId, reason: &str) -> Result<Withdrawal> {
        self.halt.ensure_not_halted()?;
        let failed = self.ledger.lock().fail(id, reason, self.now())?;
        tracing::warn!(withdrawal_id = %id, reason, refunded = %failed.amount, "withdrawal failed");
        Ok(failed)
    }

    // =================================================================
    // Halt
    // =================================================================

    /// Toggle the emergency halt. Both directions are idempotent and take
    /// effect immediately.
    pub fn set_halt(&self, active: bool, reason: Option<String>) -> Result<HaltState> {
        if active {
            self.halt.activate(reason, self.now())
        } else {
            self.halt.deactivate()
        }
    }

    pub fn get_halt(&self) -> Result<HaltState> {
        self.halt.status()
    }
}

fn wrong_action(expected: &'static str, cmd: &SignedCommand) -> KolmarketError {
    KolmarketError::InvalidField {
        field: "action",
        reason: format!("expected {expected}, got {}", cmd.command.action()),
    }
}

fn already_settled(round: Round) -> SettleRoundReport {
    SettleRoundReport {
        round,
        already_settled: true,
        payouts: None,
    }
}
