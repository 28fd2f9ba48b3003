//! Settled balances and withdrawal records.
//!
//! The lifecycle for a payout:
//! 1. `credit`: round settlement pays a wallet
//! 2. `open_withdrawal`: balance debited, PENDING record created, atomically
//! 3. `begin_proposal` / `finish_proposal`: PENDING → PROPOSED around the
//!    escrow calls, with no lock held while they run; `sync_submission`
//!    stores each escrow submission the moment it is made
//! 4. `mark_sent`, or `fail` which refunds the amount
//!
//! A record whose proposal is in flight, or which already has a vault
//! transaction at the escrow, cannot be failed while PENDING: the refund
//! would leave a live transfer behind. It is retried to PROPOSED instead.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use kolmarket_settlement::Proposal;
use kolmarket_types::{
    KolmarketError, Result, WalletPubkey, Withdrawal, WithdrawalId, WithdrawalStatus,
};
use rust_decimal::Decimal;

#[derive(Debug, Default)]
pub struct WithdrawalLedger {
    balances: HashMap<WalletPubkey, Decimal>,
    records: HashMap<WithdrawalId, Withdrawal>,
    /// Records with an escrow proposal currently in flight.
    proposing: HashSet<WithdrawalId>,
}

impl WithdrawalLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn balance(&self, user: &WalletPubkey) -> Decimal {
        self.balances.get(user).copied().unwrap_or_default()
    }

    pub fn credit(&mut self, user: WalletPubkey, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(KolmarketError::InvalidField {
                field: "amount",
                reason: format!("credit {amount} must be positive"),
            });
        }
        *self.balances.entry(user).or_default() += amount;
        Ok(())
    }

    /// Debit `amount` and create the PENDING record in one step.
    pub fn open_withdrawal(
        &mut self,
        user: WalletPubkey,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Withdrawal> {
        let available = self.balance(&user);
        if available < amount {
            return Err(KolmarketError::InsufficientBalance {
                needed: amount,
                available,
            });
        }
        self.balances.insert(user, available - amount);
        let withdrawal = Withdrawal::pending(user, amount, now);
        self.records.insert(withdrawal.id, withdrawal.clone());
        Ok(withdrawal)
    }

    pub fn get(&self, id: WithdrawalId) -> Result<&Withdrawal> {
        self.records
            .get(&id)
            .ok_or(KolmarketError::WithdrawalNotFound(id))
    }

    fn get_mut(&mut self, id: WithdrawalId) -> Result<&mut Withdrawal> {
        self.records
            .get_mut(&id)
            .ok_or(KolmarketError::WithdrawalNotFound(id))
    }

    /// Claim a PENDING record for proposal. Fails if it is not PENDING or
    /// another proposal for it is already running.
    pub fn begin_proposal(&mut self, id: WithdrawalId) -> Result<Withdrawal> {
        let record = self.get(id)?.clone();
        if record.status != WithdrawalStatus::Pending {
            return Err(KolmarketError::InvalidWithdrawalTransition {
                withdrawal_id: id,
                from: record.status,
                to: WithdrawalStatus::Proposed,
            });
        }
        if !self.proposing.insert(id) {
            return Err(KolmarketError::Escrow {
                reason: format!("proposal for {id} already in flight"),
            });
        }
        Ok(record)
    }

    /// Copy the escrow submissions of a working copy onto the stored record.
    /// Only valid while the proposal claim is held.
    pub fn sync_submission(&mut self, working: &Withdrawal) -> Result<()> {
        if !self.proposing.contains(&working.id) {
            return Err(KolmarketError::Internal(format!(
                "submission for {} recorded without a proposal claim",
                working.id
            )));
        }
        let record = self.get_mut(working.id)?;
        if record.status != WithdrawalStatus::Pending {
            return Err(KolmarketError::InvalidWithdrawalTransition {
                withdrawal_id: working.id,
                from: record.status,
                to: WithdrawalStatus::Proposed,
            });
        }
        record.vault_address.clone_from(&working.vault_address);
        record.transaction_index = working.transaction_index;
        record.vault_tx_sig.clone_from(&working.vault_tx_sig);
        record.proposal_sig.clone_from(&working.proposal_sig);
        record.updated_at = working.updated_at;
        Ok(())
    }

    /// Release the claim; apply the proposal when there is one.
    pub fn finish_proposal(
        &mut self,
        id: WithdrawalId,
        proposal: Option<Proposal>,
        now: DateTime<Utc>,
    ) -> Result<Withdrawal> {
        self.proposing.remove(&id);
        let record = self.get_mut(id)?;
        if let Some(p) = proposal {
            record.mark_proposed(p.vault_address, p.transaction_index, p.proposal_sig, now)?;
        }
        Ok(record.clone())
    }

    pub fn mark_sent(&mut self, id: WithdrawalId, tx_sig: &str, now: DateTime<Utc>) -> Result<Withdrawal> {
        let record = self.get_mut(id)?;
        record.mark_sent(tx_sig, now)?;
        Ok(record.clone())
    }

    /// PENDING/PROPOSED → FAILED, refunding the amount.
    ///
    /// Refused while a proposal is in flight, and for PENDING records that
    /// already have a vault transaction at the escrow.
    pub fn fail(&mut self, id: WithdrawalId, reason: &str, now: DateTime<Utc>) -> Result<Withdrawal> {
        if self.proposing.contains(&id) {
            return Err(KolmarketError::WithdrawalCommitted {
                withdrawal_id: id,
                reason: "escrow proposal in flight".into(),
            });
        }
        let record = self.get_mut(id)?;
        if record.status == WithdrawalStatus::Pending && record.has_escrow_submission() {
            return Err(KolmarketError::WithdrawalCommitted {
                withdrawal_id: id,
                reason: format!(
                    "vault transaction {} submitted; retry the proposal",
                    record.transaction_index.unwrap_or_default()
                ),
            });
        }
        record.mark_failed(reason, now)?;
        let failed = record.clone();
        *self.balances.entry(failed.user).or_default() += failed.amount;
        Ok(failed)
    }

    /// Records of one wallet, newest first.
    #[must_use]
    pub fn for_user(&self, user: &WalletPubkey) -> Vec<Withdrawal> {
        let mut out: Vec<Withdrawal> = self
            .records
            .values()
            .filter(|w| &w.user == user)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out
    }
}
