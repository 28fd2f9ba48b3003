//! Withdrawal proposal against the multisig escrow.
//!
//! A PENDING withdrawal becomes PROPOSED only after both the
//! vault-transaction-create and the proposal-create signatures confirm.
//! Each confirmation wait is bounded by `escrow.confirm_timeout_ms`.
//!
//! Every submission is written onto the record and handed to the caller's
//! `persist` hook before its confirmation is awaited. A record that already
//! carries a submission resumes from it: the signature is polled again and
//! nothing is submitted twice.

use std::time::Duration;

use chrono::{DateTime, Utc};
use kolmarket_types::{
    EscrowConfig, KolmarketError, Result, Withdrawal, WithdrawalStatus, constants,
};
use serde::{Deserialize, Serialize};

use crate::escrow::{MultisigClient, TransferMessage};

/// Confirmed escrow proposal for one withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub vault_address: String,
    pub transaction_index: u64,
    pub proposal_sig: String,
}

pub struct WithdrawalCoordinator<M> {
    client: M,
    escrow: EscrowConfig,
    poll_interval: Duration,
}

impl<M: MultisigClient> WithdrawalCoordinator<M> {
    #[must_use]
    pub fn new(client: M, escrow: EscrowConfig) -> Self {
        Self {
            client,
            escrow,
            poll_interval: Duration::from_millis(constants::ESCROW_CONFIRM_POLL_MS),
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn client(&self) -> &M {
        &self.client
    }

    pub fn escrow(&self) -> &EscrowConfig {
        &self.escrow
    }

    /// Create and confirm the vault transaction and its proposal, resuming
    /// from whatever `withdrawal` already records.
    ///
    /// `persist` is called with the updated record after each submission.
    /// If it fails, the submission is still on the record and the error is
    /// returned.
    pub async fn propose<F>(
        &self,
        withdrawal: &mut Withdrawal,
        now: DateTime<Utc>,
        mut persist: F,
    ) -> Result<Proposal>
    where
        F: FnMut(&Withdrawal) -> Result<()>,
    {
        if withdrawal.status != WithdrawalStatus::Pending {
            return Err(KolmarketError::InvalidWithdrawalTransition {
                withdrawal_id: withdrawal.id,
                from: withdrawal.status,
                to: WithdrawalStatus::Proposed,
            });
        }
        let multisig = self.escrow.multisig_address.as_str();
        if multisig.is_empty() {
            return Err(KolmarketError::Configuration(
                "escrow.multisig_address is not set".into(),
            ));
        }

        if withdrawal.has_escrow_submission() {
            tracing::info!(
                withdrawal_id = %withdrawal.id,
                transaction_index = ?withdrawal.transaction_index,
                "resuming submitted vault transaction"
            );
        } else {
            let (vault_address, transaction_index, vault_tx_sig) =
                self.submit_transaction(multisig, withdrawal).await?;
            withdrawal.record_vault_transaction(vault_address, transaction_index, vault_tx_sig, now)?;
            persist(withdrawal)?;
        }
        let (Some(vault_address), Some(transaction_index), Some(vault_tx_sig)) = (
            withdrawal.vault_address.clone(),
            withdrawal.transaction_index,
            withdrawal.vault_tx_sig.clone(),
        ) else {
            return Err(KolmarketError::Internal(format!(
                "withdrawal {} has an incomplete vault submission",
                withdrawal.id
            )));
        };

        self.await_confirmation(&vault_tx_sig).await?;
        tracing::debug!(
            withdrawal_id = %withdrawal.id,
            transaction_index,
            "vault transaction confirmed"
        );

        let proposal_sig = match withdrawal.proposal_sig.clone() {
            Some(sig) => sig,
            None => {
                let sig = self.client.create_proposal(multisig, transaction_index).await?;
                withdrawal.record_proposal_sig(sig.clone(), now)?;
                persist(withdrawal)?;
                sig
            }
        };
        self.await_confirmation(&proposal_sig).await?;

        tracing::info!(
            withdrawal_id = %withdrawal.id,
            user = %withdrawal.user.short(),
            amount = %withdrawal.amount,
            transaction_index,
            "withdrawal proposal confirmed"
        );
        Ok(Proposal {
            vault_address,
            transaction_index,
            proposal_sig,
        })
    }

    /// Returns `(vault_address, transaction_index, vault_tx_sig)`.
    async fn submit_transaction(
        &self,
        multisig: &str,
        withdrawal: &Withdrawal,
    ) -> Result<(String, u64, String)> {
        let lamports = withdrawal.lamports()?;
        if lamports == 0 {
            return Err(KolmarketError::InvalidField {
                field: "amount",
                reason: "rounds to zero lamports".into(),
            });
        }
        let vault_address = self.client.vault_address(multisig, self.escrow.vault_index)?;
        let transaction_index = self.client.next_transaction_index(multisig).await?;
        let message = TransferMessage {
            from: vault_address.clone(),
            to: withdrawal.user,
            lamports,
        };
        let vault_tx_sig = self
            .client
            .create_vault_transaction(multisig, self.escrow.vault_index, transaction_index, &message)
            .await?;
        tracing::info!(
            withdrawal_id = %withdrawal.id,
            transaction_index,
            lamports,
            "vault transaction submitted"
        );
        Ok((vault_address, transaction_index, vault_tx_sig))
    }

    /// Poll `confirm(signature)` until it reports success or the configured
    /// timeout elapses.
    pub async fn await_confirmation(&self, signature: &str) -> Result<()> {
        let timeout_ms = self.escrow.confirm_timeout_ms;
        let poll = self.poll_until_confirmed(signature);
        match tokio::time::timeout(Duration::from_millis(timeout_ms), poll).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(signature, timeout_ms, "escrow confirmation timed out");
                Err(KolmarketError::UpstreamTimeout {
                    operation: format!("confirm {signature}"),
                    timeout_ms,
                })
            }
        }
    }

    async fn poll_until_confirmed(&self, signature: &str) -> Result<()> {
        loop {
            if self.client.confirm(signature).await? {
                return Ok(());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
