//! Custodial withdrawal records.
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐ proposal created ┌──────────┐ signature confirmed ┌──────┐
//!   │ PENDING ├─────────────────▶│ PROPOSED ├────────────────────▶│ SENT │
//!   └────┬────┘                  └────┬─────┘  / admin mark-sent  └──────┘
//!        │ admin fail                 │ admin fail / broadcast error
//!        ▼                            ▼
//!   ┌─────────────────────────────────────┐
//!   │                FAILED               │
//!   └─────────────────────────────────────┘
//! ```
//!
//! There is no edge from PENDING to SENT: every payout passes through a
//! multisig proposal first.
//!
//! A PENDING record remembers each escrow submission as soon as it is
//! made (`vault_tx_sig`, then `proposal_sig`), so a retried proposal
//! re-polls those signatures instead of submitting a second transfer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{KolmarketError, Result, WalletPubkey, WithdrawalId, constants};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    Pending,
    Proposed,
    Sent,
    Failed,
}

impl WithdrawalStatus {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Proposed | Self::Failed)
                | (Self::Proposed, Self::Sent | Self::Failed)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Proposed => write!(f, "PROPOSED"),
            Self::Sent => write!(f, "SENT"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Reject transaction signature strings that cannot be real.
pub fn validate_tx_signature(tx_sig: &str) -> Result<()> {
    let trimmed = tx_sig.trim();
    if trimmed.len() < constants::MIN_TX_SIGNATURE_LEN {
        return Err(KolmarketError::InvalidTxSignature {
            reason: format!(
                "expected at least {} characters, got {}",
                constants::MIN_TX_SIGNATURE_LEN,
                trimmed.len()
            ),
        });
    }
    if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(KolmarketError::InvalidTxSignature {
            reason: "must be alphanumeric".into(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub user: WalletPubkey,
    /// Amount in SOL.
    pub amount: Decimal,
    pub status: WithdrawalStatus,
    /// Vault the transfer is drawn from; known once the vault transaction
    /// is submitted.
    pub vault_address: Option<String>,
    pub transaction_index: Option<u64>,
    /// Signature of the vault-transaction-create transaction.
    #[serde(default)]
    pub vault_tx_sig: Option<String>,
    /// Signature of the proposal-create transaction.
    pub proposal_sig: Option<String>,
    /// Signature of the executed transfer. Set only on SENT.
    pub tx_sig: Option<String>,
    /// Failure reason. Set only on FAILED.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Withdrawal {
    #[must_use]
    pub fn pending(user: WalletPubkey, amount: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            id: WithdrawalId::new(),
            user,
            amount,
            status: WithdrawalStatus::Pending,
            vault_address: None,
            transaction_index: None,
            vault_tx_sig: None,
            proposal_sig: None,
            tx_sig: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, to: WithdrawalStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(KolmarketError::InvalidWithdrawalTransition {
                withdrawal_id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// Whether a vault transaction for this record has reached the escrow.
    #[must_use]
    pub fn has_escrow_submission(&self) -> bool {
        self.vault_tx_sig.is_some()
    }

    fn ensure_pending(&self, to: WithdrawalStatus) -> Result<()> {
        if self.status == WithdrawalStatus::Pending {
            Ok(())
        } else {
            Err(KolmarketError::InvalidWithdrawalTransition {
                withdrawal_id: self.id,
                from: self.status,
                to,
            })
        }
    }

    /// Record the submitted vault transaction. A record carries at most one.
    pub fn record_vault_transaction(
        &mut self,
        vault_address: String,
        transaction_index: u64,
        vault_tx_sig: String,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_pending(WithdrawalStatus::Proposed)?;
        if let Some(existing) = self.transaction_index {
            return Err(KolmarketError::WithdrawalCommitted {
                withdrawal_id: self.id,
                reason: format!("vault transaction {existing} already submitted"),
            });
        }
        self.vault_address = Some(vault_address);
        self.transaction_index = Some(transaction_index);
        self.vault_tx_sig = Some(vault_tx_sig);
        self.updated_at = now;
        Ok(())
    }

    /// Record the submitted proposal-create signature.
    pub fn record_proposal_sig(&mut self, proposal_sig: String, now: DateTime<Utc>) -> Result<()> {
        self.ensure_pending(WithdrawalStatus::Proposed)?;
        if self.transaction_index.is_none() {
            return Err(KolmarketError::InvalidField {
                field: "proposal_sig",
                reason: "no vault transaction recorded".into(),
            });
        }
        if self.proposal_sig.is_some() {
            return Err(KolmarketError::WithdrawalCommitted {
                withdrawal_id: self.id,
                reason: "proposal already submitted".into(),
            });
        }
        self.proposal_sig = Some(proposal_sig);
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_proposed(
        &mut self,
        vault_address: String,
        transaction_index: u64,
        proposal_sig: String,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.transition(WithdrawalStatus::Proposed, now)?;
        self.vault_address = Some(vault_address);
        self.transaction_index = Some(transaction_index);
        self.proposal_sig = Some(proposal_sig);
        Ok(())
    }

    pub fn mark_sent(&mut self, tx_sig: &str, now: DateTime<Utc>) -> Result<()> {
        validate_tx_signature(tx_sig)?;
        self.transition(WithdrawalStatus::Sent, now)?;
        self.tx_sig = Some(tx_sig.trim().to_string());
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: &str, now: DateTime<Utc>) -> Result<()> {
        self.transition(WithdrawalStatus::Failed, now)?;
        self.error = Some(reason.to_string());
        Ok(())
    }

    /// Amount in lamports, truncating sub-lamport dust.
    pub fn lamports(&self) -> Result<u64> {
        sol_to_lamports(self.amount)
    }
}

/// Convert a SOL amount to lamports, truncating sub-lamport dust.
pub fn sol_to_lamports(sol: Decimal) -> Result<u64> {
    use rust_decimal::prelude::ToPrimitive;

    (sol * Decimal::from(constants::LAMPORTS_PER_SOL))
        .trunc()
        .to_u64()
        .ok_or_else(|| KolmarketError::InvalidField {
            field: "amount",
            reason: format!("{sol} SOL is not representable in lamports"),
        })
}
