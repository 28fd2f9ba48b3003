//! Rounds and the binary outcome markets nested under them.
//!
//! ```text
//!   ┌──────┐ lock_ts / admin ┌────────┐ settle_ts / admin ┌─────────┐
//!   │ OPEN ├────────────────▶│ LOCKED ├──────────────────▶│ SETTLED │
//!   └──────┘                 └────────┘                   └─────────┘
//! ```
//!
//! Outcome markets mirror their round's status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{KolmarketError, OutcomeId, Result, RoundId, WalletPubkey, constants};

/// Lifecycle status shared by rounds and their outcome markets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundStatus {
    Open,
    Locked,
    Settled,
}

impl RoundStatus {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Open, Self::Locked) | (Self::Locked, Self::Settled)
        )
    }
}

impl std::fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Locked => write!(f, "LOCKED"),
            Self::Settled => write!(f, "SETTLED"),
        }
    }
}

/// Resolved answer of an outcome market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalOutcome {
    Yes,
    No,
}

impl std::fmt::Display for FinalOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yes => write!(f, "YES"),
            Self::No => write!(f, "NO"),
        }
    }
}

/// Parameters for opening a new round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundParams {
    pub market_type: String,
    pub start_ts: DateTime<Utc>,
    pub lock_ts: DateTime<Utc>,
    pub settle_ts: DateTime<Utc>,
    pub collateral_mint: String,
    pub escrow_wallet_pubkey: WalletPubkey,
    pub rake_bps: u16,
}

/// A time-boxed batch of outcome markets sharing lock/settle timestamps
/// and an escrow account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub market_type: String,
    pub start_ts: DateTime<Utc>,
    pub lock_ts: DateTime<Utc>,
    pub settle_ts: DateTime<Utc>,
    pub status: RoundStatus,
    pub collateral_mint: String,
    pub escrow_wallet_pubkey: WalletPubkey,
    pub rake_bps: u16,
    /// Hex SHA-256 of the external inputs used to resolve the round.
    pub inputs_hash: Option<String>,
    /// Hex SHA-256 of the settlement payout report.
    pub snapshot_hash: Option<String>,
}

impl Round {
    /// Open a new round after checking `start_ts ≤ lock_ts ≤ settle_ts`
    /// and the rake bound.
    pub fn open(params: RoundParams) -> Result<Self> {
        if params.start_ts > params.lock_ts || params.lock_ts > params.settle_ts {
            return Err(KolmarketError::InvalidField {
                field: "lock_ts",
                reason: format!(
                    "expected start_ts <= lock_ts <= settle_ts, got {} / {} / {}",
                    params.start_ts, params.lock_ts, params.settle_ts
                ),
            });
        }
        if u32::from(params.rake_bps) > constants::BPS_DENOMINATOR {
            return Err(KolmarketError::InvalidField {
                field: "rake_bps",
                reason: format!("{} exceeds {}", params.rake_bps, constants::BPS_DENOMINATOR),
            });
        }
        if params.market_type.trim().is_empty() {
            return Err(KolmarketError::InvalidField {
                field: "market_type",
                reason: "must not be empty".into(),
            });
        }
        Ok(Self {
            id: RoundId::new(),
            market_type: params.market_type,
            start_ts: params.start_ts,
            lock_ts: params.lock_ts,
            settle_ts: params.settle_ts,
            status: RoundStatus::Open,
            collateral_mint: params.collateral_mint,
            escrow_wallet_pubkey: params.escrow_wallet_pubkey,
            rake_bps: params.rake_bps,
            inputs_hash: None,
            snapshot_hash: None,
        })
    }

    /// Whether the lock sweep should pick this round up at `cursor`.
    #[must_use]
    pub fn is_due_for_lock(&self, cursor: DateTime<Utc>) -> bool {
        self.status == RoundStatus::Open && self.lock_ts <= cursor
    }

    /// Whether orders are accepted at `now`.
    #[must_use]
    pub fn accepts_orders_at(&self, now: DateTime<Utc>) -> bool {
        self.status == RoundStatus::Open && now < self.lock_ts
    }

    pub fn transition(&mut self, to: RoundStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(KolmarketError::InvalidRoundTransition {
                round_id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// A single YES/NO question nested under a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeMarket {
    pub id: OutcomeId,
    pub round_id: RoundId,
    pub kol_wallet_address: WalletPubkey,
    pub question_text: String,
    pub status: RoundStatus,
    pub final_outcome: Option<FinalOutcome>,
}

impl OutcomeMarket {
    #[must_use]
    pub fn new(round_id: RoundId, kol_wallet_address: WalletPubkey, question_text: String) -> Self {
        Self {
            id: OutcomeId::new(),
            round_id,
            kol_wallet_address,
            question_text,
            status: RoundStatus::Open,
            final_outcome: None,
        }
    }
}
