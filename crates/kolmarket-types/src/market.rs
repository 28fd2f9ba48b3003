//! Wager-style markets on a KOL wallet's trading window.
//!
//! ## State Machine
//!
//! ```text
//!   ┌──────┐ close  ┌────────┐ resolve ┌─────────┐
//!   │ open ├───────▶│ closed ├────────▶│ settled │
//!   └──┬───┘        └───┬────┘         └─────────┘
//!      │ cancel         │ cancel
//!      ▼                ▼
//!   ┌───────────────────────┐
//!   │       cancelled       │
//!   └───────────────────────┘
//! ```
//!
//! The `resolved_*` fields are written exactly once, on `closed → settled`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{KolmarketError, MarketId, Result, WalletPubkey};

/// The trading window a wager market covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKey {
    Daily,
    Weekly,
    Monthly,
}

impl std::fmt::Display for WindowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
            Self::Monthly => write!(f, "monthly"),
        }
    }
}

impl std::str::FromStr for WindowKey {
    type Err = KolmarketError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(KolmarketError::InvalidField {
                field: "window_key",
                reason: format!("unknown window `{other}`"),
            }),
        }
    }
}

/// Lifecycle status of a wager market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Open,
    Closed,
    Settled,
    Cancelled,
}

impl MarketStatus {
    /// Transitions are monotonic: `open → closed → settled`, or
    /// `cancelled` from `open`/`closed`.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Open, Self::Closed | Self::Cancelled)
                | (Self::Closed, Self::Settled | Self::Cancelled)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Cancelled)
    }
}

impl std::fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Settled => write!(f, "settled"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Externally computed result of a KOL's trading window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketResolution {
    /// The winning side / label.
    pub outcome: String,
    pub rank: u32,
    pub profit_sol: Decimal,
    pub profit_usd: Decimal,
}

/// A wager market on one KOL wallet for one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub window_key: WindowKey,
    pub kol_wallet_address: WalletPubkey,
    pub status: MarketStatus,
    pub closes_at: DateTime<Utc>,
    pub escrow_wallet_address: WalletPubkey,
    pub resolved_outcome: Option<String>,
    pub resolved_rank: Option<u32>,
    pub resolved_profit_sol: Option<Decimal>,
    pub resolved_profit_usd: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl Market {
    #[must_use]
    pub fn new(
        window_key: WindowKey,
        kol_wallet_address: WalletPubkey,
        escrow_wallet_address: WalletPubkey,
        closes_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MarketId::new(),
            window_key,
            kol_wallet_address,
            status: MarketStatus::Open,
            closes_at,
            escrow_wallet_address,
            resolved_outcome: None,
            resolved_rank: None,
            resolved_profit_sol: None,
            resolved_profit_usd: None,
            created_at: now,
        }
    }

    /// Whether the close sweep should pick this market up at `cursor`.
    #[must_use]
    pub fn is_due_for_close(&self, cursor: DateTime<Utc>) -> bool {
        self.status == MarketStatus::Open && self.closes_at <= cursor
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved_outcome.is_some()
    }

    fn transition(&mut self, to: MarketStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(KolmarketError::InvalidMarketTransition {
                market_id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.transition(MarketStatus::Closed)
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.transition(MarketStatus::Cancelled)
    }

    /// `closed → settled`, writing the resolution fields exactly once.
    pub fn settle(&mut self, resolution: MarketResolution) -> Result<()> {
        if self.is_resolved() {
            return Err(KolmarketError::InvalidMarketTransition {
                market_id: self.id,
                from: self.status,
                to: MarketStatus::Settled,
            });
        }
        self.transition(MarketStatus::Settled)?;
        self.resolved_outcome = Some(resolution.outcome);
        self.resolved_rank = Some(resolution.rank);
        self.resolved_profit_sol = Some(resolution.profit_sol);
        self.resolved_profit_usd = Some(resolution.profit_usd);
        Ok(())
    }
}
