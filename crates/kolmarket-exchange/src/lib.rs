//! # kolmarket-exchange
//!
//! The KOLMarket exchange core assembled from its planes:
//!
//! ```text
//! SignedCommand ─▶ CommandVerifier (halt, signature, freshness, nonce)
//!                      │
//!                      ▼
//!   Registry ◀──▶ MatchingEngine (per-outcome books) ──▶ fills
//!                      │
//!                      ▼
//!   settle_round ─▶ payouts ─▶ WithdrawalLedger ─▶ WithdrawalCoordinator ─▶ multisig
//! ```
//!
//! Everything is reached through [`Exchange`].

pub mod engine;
pub mod exchange;
pub mod registry;
pub mod telemetry;
pub mod withdrawals;

pub use engine::{CancelResult, MatchingEngine, NewOrder, OutcomeBook, PlaceOrderResult};
pub use exchange::{
    CleanupReport, CloseMarketsReport, Exchange, LockRoundsReport, ResolveMarketReport,
    SettleRoundReport,
};
pub use registry::{KolEntry, Registry};
pub use telemetry::init_tracing;
pub use withdrawals::WithdrawalLedger;
