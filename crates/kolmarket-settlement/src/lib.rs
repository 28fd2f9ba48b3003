//! # kolmarket-settlement
//!
//! **Finality Plane**: everything that turns trading activity into money
//! owed, and money owed into escrow proposals.
//!
//! ## Architecture
//!
//! - [`payout`]: resolves a round's fills into per-wallet payouts and a
//!   snapshot hash that commits to them.
//! - [`resolution`]: one-shot resolution of wager markets.
//! - [`pnl`]: realized P&L fold over raw swap legs, used for ranking.
//! - [`IdempotencyGuard`]: in-process guard against settling twice.
//! - [`escrow`] / [`withdrawal`]: the multisig seam and the coordinator
//!   that proposes withdrawals against it.
//!
//! Nothing here holds exchange state. Callers pass in the records and apply
//! the results.

pub mod escrow;
pub mod idempotency;
#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;
pub mod payout;
pub mod pnl;
pub mod resolution;
pub mod withdrawal;

pub use escrow::{MultisigClient, TransferMessage};
pub use idempotency::IdempotencyGuard;
pub use payout::{OutcomeSettlement, PayoutLine, PayoutReport, compute_round_payouts};
pub use pnl::{LegSide, PnlSummary, TokenPosition, TradeLeg, realized_pnl};
pub use resolution::{ResolveOutcome, resolve_market};
pub use withdrawal::{Proposal, WithdrawalCoordinator};
