//! # kolmarket-types
//!
//! Shared types, errors, and configuration for the **KOLMarket** exchange core.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`OrderId`], [`FillId`], [`MatchId`], [`OutcomeId`], [`RoundId`], [`MarketId`], [`WithdrawalId`], [`WalletPubkey`]
//! - **Order model**: [`Order`], [`OrderSide`], [`OrderStatus`]
//! - **Fill model**: [`Fill`]
//! - **Rounds**: [`Round`], [`RoundStatus`], [`OutcomeMarket`], [`FinalOutcome`]
//! - **Wager markets**: [`Market`], [`MarketStatus`], [`WindowKey`], [`MarketResolution`]
//! - **Withdrawals**: [`Withdrawal`], [`WithdrawalStatus`]
//! - **Signed commands**: [`SignedCommand`], [`Command`], [`ActionTag`], [`NonceRecord`]
//! - **Halt**: [`HaltState`]
//! - **Configuration**: [`ExchangeConfig`], [`EscrowConfig`]
//! - **Errors**: [`KolmarketError`] with `KM_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod command;
pub mod config;
pub mod constants;
pub mod error;
pub mod fill;
pub mod halt;
pub mod ids;
pub mod market;
pub mod order;
pub mod round;
pub mod withdrawal;

// Re-export all primary types at crate root for ergonomic imports:
//   use kolmarket_types::{Order, OrderSide, Fill, Round, ...};

pub use command::*;
pub use config::*;
pub use error::*;
pub use fill::*;
pub use halt::*;
pub use ids::*;
pub use market::*;
pub use order::*;
pub use round::*;
pub use withdrawal::*;

// Constants are accessed via `kolmarket_types::constants::FOO`
// (not re-exported to avoid name collisions).
