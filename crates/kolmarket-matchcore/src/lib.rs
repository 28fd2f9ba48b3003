//! # kolmarket-matchcore
//!
//! **Per-outcome order book and continuous matcher for KOLMarket.**
//!
//! MatchCore is the compute plane: it takes one validated order and one
//! outcome's book and produces fills. It has:
//!
//! - **Zero side effects**: no storage, no signatures, no halt checks
//! - **Price/time priority**: best price first, then arrival sequence
//! - **Maker-price execution**: a taker never fills worse than its limit
//! - **Self-trade prevention**: same-wallet makers are skipped
//! - **Outcome sharding**: each outcome has its own independent book

pub mod determinism;
pub mod matcher;
pub mod orderbook;
pub mod price_level;

pub use determinism::{compute_fill_root, fill_root_hex, verify_fill_root};
pub use matcher::{MatchResult, match_order};
pub use orderbook::{LevelSummary, OrderBook, OrderBookSnapshot};
pub use price_level::PriceLevel;
