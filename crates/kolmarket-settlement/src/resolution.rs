//! Wager-market resolution.
//!
//! A market resolves once, from externally computed trading performance.
//! Resolving an already-settled market is a no-op.

use chrono::{DateTime, Utc};
use kolmarket_types::{KolmarketError, Market, MarketResolution, MarketStatus, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveOutcome {
    pub market: Market,
    /// The market was settled before this call; nothing changed.
    pub already_settled: bool,
}

/// Apply `resolution` to `market`.
///
/// - `closed` → `settled`, resolution fields written.
/// - `open` with `closes_at ≤ now` is closed first, then settled.
/// - `open` before `closes_at`, or `cancelled`, is a state conflict.
/// - `settled` returns unchanged with `already_settled = true`.
pub fn resolve_market(
    market: &mut Market,
    resolution: MarketResolution,
    now: DateTime<Utc>,
) -> Result<ResolveOutcome> {
    if resolution.outcome.trim().is_empty() {
        return Err(KolmarketError::InvalidField {
            field: "resolved_outcome",
            reason: "must not be empty".into(),
        });
    }

    match market.status {
        MarketStatus::Settled => {
            return Ok(ResolveOutcome {
                market: market.clone(),
                already_settled: true,
            });
        }
        MarketStatus::Open if market.is_due_for_close(now) => {
            market.close()?;
            tracing::info!(market_id = %market.id, "market closed ahead of resolution");
        }
        _ => {}
    }

    market.settle(resolution)?;
    tracing::info!(
        market_id = %market.id,
        outcome = ?market.resolved_outcome,
        rank = ?market.resolved_rank,
        "market resolved"
    );
    Ok(ResolveOutcome {
        market: market.clone(),
        already_settled: false,
    })
}
