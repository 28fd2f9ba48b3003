//! Deterministic digests over fill sets.
//!
//! The `fill_root` commits to an outcome's executed fills so a settlement
//! report can be checked against the fills feed without comparing full
//! payloads.

use kolmarket_types::Fill;
use sha2::{Digest, Sha256};

/// Compute the root hash over a set of fills.
///
/// Depends on fill ids (in order), both order ids, both wallets, side,
/// price, quantity, and fee. The same fills in the same order always
/// produce the same root.
#[must_use]
pub fn compute_fill_root(fills: &[Fill]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"kolmarket:fill_root:v1:");
    hasher.update((fills.len() as u64).to_le_bytes());

    for fill in fills {
        hasher.update(fill.id.0.as_bytes());
        hasher.update(fill.outcome_id.0.as_bytes());
        hasher.update(fill.taker_order_id.0.as_bytes());
        hasher.update(fill.maker_order_id.0.as_bytes());
        hasher.update(fill.taker.as_bytes());
        hasher.update(fill.maker.as_bytes());
        hasher.update(fill.taker_side.as_str().as_bytes());
        hasher.update(fill.price.normalize().to_string().as_bytes());
        hasher.update(fill.quantity.normalize().to_string().as_bytes());
        hasher.update(fill.fee_amount.normalize().to_string().as_bytes());
    }

    hasher.finalize().into()
}

/// Hex form of [`compute_fill_root`], as stored in settlement reports.
#[must_use]
pub fn fill_root_hex(fills: &[Fill]) -> String {
    hex::encode(compute_fill_root(fills))
}

/// Recompute the root from `fills` and compare with `expected_root`.
#[must_use]
pub fn verify_fill_root(fills: &[Fill], expected_root: &[u8; 32]) -> bool {
    compute_fill_root(fills) == *expected_root
}
