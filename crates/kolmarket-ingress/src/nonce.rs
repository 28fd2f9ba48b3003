//! Single-use nonce tracking for signed commands.
//!
//! A `(wallet, nonce)` pair may be consumed exactly once. Consumption is an
//! atomic check-and-mark, so two concurrent submissions of the same signed
//! command cannot both pass.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use kolmarket_types::{KolmarketError, NonceRecord, Result, WalletPubkey};
use parking_lot::Mutex;

/// Persistence seam for consumed nonces.
pub trait NonceStore: Send + Sync {
    /// Atomically record `record`, failing with `NonceReused` if the
    /// `(wallet, nonce)` pair was seen before.
    fn consume(&self, record: NonceRecord) -> Result<()>;

    fn contains(&self, wallet: &WalletPubkey, nonce: &str) -> bool;
}

/// In-process nonce store.
///
/// Records whose `issued_at` is older than the freshness window can be
/// pruned: such commands are rejected as expired before the nonce is
/// looked at.
#[derive(Debug, Default)]
pub struct InMemoryNonceStore {
    /// `wallet → nonce → record`
    used: Mutex<HashMap<WalletPubkey, HashMap<String, NonceRecord>>>,
}

impl InMemoryNonceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop records issued before `cutoff`. Returns how many were removed.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut used = self.used.lock();
        let mut removed = 0;
        used.retain(|_, nonces| {
            let before = nonces.len();
            nonces.retain(|_, rec| rec.issued_at >= cutoff);
            removed += before - nonces.len();
            !nonces.is_empty()
        });
        removed
    }

    /// Total nonces tracked across all wallets.
    #[must_use]
    pub fn total_nonces(&self) -> usize {
        self.used.lock().values().map(HashMap::len).sum()
    }
}

impl NonceStore for InMemoryNonceStore {
    fn consume(&self, record: NonceRecord) -> Result<()> {
        let mut used = self.used.lock();
        let nonces = used.entry(record.wallet).or_default();

        if nonces.contains_key(&record.nonce) {
            return Err(KolmarketError::NonceReused {
                wallet: record.wallet.to_string(),
                nonce: record.nonce,
            });
        }

        nonces.insert(record.nonce.clone(), record);
        Ok(())
    }

    fn contains(&self, wallet: &WalletPubkey, nonce: &str) -> bool {
        self.used
            .lock()
            .get(wallet)
            .is_some_and(|n| n.contains_key(nonce))
    }
}
