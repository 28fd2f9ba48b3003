//! Settlement idempotency guard: prevents double-settlement.
//!
//! Each round (or wager market) can only be settled once. The guard is the
//! in-process fast path in front of the persisted SETTLED status: two
//! concurrent settle calls for the same id race on the guard, and only one
//! proceeds to compute and credit payouts.
//!
//! The guard maintains an LRU-style bounded cache so memory usage stays
//! predictable in long-running processes.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// Bounded set of settled ids with oldest-first eviction.
#[derive(Debug)]
pub struct IdempotencyGuard<K> {
    settled: HashSet<K>,
    /// Insertion order for eviction (front = oldest).
    order: VecDeque<K>,
    max_size: usize,
}

impl<K: Copy + Eq + Hash> IdempotencyGuard<K> {
    /// # Panics
    /// Panics if `max_size` is zero.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "IdempotencyGuard max_size must be > 0");
        Self {
            settled: HashSet::with_capacity(max_size.min(1024)),
            order: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Mark `key` as settled. Returns `false` if it already was.
    pub fn mark_settled(&mut self, key: K) -> bool {
        if self.settled.contains(&key) {
            return false;
        }

        if self.settled.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.settled.remove(&oldest);
            }
        }

        self.settled.insert(key);
        self.order.push_back(key);
        true
    }

    /// Forget `key`, e.g. when the settlement it guarded failed.
    pub fn release(&mut self, key: &K) {
        if self.settled.remove(key) {
            self.order.retain(|k| k != key);
        }
    }

    #[must_use]
    pub fn is_settled(&self, key: &K) -> bool {
        self.settled.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.settled.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.settled.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use kolmarket_types::RoundId;

    use super::*;

    #[test]
    fn first_settle_ok() {
        let mut guard = IdempotencyGuard::new(100);
        let round = RoundId::new();
        assert!(guard.mark_settled(round));
        assert!(guard.is_settled(&round));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn double_settle_blocked() {
        let mut guard = IdempotencyGuard::new(100);
        let round = RoundId::new();
        assert!(guard.mark_settled(round));
        assert!(!guard.mark_settled(round));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn evicts_oldest() {
        let mut guard = IdempotencyGuard::new(3);
        let ids: Vec<RoundId> = (0..4u8).map(|i| RoundId::from_bytes([i; 16])).collect();

        for id in &ids[..3] {
            guard.mark_settled(*id);
        }
        assert_eq!(guard.len(), 3);

        guard.mark_settled(ids[3]);
        assert_eq!(guard.len(), 3);
        assert!(!guard.is_settled(&ids[0]), "oldest should have been evicted");
        assert!(ids[1..].iter().all(|id| guard.is_settled(id)));
    }

    #[test]
    fn release_allows_retry() {
        let mut guard = IdempotencyGuard::new(10);
        let round = RoundId::new();
        guard.mark_settled(round);
        guard.release(&round);
        assert!(guard.is_empty());
        assert!(guard.mark_settled(round));
    }

    #[test]
    #[should_panic(expected = "max_size must be > 0")]
    fn zero_max_size_panics() {
        let _ = IdempotencyGuard::<RoundId>::new(0);
    }
}
