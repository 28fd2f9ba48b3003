//! Emergency halt switch.
//!
//! The halt flag is a persisted singleton. While active, every mutation
//! (placement, cancellation, withdrawal, sweep) is refused. Reads are served
//! from a short-lived cache; writes go through to the store and refresh the
//! cache immediately, so deactivation takes effect at once.
//!
//! The switch fails closed: if the store cannot be read, the system is
//! treated as halted.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use kolmarket_types::{HaltState, KolmarketError, Result};
use parking_lot::Mutex;

/// Persistence seam for the halt singleton.
pub trait HaltStore: Send + Sync {
    fn load(&self) -> Result<HaltState>;
    fn store(&self, state: &HaltState) -> Result<()>;
}

/// Process-local store. Lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryHaltStore {
    state: Mutex<HaltState>,
}

impl InMemoryHaltStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl HaltStore for InMemoryHaltStore {
    fn load(&self) -> Result<HaltState> {
        Ok(self.state.lock().clone())
    }

    fn store(&self, state: &HaltState) -> Result<()> {
        *self.state.lock() = state.clone();
        Ok(())
    }
}

/// JSON file store. Survives restarts; a missing file reads as inactive.
#[derive(Debug, Clone)]
pub struct FileHaltStore {
    path: PathBuf,
}

impl FileHaltStore {
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HaltStore for FileHaltStore {
    fn load(&self) -> Result<HaltState> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HaltState::inactive()),
            Err(e) => Err(KolmarketError::Storage {
                reason: format!("reading {}: {e}", self.path.display()),
            }),
        }
    }

    fn store(&self, state: &HaltState) -> Result<()> {
        // Write to a sibling file and rename so readers never see a torn write.
        let tmp = self.path.with_extension("tmp");
        let body = serde_json::to_vec_pretty(state)?;
        std::fs::write(&tmp, body).map_err(|e| KolmarketError::Storage {
            reason: format!("writing {}: {e}", tmp.display()),
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| KolmarketError::Storage {
            reason: format!("renaming to {}: {e}", self.path.display()),
        })
    }
}

/// Cached, fail-closed view over a [`HaltStore`].
pub struct HaltSwitch {
    store: Box<dyn HaltStore>,
    ttl: Duration,
    cache: Mutex<Option<(Instant, HaltState)>>,
}

impl std::fmt::Debug for HaltSwitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HaltSwitch")
            .field("ttl", &self.ttl)
            .field("cache", &self.cache.lock())
            .finish_non_exhaustive()
    }
}

impl HaltSwitch {
    #[must_use]
    pub fn new(store: Box<dyn HaltStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            cache: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Box::new(InMemoryHaltStore::new()), ttl)
    }

    /// Current halt state, from cache when fresh.
    pub fn status(&self) -> Result<HaltState> {
        let mut cache = self.cache.lock();
        if let Some((read_at, state)) = cache.as_ref() {
            if read_at.elapsed() < self.ttl {
                return Ok(state.clone());
            }
        }
        let state = self.store.load()?;
        *cache = Some((Instant::now(), state.clone()));
        Ok(state)
    }

    /// Fail with `Halted` if the halt is active or its status is unknown.
    pub fn ensure_not_halted(&self) -> Result<()> {
        match self.status() {
            Ok(state) if state.active => Err(KolmarketError::Halted {
                reason: state.reason_or_default(),
            }),
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "halt status unreadable, failing closed");
                Err(KolmarketError::Halted {
                    reason: format!("halt status unavailable: {e}"),
                })
            }
        }
    }

    /// Activate the halt. Idempotent: an already-active halt keeps its
    /// original `activated_at` and gets the new reason.
    pub fn activate(&self, reason: Option<String>, now: DateTime<Utc>) -> Result<HaltState> {
        let current = self.store.load()?;
        let next = if current.active {
            HaltState {
                reason: reason.or(current.reason),
                ..current
            }
        } else {
            HaltState::activated(reason, now)
        };
        self.write_through(next)
            .inspect(|s| tracing::warn!(reason = ?s.reason, "emergency halt activated"))
    }

    /// Deactivate the halt. Idempotent.
    pub fn deactivate(&self) -> Result<HaltState> {
        self.write_through(HaltState::inactive())
            .inspect(|_| tracing::info!("emergency halt deactivated"))
    }

    fn write_through(&self, state: HaltState) -> Result<HaltState> {
        let mut cache = self.cache.lock();
        self.store.store(&state)?;
        *cache = Some((Instant::now(), state.clone()));
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    /// Store wrapper that counts loads and can be made to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryHaltStore,
        loads: Arc<AtomicUsize>,
        broken: Arc<AtomicBool>,
    }

    impl HaltStore for FlakyStore {
        fn load(&self) -> Result<HaltState> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.broken.load(Ordering::SeqCst) {
                return Err(KolmarketError::Storage {
                    reason: "connection refused".into(),
                });
            }
            self.inner.load()
        }

        fn store(&self, state: &HaltState) -> Result<()> {
            self.inner.store(state)
        }
    }

    #[test]
    fn activate_blocks_and_deactivate_restores() {
        let switch = HaltSwitch::in_memory(Duration::from_secs(60));
        switch.ensure_not_halted().unwrap();

        switch.activate(Some("oracle outage".into()), Utc::now()).unwrap();
        let err = switch.ensure_not_halted().unwrap_err();
        assert!(matches!(err, KolmarketError::Halted { ref reason } if reason == "oracle outage"));

        switch.deactivate().unwrap();
        switch.ensure_not_halted().unwrap();
    }

    #[test]
    fn activation_is_idempotent() {
        let switch = HaltSwitch::in_memory(Duration::from_secs(60));
        let first = switch.activate(None, Utc::now()).unwrap();
        let second = switch
            .activate(Some("still down".into()), Utc::now() + chrono::Duration::seconds(5))
            .unwrap();
        assert_eq!(first.activated_at, second.activated_at);
        assert_eq!(second.reason.as_deref(), Some("still down"));
        switch.deactivate().unwrap();
        switch.deactivate().unwrap();
        assert!(!switch.status().unwrap().active);
    }

    #[test]
    fn reads_are_cached_within_ttl() {
        let store = FlakyStore::default();
        let loads = Arc::clone(&store.loads);
        let switch = HaltSwitch::new(Box::new(store), Duration::from_secs(60));

        switch.status().unwrap();
        switch.status().unwrap();
        switch.ensure_not_halted().unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unreadable_store_fails_closed() {
        let store = FlakyStore::default();
        let broken = Arc::clone(&store.broken);
        let switch = HaltSwitch::new(Box::new(store), Duration::ZERO);

        broken.store(true, Ordering::SeqCst);
        let err = switch.ensure_not_halted().unwrap_err();
        assert!(matches!(err, KolmarketError::Halted { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("kolmarket-halt-{}", uuid_like()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("halt.json");

        let store = FileHaltStore::new(&path);
        assert!(!store.load().unwrap().active);

        let switch = HaltSwitch::new(Box::new(store), Duration::from_secs(2));
        switch.activate(Some("maintenance".into()), Utc::now()).unwrap();

        let reopened = FileHaltStore::new(&path).load().unwrap();
        assert!(reopened.active);
        assert_eq!(reopened.reason.as_deref(), Some("maintenance"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    fn uuid_like() -> String {
        format!(
            "{}-{}",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        )
    }
}
