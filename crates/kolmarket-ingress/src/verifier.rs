//! Signed command admission.
//!
//! ## Check Order
//!
//! ```text
//! halt gate → schema → signature → freshness → nonce consumption
//! ```
//!
//! The nonce is consumed last, so a command rejected for any earlier reason
//! does not burn its nonce and may be corrected and resubmitted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kolmarket_types::{ExchangeConfig, NonceRecord, Result, SignedCommand};

use crate::{HaltSwitch, NonceStore, check_freshness, verify_signature};

/// Verifier settings, usually taken from [`ExchangeConfig`].
#[derive(Debug, Clone, Copy)]
pub struct VerifierConfig {
    pub max_skew_secs: i64,
    pub enforce_nonces: bool,
}

impl From<&ExchangeConfig> for VerifierConfig {
    fn from(cfg: &ExchangeConfig) -> Self {
        Self {
            max_skew_secs: cfg.signature_max_skew_secs,
            enforce_nonces: cfg.enforce_nonces,
        }
    }
}

/// Gate every signed command must pass before it may mutate state.
pub struct CommandVerifier {
    config: VerifierConfig,
    halt: Arc<HaltSwitch>,
    nonces: Arc<dyn NonceStore>,
}

impl std::fmt::Debug for CommandVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandVerifier")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CommandVerifier {
    #[must_use]
    pub fn new(config: VerifierConfig, halt: Arc<HaltSwitch>, nonces: Arc<dyn NonceStore>) -> Self {
        Self {
            config,
            halt,
            nonces,
        }
    }

    #[must_use]
    pub fn config(&self) -> VerifierConfig {
        self.config
    }

    /// Run every check and consume the nonce. On success the command may
    /// be applied exactly once.
    pub fn admit(&self, cmd: &SignedCommand, now: DateTime<Utc>) -> Result<()> {
        self.halt.ensure_not_halted()?;
        cmd.validate_schema()?;
        verify_signature(cmd).inspect_err(|e| {
            tracing::warn!(wallet = %cmd.wallet.short(), action = %cmd.command.action(), error = %e, "signature rejected");
        })?;
        check_freshness(cmd.issued_at, now, self.config.max_skew_secs)?;
        if self.config.enforce_nonces {
            self.nonces
                .consume(NonceRecord::from_command(cmd))
                .inspect_err(|_| {
                    tracing::warn!(
                        wallet = %cmd.wallet.short(),
                        nonce = %cmd.nonce,
                        action = %cmd.command.action(),
                        "nonce reuse rejected"
                    );
                })?;
        }
        tracing::debug!(wallet = %cmd.wallet.short(), action = %cmd.command.action(), "command admitted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ed25519_dalek::SigningKey;
    use kolmarket_types::{Command, KolmarketError, OrderId};
    use rand::rngs::OsRng;

    use super::*;
    use crate::{InMemoryNonceStore, sign_command};

    fn verifier(enforce_nonces: bool) -> (CommandVerifier, Arc<HaltSwitch>) {
        let halt = Arc::new(HaltSwitch::in_memory(Duration::ZERO));
        let v = CommandVerifier::new(
            VerifierConfig {
                max_skew_secs: 300,
                enforce_nonces,
            },
            Arc::clone(&halt),
            Arc::new(InMemoryNonceStore::new()),
        );
        (v, halt)
    }

    fn cancel(key: &SigningKey, nonce: &str, issued_at: DateTime<Utc>) -> SignedCommand {
        sign_command(
            key,
            Command::CancelOrder {
                order_id: OrderId::from_bytes([1; 16]),
            },
            nonce,
            issued_at,
        )
    }

    #[test]
    fn admits_once_then_rejects_replay() {
        let (v, _) = verifier(true);
        let key = SigningKey::generate(&mut OsRng);
        let now = Utc::now();
        let cmd = cancel(&key, "n-1", now);

        v.admit(&cmd, now).unwrap();
        let err = v.admit(&cmd, now).unwrap_err();
        assert_eq!(err.reason_code(), "NONCE_REUSED");
    }

    #[test]
    fn replay_allowed_when_nonces_disabled() {
        let (v, _) = verifier(false);
        let key = SigningKey::generate(&mut OsRng);
        let now = Utc::now();
        let cmd = cancel(&key, "n-1", now);
        v.admit(&cmd, now).unwrap();
        v.admit(&cmd, now).unwrap();
    }

    #[test]
    fn stale_command_does_not_burn_nonce() {
        let (v, _) = verifier(true);
        let key = SigningKey::generate(&mut OsRng);
        let now = Utc::now();
        let stale = cancel(&key, "n-1", now - chrono::Duration::minutes(6));
        assert!(matches!(
            v.admit(&stale, now),
            Err(KolmarketError::CommandExpired { .. })
        ));
        v.admit(&cancel(&key, "n-1", now), now).unwrap();
    }

    #[test]
    fn halt_checked_before_anything_else() {
        let (v, halt) = verifier(true);
        let key = SigningKey::generate(&mut OsRng);
        let now = Utc::now();
        let mut cmd = cancel(&key, "n-1", now);
        cmd.signature = "garbage".into();

        halt.activate(None, now).unwrap();
        assert!(matches!(v.admit(&cmd, now), Err(KolmarketError::Halted { .. })));
        halt.deactivate().unwrap();
        assert!(matches!(
            v.admit(&cmd, now),
            Err(KolmarketError::InvalidField { field: "signature", .. })
        ));
    }
}
