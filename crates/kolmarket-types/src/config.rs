//! Configuration for the KOLMarket exchange core.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{KolmarketError, Result, constants};

/// Top-level exchange configuration.
///
/// Every field has a default, so a partial JSON document is valid input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Allowed distance between a command's `issued_at` and now.
    pub signature_max_skew_secs: i64,
    /// Reject reused `(wallet, nonce)` pairs.
    pub enforce_nonces: bool,
    /// Taker fee recorded on every fill.
    pub taker_fee_bps: u16,
    pub orderbook_default_depth: usize,
    pub orderbook_max_depth: usize,
    pub fills_default_limit: usize,
    pub fills_max_limit: usize,
    /// Batch size for the lock and close sweeps.
    pub sweep_batch_limit: usize,
    /// Maximum age of a cached halt status read.
    pub halt_cache_ttl_ms: u64,
    pub escrow: EscrowConfig,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            signature_max_skew_secs: constants::DEFAULT_SIGNATURE_MAX_SKEW_SECS,
            enforce_nonces: true,
            taker_fee_bps: 0,
            orderbook_default_depth: constants::DEFAULT_ORDERBOOK_DEPTH,
            orderbook_max_depth: constants::MAX_ORDERBOOK_DEPTH,
            fills_default_limit: constants::DEFAULT_FILLS_LIMIT,
            fills_max_limit: constants::MAX_FILLS_LIMIT,
            sweep_batch_limit: constants::DEFAULT_SWEEP_BATCH_LIMIT,
            halt_cache_ttl_ms: constants::DEFAULT_HALT_CACHE_TTL_MS,
            escrow: EscrowConfig::default(),
        }
    }
}

/// Custodial escrow settings used by the withdrawal coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscrowConfig {
    /// Address of the multisig controlling the escrow vault.
    pub multisig_address: String,
    pub vault_index: u8,
    /// Upper bound on each escrow confirmation wait.
    pub confirm_timeout_ms: u64,
    /// Smallest withdrawal accepted, in SOL.
    pub min_withdrawal: Decimal,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            multisig_address: String::new(),
            vault_index: 0,
            confirm_timeout_ms: constants::DEFAULT_ESCROW_CONFIRM_TIMEOUT_MS,
            min_withdrawal: Decimal::new(1, 3),
        }
    }
}

impl ExchangeConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(raw)
            .map_err(|e| KolmarketError::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Reject inconsistent values.
    pub fn validate(&self) -> Result<()> {
        if self.signature_max_skew_secs <= 0 {
            return Err(KolmarketError::Configuration(
                "signature_max_skew_secs must be positive".into(),
            ));
        }
        if u32::from(self.taker_fee_bps) > constants::BPS_DENOMINATOR {
            return Err(KolmarketError::Configuration(format!(
                "taker_fee_bps {} exceeds {}",
                self.taker_fee_bps,
                constants::BPS_DENOMINATOR
            )));
        }
        if self.orderbook_default_depth == 0
            || self.orderbook_default_depth > self.orderbook_max_depth
        {
            return Err(KolmarketError::Configuration(format!(
                "orderbook depth default {} must be in 1..={}",
                self.orderbook_default_depth, self.orderbook_max_depth
            )));
        }
        if self.fills_default_limit == 0 || self.fills_default_limit > self.fills_max_limit {
            return Err(KolmarketError::Configuration(format!(
                "fills limit default {} must be in 1..={}",
                self.fills_default_limit, self.fills_max_limit
            )));
        }
        if self.sweep_batch_limit == 0 {
            return Err(KolmarketError::Configuration(
                "sweep_batch_limit must be positive".into(),
            ));
        }
        if self.escrow.confirm_timeout_ms == 0 {
            return Err(KolmarketError::Configuration(
                "escrow.confirm_timeout_ms must be positive".into(),
            ));
        }
        if self.escrow.min_withdrawal < Decimal::ZERO {
            return Err(KolmarketError::Configuration(
                "escrow.min_withdrawal must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// Clamp a requested snapshot depth to `1..=orderbook_max_depth`.
    #[must_use]
    pub fn clamp_depth(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.orderbook_default_depth)
            .clamp(1, self.orderbook_max_depth)
    }

    /// Clamp a requested fills page size to `1..=fills_max_limit`.
    #[must_use]
    pub fn clamp_fills_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.fills_default_limit)
            .clamp(1, self.fills_max_limit)
    }
}
