//! Error types for the KOLMarket exchange core.
//!
//! All errors use the `KM_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by how the caller should react:
//! - 1xx: Validation: fix the request and retry
//! - 2xx: State conflict: the entity is not in the expected state
//! - 3xx: Halted: the system is in emergency halt, try later
//! - 4xx: Upstream: storage or escrow failure, safe to retry
//! - 5xx: Not found
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{
    MarketId, MarketStatus, OrderId, OrderStatus, OutcomeId, RoundId, RoundStatus, WithdrawalId,
    WithdrawalStatus,
};

/// Coarse classification of every [`KolmarketError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    StateConflict,
    Halted,
    Upstream,
    NotFound,
    Internal,
}

/// Central error enum for all KOLMarket operations.
#[derive(Debug, Error)]
pub enum KolmarketError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// A command field is missing or malformed.
    #[error("KM_ERR_100: Invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// The order failed validation (price bounds, quantity, precision).
    #[error("KM_ERR_101: Invalid order: {reason}")]
    InvalidOrder { reason: String },

    /// The ed25519 signature does not verify against the canonical message.
    #[error("KM_ERR_102: Signature verification failed")]
    InvalidSignature,

    /// `issued_at` is outside the allowed clock skew window.
    #[error("KM_ERR_103: Command expired: skew {skew_secs}s exceeds {max_skew_secs}s")]
    CommandExpired { skew_secs: i64, max_skew_secs: i64 },

    /// The `(wallet, nonce)` pair was already consumed.
    #[error("KM_ERR_104: Nonce already used: wallet {wallet} nonce {nonce}")]
    NonceReused { wallet: String, nonce: String },

    /// The signer is not allowed to act on this entity.
    #[error("KM_ERR_105: Unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// Not enough settled balance for the withdrawal.
    #[error("KM_ERR_106: Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    /// A transaction signature string failed the plausibility check.
    #[error("KM_ERR_107: Invalid transaction signature: {reason}")]
    InvalidTxSignature { reason: String },

    /// Settlement was requested without a resolution for an outcome.
    #[error("KM_ERR_108: Missing resolution for {0}")]
    MissingResolution(OutcomeId),

    // =================================================================
    // State Conflict Errors (2xx)
    // =================================================================
    /// The order is terminal or otherwise not actionable.
    #[error("KM_ERR_200: Order {order_id} is {status}")]
    OrderNotActive { order_id: OrderId, status: OrderStatus },

    /// The round no longer accepts the operation (locked or settled).
    #[error("KM_ERR_201: Round {round_id} is {status}")]
    RoundNotOpen { round_id: RoundId, status: RoundStatus },

    /// The outcome market no longer accepts orders.
    #[error("KM_ERR_202: Outcome {outcome_id} is {status}")]
    OutcomeNotOpen { outcome_id: OutcomeId, status: RoundStatus },

    /// Illegal round lifecycle transition.
    #[error("KM_ERR_203: Round {round_id} cannot move from {from} to {to}")]
    InvalidRoundTransition {
        round_id: RoundId,
        from: RoundStatus,
        to: RoundStatus,
    },

    /// Illegal wager-market lifecycle transition.
    #[error("KM_ERR_204: Market {market_id} cannot move from {from} to {to}")]
    InvalidMarketTransition {
        market_id: MarketId,
        from: MarketStatus,
        to: MarketStatus,
    },

    /// Illegal withdrawal lifecycle transition.
    #[error("KM_ERR_205: Withdrawal {withdrawal_id} cannot move from {from} to {to}")]
    InvalidWithdrawalTransition {
        withdrawal_id: WithdrawalId,
        from: WithdrawalStatus,
        to: WithdrawalStatus,
    },

    /// An order with this ID already rests in the book.
    #[error("KM_ERR_206: Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// The withdrawal has escrow activity that a refund would orphan.
    #[error("KM_ERR_207: Withdrawal {withdrawal_id} is committed to escrow: {reason}")]
    WithdrawalCommitted {
        withdrawal_id: WithdrawalId,
        reason: String,
    },

    // =================================================================
    // Halt (3xx)
    // =================================================================
    /// Emergency halt is active (or its status could not be read).
    #[error("KM_ERR_300: System halted: {reason}")]
    Halted { reason: String },

    // =================================================================
    // Upstream Errors (4xx)
    // =================================================================
    /// The persistence layer failed.
    #[error("KM_ERR_400: Storage failure: {reason}")]
    Storage { reason: String },

    /// The custodial escrow / multisig client failed.
    #[error("KM_ERR_401: Escrow failure: {reason}")]
    Escrow { reason: String },

    /// An external confirmation did not arrive in time.
    #[error("KM_ERR_402: {operation} timed out after {timeout_ms}ms")]
    UpstreamTimeout { operation: String, timeout_ms: u64 },

    // =================================================================
    // Not Found (5xx)
    // =================================================================
    #[error("KM_ERR_500: Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("KM_ERR_501: Outcome not found: {0}")]
    OutcomeNotFound(OutcomeId),

    #[error("KM_ERR_502: Round not found: {0}")]
    RoundNotFound(RoundId),

    #[error("KM_ERR_503: Market not found: {0}")]
    MarketNotFound(MarketId),

    #[error("KM_ERR_504: Withdrawal not found: {0}")]
    WithdrawalNotFound(WithdrawalId),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("KM_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("KM_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, inconsistent values).
    #[error("KM_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk, network).
    #[error("KM_ERR_903: I/O error: {0}")]
    Io(String),
}

impl KolmarketError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidField { .. }
            | Self::InvalidOrder { .. }
            | Self::InvalidSignature
            | Self::CommandExpired { .. }
            | Self::NonceReused { .. }
            | Self::Unauthorized { .. }
            | Self::InsufficientBalance { .. }
            | Self::InvalidTxSignature { .. }
            | Self::MissingResolution(_) => ErrorKind::Validation,
            Self::OrderNotActive { .. }
            | Self::RoundNotOpen { .. }
            | Self::OutcomeNotOpen { .. }
            | Self::InvalidRoundTransition { .. }
            | Self::InvalidMarketTransition { .. }
            | Self::InvalidWithdrawalTransition { .. }
            | Self::DuplicateOrder(_)
            | Self::WithdrawalCommitted { .. } => ErrorKind::StateConflict,
            Self::Halted { .. } => ErrorKind::Halted,
            Self::Storage { .. } | Self::Escrow { .. } | Self::UpstreamTimeout { .. } => {
                ErrorKind::Upstream
            }
            Self::OrderNotFound(_)
            | Self::OutcomeNotFound(_)
            | Self::RoundNotFound(_)
            | Self::MarketNotFound(_)
            | Self::WithdrawalNotFound(_) => ErrorKind::NotFound,
            Self::Internal(_) | Self::Serialization(_) | Self::Configuration(_) | Self::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Stable machine-readable reason string surfaced to clients.
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidField { .. } => "INVALID_FIELD",
            Self::InvalidOrder { .. } => "INVALID_ORDER",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::CommandExpired { .. } => "COMMAND_EXPIRED",
            Self::NonceReused { .. } => "NONCE_REUSED",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::InvalidTxSignature { .. } => "INVALID_TX_SIG",
            Self::MissingResolution(_) => "MISSING_RESOLUTION",
            Self::OrderNotActive { .. } => "ORDER_NOT_ACTIVE",
            Self::RoundNotOpen { .. } => "ROUND_NOT_OPEN",
            Self::OutcomeNotOpen { .. } => "OUTCOME_NOT_OPEN",
            Self::InvalidRoundTransition { .. } => "INVALID_ROUND_TRANSITION",
            Self::InvalidMarketTransition { .. } => "INVALID_MARKET_TRANSITION",
            Self::InvalidWithdrawalTransition { .. } => "INVALID_WITHDRAWAL_TRANSITION",
            Self::DuplicateOrder(_) => "DUPLICATE_ORDER",
            Self::WithdrawalCommitted { .. } => "WITHDRAWAL_COMMITTED",
            Self::Halted { .. } => "HALTED",
            Self::Storage { .. } => "STORAGE_ERROR",
            Self::Escrow { .. } => "ESCROW_ERROR",
            Self::UpstreamTimeout { .. } => "UPSTREAM_TIMEOUT",
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::OutcomeNotFound(_) => "OUTCOME_NOT_FOUND",
            Self::RoundNotFound(_) => "ROUND_NOT_FOUND",
            Self::MarketNotFound(_) => "MARKET_NOT_FOUND",
            Self::WithdrawalNotFound(_) => "WITHDRAWAL_NOT_FOUND",
            Self::Internal(_) => "INTERNAL",
            Self::Serialization(_) => "SERIALIZATION",
            Self::Configuration(_) => "CONFIGURATION",
            Self::Io(_) => "IO",
        }
    }

    /// HTTP-equivalent status for transport layers.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            // Reuse of a consumed nonce is a conflict, not a malformed request.
            Self::NonceReused { .. } => 409,
            Self::Unauthorized { .. } | Self::InvalidSignature => 401,
            _ => match self.kind() {
                ErrorKind::Validation => 400,
                ErrorKind::StateConflict => 409,
                ErrorKind::Halted => 503,
                ErrorKind::Upstream => 502,
                ErrorKind::NotFound => 404,
                ErrorKind::Internal => 500,
            },
        }
    }

    /// Whether the same request may succeed later without modification.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Halted | ErrorKind::Upstream)
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, KolmarketError>;

impl From<std::io::Error> for KolmarketError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for KolmarketError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = KolmarketError::OrderNotFound(OrderId::new());
        let msg = format!("{err}");
        assert!(msg.starts_with("KM_ERR_500"), "Got: {msg}");
    }

    #[test]
    fn insufficient_balance_display() {
        let err = KolmarketError::InsufficientBalance {
            needed: Decimal::new(100, 0),
            available: Decimal::new(50, 0),
        };
        let msg = format!("{err}");
        assert!(msg.contains("KM_ERR_106"));
        assert!(msg.contains("100"));
        assert!(msg.contains("50"));
    }

    #[test]
    fn round_not_open_display() {
        let err = KolmarketError::RoundNotOpen {
            round_id: RoundId::new(),
            status: RoundStatus::Locked,
        };
        let msg = format!("{err}");
        assert!(msg.contains("KM_ERR_201"));
        assert!(msg.contains("LOCKED"));
    }

    #[test]
    fn committed_withdrawal_is_a_conflict() {
        let err = KolmarketError::WithdrawalCommitted {
            withdrawal_id: WithdrawalId::new(),
            reason: "proposal in flight".into(),
        };
        assert!(format!("{err}").starts_with("KM_ERR_207"));
        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert_eq!(err.http_status(), 409);
        assert!(!err.is_retryable());
    }

    #[test]
    fn nonce_reuse_is_a_conflict() {
        let err = KolmarketError::NonceReused {
            wallet: "ab".into(),
            nonce: "n-1".into(),
        };
        assert_eq!(err.reason_code(), "NONCE_REUSED");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.http_status(), 409);
        assert!(!err.is_retryable());
    }

    #[test]
    fn halted_is_distinct_and_retryable() {
        let err = KolmarketError::Halted {
            reason: "maintenance".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Halted);
        assert_eq!(err.http_status(), 503);
        assert!(err.is_retryable());
    }

    #[test]
    fn upstream_is_retryable() {
        let err = KolmarketError::UpstreamTimeout {
            operation: "proposal confirm".into(),
            timeout_ms: 30_000,
        };
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert!(err.is_retryable());
    }

    #[test]
    fn all_errors_have_km_err_prefix() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(KolmarketError::InvalidSignature),
            Box::new(KolmarketError::Halted { reason: "x".into() }),
            Box::new(KolmarketError::Storage { reason: "x".into() }),
            Box::new(KolmarketError::Internal("test".into())),
            Box::new(KolmarketError::WithdrawalNotFound(WithdrawalId::new())),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(msg.starts_with("KM_ERR_"), "Error missing KM_ERR_ prefix: {msg}");
        }
    }
}
