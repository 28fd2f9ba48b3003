//! System-wide constants for the KOLMarket exchange core.

/// Maximum decimal precision for prices (8 decimal places).
pub const PRICE_PRECISION: u32 = 8;

/// Maximum decimal precision for quantities (8 decimal places).
pub const QTY_PRECISION: u32 = 8;

/// Basis-point denominator (100% = 10,000 bps).
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Lamports in one SOL.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Default tolerance between a signed command's `issued_at` and now.
pub const DEFAULT_SIGNATURE_MAX_SKEW_SECS: i64 = 5 * 60;

/// Default order book snapshot depth (price levels per side).
pub const DEFAULT_ORDERBOOK_DEPTH: usize = 200;

/// Hard cap on order book snapshot depth.
pub const MAX_ORDERBOOK_DEPTH: usize = 500;

/// Default page size of the fills feed.
pub const DEFAULT_FILLS_LIMIT: usize = 100;

/// Hard cap on the fills feed page size.
pub const MAX_FILLS_LIMIT: usize = 500;

/// Default batch size for lock/close sweeps.
pub const DEFAULT_SWEEP_BATCH_LIMIT: usize = 1000;

/// How long a halt status read may be served from cache.
pub const DEFAULT_HALT_CACHE_TTL_MS: u64 = 2000;

/// Default timeout for each escrow confirmation wait.
pub const DEFAULT_ESCROW_CONFIRM_TIMEOUT_MS: u64 = 30_000;

/// Interval between escrow confirmation polls.
pub const ESCROW_CONFIRM_POLL_MS: u64 = 500;

/// Minimum plausible length of a transaction signature string.
pub const MIN_TX_SIGNATURE_LEN: usize = 20;

/// Maximum length of a client idempotency key.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Maximum length of a client nonce.
pub const MAX_NONCE_LEN: usize = 128;

/// Settlement idempotency cache size (number of round ids to remember).
pub const SETTLEMENT_IDEMPOTENCY_CACHE_SIZE: usize = 100_000;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "KOLMarket";
