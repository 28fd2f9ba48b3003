//! # kolmarket-ingress
//!
//! **Security Envelope Plane**: signed command verification, nonce replay
//! protection, and the emergency halt switch.
//!
//! ## Architecture
//!
//! The Security Envelope sits between the caller and every state mutation:
//! 1. **HaltSwitch**: fail-closed emergency stop, cached with write-through
//! 2. **signed**: canonical messages and ed25519 verification
//! 3. **NonceStore**: atomic single-use `(wallet, nonce)` consumption
//! 4. **CommandVerifier**: runs the checks above in a fixed order
//! 5. **Clock**: injectable time source
//!
//! ## Command Flow
//!
//! ```text
//! SignedCommand → HaltSwitch.ensure_not_halted() → schema → signature
//!     → freshness → NonceStore.consume() → engine / coordinator
//! ```

pub mod clock;
pub mod halt;
pub mod nonce;
pub mod signed;
pub mod verifier;

pub use clock::{Clock, ManualClock, SystemClock};
pub use halt::{FileHaltStore, HaltStore, HaltSwitch, InMemoryHaltStore};
pub use nonce::{InMemoryNonceStore, NonceStore};
pub use signed::{canonical_message, check_freshness, command_message, sign_command, verify_signature};
pub use verifier::{CommandVerifier, VerifierConfig};
