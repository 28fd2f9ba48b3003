//! Globally unique identifiers used throughout KOLMarket.
//!
//! All entity IDs use UUIDv7 for time-ordered lexicographic sorting,
//! except [`WalletPubkey`] which is the raw ed25519 public key of a wallet.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUIDv7-backed identifier newtype.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            #[must_use]
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }

            /// Extract the embedded timestamp (milliseconds since UNIX epoch).
            #[must_use]
            pub fn timestamp_ms(&self) -> u64 {
                let bytes = self.0.as_bytes();
                u64::from_be_bytes([
                    0, 0, bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5],
                ])
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = crate::KolmarketError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix($prefix).unwrap_or(s);
                Uuid::parse_str(raw).map(Self).map_err(|e| {
                    crate::KolmarketError::InvalidField {
                        field: stringify!($name),
                        reason: e.to_string(),
                    }
                })
            }
        }
    };
}

uuid_id!(
    /// Order identifier.
    OrderId,
    ""
);
uuid_id!(
    /// Fill identifier. Fills are immutable once created.
    FillId,
    "fill:"
);
uuid_id!(
    /// Shared identifier of every fill produced by one taker placement.
    MatchId,
    "match:"
);
uuid_id!(
    /// A single YES/NO outcome market nested under a round.
    OutcomeId,
    "outcome:"
);
uuid_id!(
    /// A time-boxed batch of outcome markets.
    RoundId,
    "round:"
);
uuid_id!(
    /// A wager-style market on a KOL's trading window.
    MarketId,
    "market:"
);
uuid_id!(
    /// A custodial withdrawal request.
    WithdrawalId,
    "wd:"
);

// ---------------------------------------------------------------------------
// WalletPubkey
// ---------------------------------------------------------------------------

/// A wallet's raw ed25519 public key (32 bytes).
///
/// Text form is lowercase hex; serde uses the text form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletPubkey(pub [u8; 32]);

impl WalletPubkey {
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First four bytes in hex, for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for WalletPubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for WalletPubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WalletPubkey({})", self.short())
    }
}

impl FromStr for WalletPubkey {
    type Err = crate::KolmarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| crate::KolmarketError::InvalidField {
            field: "wallet",
            reason: e.to_string(),
        })?;
        let arr: [u8; 32] =
            bytes
                .try_into()
                .map_err(|v: Vec<u8>| crate::KolmarketError::InvalidField {
                    field: "wallet",
                    reason: format!("expected 32 bytes, got {}", v.len()),
                })?;
        Ok(Self(arr))
    }
}

impl TryFrom<String> for WalletPubkey {
    type Error = crate::KolmarketError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WalletPubkey> for String {
    fn from(value: WalletPubkey) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
