//! Canonical messages and ed25519 signatures for client commands.
//!
//! A wallet signs the UTF-8 bytes of:
//!
//! ```text
//! KOLMarket: place order
//! action=place_order
//! wallet=<hex pubkey>
//! outcome_id=<uuid>
//! ...
//! nonce=<nonce>
//! issued_at=2026-01-02T03:04:05.678Z
//! ```
//!
//! i.e. the command title, then one `key=value` line per field in declared
//! order, joined by `\n` with no trailing newline.

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use kolmarket_types::{Command, KolmarketError, Result, SignedCommand, WalletPubkey};

/// Build the exact text a wallet signs.
#[must_use]
pub fn canonical_message(title: &str, fields: &[(&str, String)]) -> String {
    let mut lines = Vec::with_capacity(fields.len() + 1);
    lines.push(title.to_string());
    lines.extend(fields.iter().map(|(k, v)| format!("{k}={v}")));
    lines.join("\n")
}

/// Canonical message for a signed command.
#[must_use]
pub fn command_message(cmd: &SignedCommand) -> String {
    canonical_message(cmd.command.title(), &cmd.message_fields())
}

/// Verify the command's signature against its claimed wallet.
pub fn verify_signature(cmd: &SignedCommand) -> Result<()> {
    let key = VerifyingKey::from_bytes(cmd.wallet.as_bytes()).map_err(|e| {
        KolmarketError::InvalidField {
            field: "wallet",
            reason: format!("not an ed25519 public key: {e}"),
        }
    })?;

    let raw = hex::decode(&cmd.signature).map_err(|e| KolmarketError::InvalidField {
        field: "signature",
        reason: e.to_string(),
    })?;
    let bytes: [u8; 64] = raw
        .as_slice()
        .try_into()
        .map_err(|_| KolmarketError::InvalidField {
            field: "signature",
            reason: format!("expected 64 bytes, got {}", raw.len()),
        })?;
    let signature = Signature::from_bytes(&bytes);

    key.verify_strict(command_message(cmd).as_bytes(), &signature)
        .map_err(|_| KolmarketError::InvalidSignature)
}

/// Reject commands whose `issued_at` is more than `max_skew_secs` away
/// from `now`, in either direction.
pub fn check_freshness(
    issued_at: DateTime<Utc>,
    now: DateTime<Utc>,
    max_skew_secs: i64,
) -> Result<()> {
    let skew_secs = (now - issued_at).num_seconds().abs();
    if skew_secs > max_skew_secs {
        return Err(KolmarketError::CommandExpired {
            skew_secs,
            max_skew_secs,
        });
    }
    Ok(())
}

/// Sign `command` as the wallet behind `key`. Client-side helper.
#[must_use]
pub fn sign_command(
    key: &SigningKey,
    command: Command,
    nonce: impl Into<String>,
    issued_at: DateTime<Utc>,
) -> SignedCommand {
    let mut cmd = SignedCommand {
        wallet: WalletPubkey(key.verifying_key().to_bytes()),
        nonce: nonce.into(),
        issued_at,
        signature: String::new(),
        command,
    };
    let signature = key.sign(command_message(&cmd).as_bytes());
    cmd.signature = hex::encode(signature.to_bytes());
    cmd
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use kolmarket_types::OrderId;
    use rand::rngs::OsRng;
    use rust_decimal::Decimal;

    use super::*;

    fn cancel() -> Command {
        Command::CancelOrder {
            order_id: OrderId::from_bytes([1; 16]),
        }
    }

    #[test]
    fn canonical_message_layout() {
        let msg = canonical_message(
            "Title",
            &[("a", "1".to_string()), ("b", "two".to_string())],
        );
        assert_eq!(msg, "Title\na=1\nb=two");
    }

    #[test]
    fn signed_command_verifies() {
        let key = SigningKey::generate(&mut OsRng);
        let cmd = sign_command(&key, cancel(), "n-1", Utc::now());
        verify_signature(&cmd).unwrap();
        assert!(command_message(&cmd).starts_with("KOLMarket: cancel order\naction=cancel_order\n"));
    }

    #[test]
    fn tampered_payload_fails() {
        let key = SigningKey::generate(&mut OsRng);
        let mut cmd = sign_command(
            &key,
            Command::RequestWithdrawal {
                amount: Decimal::ONE,
            },
            "n-1",
            Utc::now(),
        );
        cmd.command = Command::RequestWithdrawal {
            amount: Decimal::new(100, 0),
        };
        assert!(matches!(
            verify_signature(&cmd),
            Err(KolmarketError::InvalidSignature)
        ));
    }

    #[test]
    fn wrong_wallet_fails() {
        let key = SigningKey::generate(&mut OsRng);
        let other = SigningKey::generate(&mut OsRng);
        let mut cmd = sign_command(&key, cancel(), "n-1", Utc::now());
        cmd.wallet = WalletPubkey(other.verifying_key().to_bytes());
        assert!(verify_signature(&cmd).is_err());
    }

    #[test]
    fn malformed_signature_is_field_error() {
        let key = SigningKey::generate(&mut OsRng);
        let mut cmd = sign_command(&key, cancel(), "n-1", Utc::now());
        cmd.signature = "abcd".into();
        assert!(matches!(
            verify_signature(&cmd),
            Err(KolmarketError::InvalidField { field: "signature", .. })
        ));
    }

    #[test]
    fn freshness_window_is_symmetric() {
        let now = Utc::now();
        check_freshness(now - Duration::seconds(300), now, 300).unwrap();
        check_freshness(now + Duration::seconds(299), now, 300).unwrap();
        assert!(matches!(
            check_freshness(now - Duration::seconds(301), now, 300),
            Err(KolmarketError::CommandExpired { skew_secs: 301, .. })
        ));
        assert!(check_freshness(now + Duration::minutes(10), now, 300).is_err());
    }
}
