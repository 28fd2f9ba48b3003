//! Client-signed commands.
//!
//! Every mutation a wallet can request arrives as a [`SignedCommand`]: a
//! strictly-typed [`Command`] plus the envelope fields (wallet, nonce,
//! `issued_at`, signature). The signature covers a canonical text message
//! built from [`Command::title`] and [`SignedCommand::message_fields`], in
//! declared order.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    KolmarketError, OrderId, OrderSide, OutcomeId, Result, WalletPubkey, constants,
};

/// Action tag bound into every consumed nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTag {
    PlaceOrder,
    CancelOrder,
    RequestWithdrawal,
}

impl ActionTag {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlaceOrder => "place_order",
            Self::CancelOrder => "cancel_order",
            Self::RequestWithdrawal => "request_withdrawal",
        }
    }
}

impl std::fmt::Display for ActionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The typed payload of a signed command, one variant per operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    PlaceOrder {
        outcome_id: OutcomeId,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
        idempotency_key: String,
    },
    CancelOrder {
        order_id: OrderId,
    },
    RequestWithdrawal {
        amount: Decimal,
    },
}

impl Command {
    #[must_use]
    pub fn action(&self) -> ActionTag {
        match self {
            Self::PlaceOrder { .. } => ActionTag::PlaceOrder,
            Self::CancelOrder { .. } => ActionTag::CancelOrder,
            Self::RequestWithdrawal { .. } => ActionTag::RequestWithdrawal,
        }
    }

    /// Fixed first line of the signed message.
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            Self::PlaceOrder { .. } => "KOLMarket: place order",
            Self::CancelOrder { .. } => "KOLMarket: cancel order",
            Self::RequestWithdrawal { .. } => "KOLMarket: request withdrawal",
        }
    }

    /// Payload fields in declared order.
    #[must_use]
    pub fn payload_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::PlaceOrder {
                outcome_id,
                side,
                price,
                quantity,
                idempotency_key,
            } => vec![
                ("outcome_id", outcome_id.0.to_string()),
                ("side", side.to_string()),
                ("price", price.normalize().to_string()),
                ("quantity", quantity.normalize().to_string()),
                ("idempotency_key", idempotency_key.clone()),
            ],
            Self::CancelOrder { order_id } => vec![("order_id", order_id.0.to_string())],
            Self::RequestWithdrawal { amount } => {
                vec![("amount", amount.normalize().to_string())]
            }
        }
    }

    /// Structural checks that need no state.
    pub fn validate_schema(&self) -> Result<()> {
        match self {
            Self::PlaceOrder {
                idempotency_key, ..
            } => {
                if idempotency_key.trim().is_empty() {
                    return Err(KolmarketError::InvalidField {
                        field: "idempotency_key",
                        reason: "must not be empty".into(),
                    });
                }
                if idempotency_key.len() > constants::MAX_IDEMPOTENCY_KEY_LEN {
                    return Err(KolmarketError::InvalidField {
                        field: "idempotency_key",
                        reason: format!(
                            "longer than {} characters",
                            constants::MAX_IDEMPOTENCY_KEY_LEN
                        ),
                    });
                }
                if idempotency_key.contains('\n') {
                    return Err(KolmarketError::InvalidField {
                        field: "idempotency_key",
                        reason: "must be a single line".into(),
                    });
                }
                Ok(())
            }
            Self::CancelOrder { .. } => Ok(()),
            Self::RequestWithdrawal { amount } => {
                if *amount <= Decimal::ZERO {
                    return Err(KolmarketError::InvalidField {
                        field: "amount",
                        reason: format!("{amount} must be positive"),
                    });
                }
                Ok(())
            }
        }
    }
}

/// A command plus the envelope the wallet signed over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedCommand {
    pub wallet: WalletPubkey,
    /// Single-use token preventing replay.
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    /// Hex-encoded 64-byte ed25519 signature.
    pub signature: String,
    pub command: Command,
}

impl SignedCommand {
    /// All signed fields in declared order: action, wallet, the payload
    /// fields, then nonce and `issued_at`.
    #[must_use]
    pub fn message_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::with_capacity(8);
        fields.push(("action", self.command.action().to_string()));
        fields.push(("wallet", self.wallet.to_string()));
        fields.extend(self.command.payload_fields());
        fields.push(("nonce", self.nonce.clone()));
        fields.push((
            "issued_at",
            self.issued_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        ));
        fields
    }

    /// Envelope and payload checks that need no state.
    pub fn validate_schema(&self) -> Result<()> {
        if self.nonce.trim().is_empty() || self.nonce.len() > constants::MAX_NONCE_LEN {
            return Err(KolmarketError::InvalidField {
                field: "nonce",
                reason: format!("must be 1..={} characters", constants::MAX_NONCE_LEN),
            });
        }
        if self.nonce.contains('\n') {
            return Err(KolmarketError::InvalidField {
                field: "nonce",
                reason: "must be a single line".into(),
            });
        }
        if self.signature.is_empty() {
            return Err(KolmarketError::InvalidField {
                field: "signature",
                reason: "missing".into(),
            });
        }
        self.command.validate_schema()
    }
}

/// A consumed `(wallet, nonce)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceRecord {
    pub wallet: WalletPubkey,
    pub nonce: String,
    pub action: ActionTag,
    pub issued_at: DateTime<Utc>,
}

impl NonceRecord {
    #[must_use]
    pub fn from_command(cmd: &SignedCommand) -> Self {
        Self {
            wallet: cmd.wallet,
            nonce: cmd.nonce.clone(),
            action: cmd.command.action(),
            issued_at: cmd.issued_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place() -> Command {
        Command::PlaceOrder {
            outcome_id: OutcomeId::from_bytes([1; 16]),
            side: OrderSide::Buy,
            price: "0.450".parse().unwrap(),
            quantity: Decimal::new(10, 0),
            idempotency_key: "k-1".into(),
        }
    }

    fn signed(command: Command) -> SignedCommand {
        SignedCommand {
            wallet: WalletPubkey([4; 32]),
            nonce: "n-1".into(),
            issued_at: DateTime::parse_from_rfc3339("2026-01-02T03:04:05.678Z")
                .unwrap()
                .with_timezone(&Utc),
            signature: "00".into(),
            command,
        }
    }

    #[test]
    fn message_fields_declared_order() {
        let cmd = signed(place());
        let keys: Vec<&str> = cmd.message_fields().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec![
                "action",
                "wallet",
                "outcome_id",
                "side",
                "price",
                "quantity",
                "idempotency_key",
                "nonce",
                "issued_at"
            ]
        );
    }

    #[test]
    fn decimals_are_normalized_in_message() {
        let fields = signed(place()).message_fields();
        let price = fields.iter().find(|(k, _)| *k == "price").unwrap();
        assert_eq!(price.1, "0.45");
        let issued = fields.iter().find(|(k, _)| *k == "issued_at").unwrap();
        assert_eq!(issued.1, "2026-01-02T03:04:05.678Z");
    }

    #[test]
    fn tagged_json_shape() {
        let json = serde_json::to_value(Command::CancelOrder {
            order_id: OrderId::from_bytes([2; 16]),
        })
        .unwrap();
        assert_eq!(json["action"], "cancel_order");

        let bad = serde_json::json!({ "action": "drain_vault", "amount": "1" });
        assert!(serde_json::from_value::<Command>(bad).is_err());
    }

    #[test]
    fn schema_rejects_bad_envelope() {
        let mut cmd = signed(place());
        cmd.nonce = String::new();
        assert!(cmd.validate_schema().is_err());

        let cmd = signed(Command::RequestWithdrawal {
            amount: Decimal::ZERO,
        });
        assert!(matches!(
            cmd.validate_schema(),
            Err(KolmarketError::InvalidField { field: "amount", .. })
        ));

        let cmd = signed(Command::PlaceOrder {
            outcome_id: OutcomeId::new(),
            side: OrderSide::Sell,
            price: Decimal::new(5, 1),
            quantity: Decimal::ONE,
            idempotency_key: "  ".into(),
        });
        assert!(cmd.validate_schema().is_err());
    }

    #[test]
    fn nonce_record_binds_action() {
        let rec = NonceRecord::from_command(&signed(place()));
        assert_eq!(rec.action, ActionTag::PlaceOrder);
        assert_eq!(rec.nonce, "n-1");
    }
}
