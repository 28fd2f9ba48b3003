//! Order types for the KOLMarket matching engine.
//!
//! Orders are limit orders on a single outcome market. Price is a
//! probability strictly between 0 and 1; quantity is in outcome units.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{KolmarketError, OrderId, OutcomeId, Result, WalletPubkey, constants};

/// Which side of the book this order is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderSide {
    type Err = KolmarketError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(KolmarketError::InvalidField {
                field: "side",
                reason: format!("unknown side `{other}`"),
            }),
        }
    }
}

/// Lifecycle status of an order.
///
/// ```text
/// OPEN ──fill──▶ PARTIALLY_FILLED ──fill──▶ FILLED
///   │                  │
///   ├──cancel/expire───┴──▶ CANCELLED / EXPIRED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Expired,
}

impl OrderStatus {
    /// Terminal states are immutable.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Expired)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// A limit order on one outcome market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub outcome_id: OutcomeId,
    pub user: WalletPubkey,
    pub side: OrderSide,
    pub status: OrderStatus,
    pub price: Decimal,
    pub quantity: Decimal,
    pub remaining_qty: Decimal,
    /// Client-chosen key, unique per (user, action).
    pub idempotency_key: String,
    /// Arrival sequence within the outcome's book (time priority).
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A new OPEN limit order. Terms are validated; `sequence` is assigned
    /// by the book on arrival.
    pub fn new_limit(
        outcome_id: OutcomeId,
        user: WalletPubkey,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
        idempotency_key: String,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        Self::validate_terms(price, quantity)?;
        Ok(Self {
            id: OrderId::new(),
            outcome_id,
            user,
            side,
            status: OrderStatus::Open,
            price,
            quantity,
            remaining_qty: quantity,
            idempotency_key,
            sequence: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Check price and quantity terms of a new order.
    ///
    /// Price must satisfy `0 < price < 1`, quantity must be positive, and
    /// neither may carry more than the configured decimal precision.
    pub fn validate_terms(price: Decimal, quantity: Decimal) -> Result<()> {
        if price <= Decimal::ZERO || price >= Decimal::ONE {
            return Err(KolmarketError::InvalidOrder {
                reason: format!("price {price} must be strictly between 0 and 1"),
            });
        }
        if quantity <= Decimal::ZERO {
            return Err(KolmarketError::InvalidOrder {
                reason: format!("quantity {quantity} must be positive"),
            });
        }
        if price.normalize().scale() > constants::PRICE_PRECISION {
            return Err(KolmarketError::InvalidOrder {
                reason: format!(
                    "price {price} exceeds {} decimal places",
                    constants::PRICE_PRECISION
                ),
            });
        }
        if quantity.normalize().scale() > constants::QTY_PRECISION {
            return Err(KolmarketError::InvalidOrder {
                reason: format!(
                    "quantity {quantity} exceeds {} decimal places",
                    constants::QTY_PRECISION
                ),
            });
        }
        Ok(())
    }

    /// Whether this order would trade against a resting order at `price`.
    #[must_use]
    pub fn is_matchable_at(&self, price: Decimal) -> bool {
        match self.side {
            OrderSide::Buy => self.price >= price,
            OrderSide::Sell => self.price <= price,
        }
    }

    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.remaining_qty.is_zero()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    #[must_use]
    pub fn filled_qty(&self) -> Decimal {
        self.quantity - self.remaining_qty
    }

    fn ensure_active(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(KolmarketError::OrderNotActive {
                order_id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }

    /// Record a fill of `qty` against this order.
    ///
    /// `remaining_qty` only ever decreases; the status flips to FILLED at
    /// zero and PARTIALLY_FILLED otherwise.
    pub fn apply_fill(&mut self, qty: Decimal, now: DateTime<Utc>) -> Result<()> {
        self.ensure_active()?;
        if qty <= Decimal::ZERO || qty > self.remaining_qty {
            return Err(KolmarketError::Internal(format!(
                "fill {qty} out of range for order {} with remaining {}",
                self.id, self.remaining_qty
            )));
        }
        self.remaining_qty -= qty;
        self.status = if self.remaining_qty.is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.updated_at = now;
        Ok(())
    }

    /// Void the remaining quantity. Existing fills are untouched.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_active()?;
        self.status = OrderStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    /// Expire a resting order (round lock or settlement).
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_active()?;
        self.status = OrderStatus::Expired;
        self.updated_at = now;
        Ok(())
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    pub fn dummy(side: OrderSide, price: Decimal, qty: Decimal) -> Self {
        Self::dummy_for_user(WalletPubkey(rand::random()), side, price, qty)
    }

    pub fn dummy_for_user(
        user: WalletPubkey,
        side: OrderSide,
        price: Decimal,
        qty: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            outcome_id: OutcomeId::from_bytes([9; 16]),
            user,
            side,
            status: OrderStatus::Open,
            price,
            quantity: qty,
            remaining_qty: qty,
            idempotency_key: OrderId::new().to_string(),
            sequence: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
