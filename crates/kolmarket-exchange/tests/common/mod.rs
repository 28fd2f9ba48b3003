//! Shared fixtures: an exchange on a manual clock with a mock multisig, and
//! wallets that sign their own commands.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ed25519_dalek::SigningKey;
use kolmarket_exchange::{Exchange, PlaceOrderResult};
use kolmarket_ingress::{InMemoryHaltStore, InMemoryNonceStore, ManualClock, sign_command};
use kolmarket_settlement::mock::MockMultisig;
use kolmarket_types::*;
use rand::rngs::OsRng;
use rust_decimal::Decimal;

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub fn start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_750_000_000, 0).unwrap()
}

pub struct Wallet {
    key: SigningKey,
    nonce: AtomicU64,
}

impl Wallet {
    pub fn new() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
            nonce: AtomicU64::new(0),
        }
    }

    pub fn pubkey(&self) -> WalletPubkey {
        WalletPubkey(self.key.verifying_key().to_bytes())
    }

    pub fn sign(&self, command: Command, now: DateTime<Utc>) -> SignedCommand {
        let n = self.nonce.fetch_add(1, Ordering::SeqCst);
        self.sign_with_nonce(command, &format!("n-{n}"), now)
    }

    pub fn sign_with_nonce(&self, command: Command, nonce: &str, now: DateTime<Utc>) -> SignedCommand {
        sign_command(&self.key, command, nonce, now)
    }
}

pub struct Harness {
    pub ex: Exchange<MockMultisig>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        let mut config = ExchangeConfig::default();
        config.taker_fee_bps = 0;
        config.escrow.multisig_address = "Multisig111".into();
        config.escrow.confirm_timeout_ms = 200;
        Self::with_config(config)
    }

    pub fn with_config(config: ExchangeConfig) -> Self {
        let clock = Arc::new(ManualClock::new(start()));
        let ex = Exchange::new(
            config,
            clock.clone(),
            Box::new(InMemoryHaltStore::new()),
            Arc::new(InMemoryNonceStore::new()),
            MockMultisig::new(),
        )
        .unwrap()
        .with_escrow_poll_interval(Duration::from_millis(5));
        Self { ex, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        use kolmarket_ingress::Clock;
        self.clock.now()
    }

    /// An OPEN round locking in one hour, with `n` outcomes.
    pub fn round_with_outcomes(&self, rake_bps: u16, n: usize) -> (Round, Vec<OutcomeMarket>) {
        let now = self.now();
        let round = self
            .ex
            .create_round(RoundParams {
                market_type: "kol_daily_pnl".into(),
                start_ts: now,
                lock_ts: now + ChronoDuration::hours(1),
                settle_ts: now + ChronoDuration::hours(2),
                collateral_mint: "SOL".into(),
                escrow_wallet_pubkey: WalletPubkey([0xEE; 32]),
                rake_bps,
            })
            .unwrap();
        let outcomes = (0..n)
            .map(|i| {
                self.ex
                    .add_outcome(round.id, WalletPubkey([i as u8 + 1; 32]), format!("KOL #{i} top 10?"))
                    .unwrap()
            })
            .collect();
        (round, outcomes)
    }

    pub fn place(
        &self,
        wallet: &Wallet,
        outcome: OutcomeId,
        side: OrderSide,
        price: &str,
        qty: &str,
    ) -> Result<PlaceOrderResult> {
        let key = format!("k-{}", wallet.nonce.load(Ordering::SeqCst));
        let cmd = wallet.sign(
            Command::PlaceOrder {
                outcome_id: outcome,
                side,
                price: dec(price),
                quantity: dec(qty),
                idempotency_key: key,
            },
            self.now(),
        );
        self.ex.place_order(&cmd)
    }

    /// Give `wallet` a settled balance of `amount` by trading and settling
    /// a single-outcome round in its favour.
    pub fn fund(&self, wallet: &Wallet, amount: &str) {
        let (round, outcomes) = self.round_with_outcomes(0, 1);
        let counterparty = Wallet::new();
        self.place(&counterparty, outcomes[0].id, OrderSide::Sell, "0.5", amount)
            .unwrap();
        self.place(wallet, outcomes[0].id, OrderSide::Buy, "0.5", amount)
            .unwrap();
        let resolutions = HashMap::from([(outcomes[0].id, FinalOutcome::Yes)]);
        self.ex.settle_round(round.id, &resolutions, None).unwrap();
    }
}
