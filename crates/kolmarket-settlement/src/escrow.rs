//! Custodial escrow seam.
//!
//! The escrow is a multisig-controlled vault. This core only needs the
//! calls below; the co-signing protocol behind them is external. Every call
//! that submits a transaction returns its signature.

use std::future::Future;

use kolmarket_types::{Result, WalletPubkey};
use serde::{Deserialize, Serialize};

/// Single-instruction SOL transfer out of the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMessage {
    /// Vault address the lamports leave from.
    pub from: String,
    pub to: WalletPubkey,
    pub lamports: u64,
}

/// Client for the multisig program.
pub trait MultisigClient: Send + Sync {
    /// Deterministic vault address for `(multisig, vault_index)`.
    fn vault_address(&self, multisig: &str, vault_index: u8) -> Result<String>;

    /// Index the next vault transaction will be created at.
    fn next_transaction_index(&self, multisig: &str) -> impl Future<Output = Result<u64>> + Send;

    /// Submit a vault-transaction-create carrying `message`.
    fn create_vault_transaction(
        &self,
        multisig: &str,
        vault_index: u8,
        transaction_index: u64,
        message: &TransferMessage,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Submit a proposal-create for `transaction_index`.
    fn create_proposal(
        &self,
        multisig: &str,
        transaction_index: u64,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Poll once: `true` once `signature` is confirmed on chain.
    fn confirm(&self, signature: &str) -> impl Future<Output = Result<bool>> + Send;
}
