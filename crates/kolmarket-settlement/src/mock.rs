//! In-process [`MultisigClient`] for tests.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use kolmarket_types::{KolmarketError, Result};
use parking_lot::Mutex;

use crate::escrow::{MultisigClient, TransferMessage};

/// Failure to inject into the next matching call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    CreateTransaction,
    CreateProposal,
    /// The next submitted signature does not confirm until
    /// [`MockMultisig::confirm_external`] is called for it.
    NeverConfirm,
}

/// Records every transfer and confirms signatures immediately unless told
/// otherwise.
#[derive(Debug, Default)]
pub struct MockMultisig {
    next_index: AtomicU64,
    sig_counter: AtomicU64,
    confirm_calls: AtomicUsize,
    transfers: Mutex<Vec<TransferMessage>>,
    failures: Mutex<VecDeque<Failure>>,
    unconfirmable: Mutex<HashSet<String>>,
    confirmed_external: Mutex<HashSet<String>>,
}

impl MockMultisig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, failure: Failure) {
        self.failures.lock().push_back(failure);
    }

    /// Mark a signature as confirmed: an externally produced one such as the
    /// executed transfer, or one injected with [`Failure::NeverConfirm`]
    /// that lands late.
    pub fn confirm_external(&self, signature: &str) {
        self.confirmed_external.lock().insert(signature.to_string());
    }

    pub fn transfers(&self) -> Vec<TransferMessage> {
        self.transfers.lock().clone()
    }

    pub fn confirm_calls(&self) -> usize {
        self.confirm_calls.load(Ordering::SeqCst)
    }

    fn take_failure(&self, kind: Failure) -> bool {
        let mut failures = self.failures.lock();
        if failures.front() == Some(&kind) {
            failures.pop_front();
            true
        } else {
            false
        }
    }

    fn signature(&self, prefix: &str) -> String {
        let n = self.sig_counter.fetch_add(1, Ordering::SeqCst);
        let sig = format!("{prefix}{n:0>40}");
        if self.take_failure(Failure::NeverConfirm) {
            self.unconfirmable.lock().insert(sig.clone());
        }
        sig
    }
}

impl MultisigClient for MockMultisig {
    fn vault_address(&self, multisig: &str, vault_index: u8) -> Result<String> {
        Ok(format!("{multisig}Vault{vault_index}"))
    }

    async fn next_transaction_index(&self, _multisig: &str) -> Result<u64> {
        Ok(self.next_index.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn create_vault_transaction(
        &self,
        _multisig: &str,
        _vault_index: u8,
        _transaction_index: u64,
        message: &TransferMessage,
    ) -> Result<String> {
        if self.take_failure(Failure::CreateTransaction) {
            return Err(KolmarketError::Escrow {
                reason: "vault transaction create rejected".into(),
            });
        }
        self.transfers.lock().push(message.clone());
        Ok(self.signature("VaultTx"))
    }

    async fn create_proposal(&self, _multisig: &str, _transaction_index: u64) -> Result<String> {
        if self.take_failure(Failure::CreateProposal) {
            return Err(KolmarketError::Escrow {
                reason: "proposal create rejected".into(),
            });
        }
        Ok(self.signature("Proposal"))
    }

    async fn confirm(&self, signature: &str) -> Result<bool> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        if self.confirmed_external.lock().contains(signature) {
            return Ok(true);
        }
        if self.unconfirmable.lock().contains(signature) {
            return Ok(false);
        }
        Ok(signature.starts_with("VaultTx") || signature.starts_with("Proposal"))
    }
}
