//! Execution domain - component seams and the swap pipeline

mod confirmation;
mod orchestrator;
mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use confirmation::{ConfirmationOutcome, ConfirmationTracker};
pub use orchestrator::{preview_quote, ExecutionSettings, QuotePreview, SwapOrchestrator};
pub use retry::{retry_async, Backoff, RetryExhausted, RetryPolicy};

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;

use crate::shared::errors::{BuildError, LedgerError, QuoteFailure, SignError};
use crate::shared::types::{
    ConfirmationLevel, LedgerStatus, Quote, SignedTransaction, SwapIntent, UnsignedTransaction,
};

/// Source of priced routes
#[async_trait]
pub trait QuoteApiClient: Send + Sync {
    async fn get_quote(&self, intent: &SwapIntent) -> Result<Quote, QuoteFailure>;
}

/// Turns an accepted quote into an unsigned transaction for `signer`
#[async_trait]
pub trait SwapTransactionBuilder: Send + Sync {
    async fn build_transaction(
        &self,
        quote: &Quote,
        signer: &Pubkey,
    ) -> Result<UnsignedTransaction, BuildError>;
}

/// Holder of the execution identity. Key material never leaves the implementor.
pub trait TransactionSigner: Send + Sync {
    fn public_key(&self) -> Pubkey;

    fn sign(&self, transaction: &UnsignedTransaction) -> Result<SignedTransaction, SignError>;
}

/// Per-submission options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BroadcastOptions {
    pub skip_preflight: bool,
    /// Node-side rebroadcast attempts
    pub max_retries: Option<usize>,
    pub preflight_commitment: ConfirmationLevel,
}

impl Default for BroadcastOptions {
    fn default() -> Self {
        Self {
            skip_preflight: true,
            max_retries: Some(0),
            preflight_commitment: ConfirmationLevel::Confirmed,
        }
    }
}

/// Result of a dry simulation against current ledger state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationOutcome {
    pub err: Option<String>,
    pub units_consumed: Option<u64>,
    pub logs: Vec<String>,
}

/// Write side of the ledger
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Submit signed bytes. Resubmitting the same bytes is safe.
    async fn submit(
        &self,
        transaction: &SignedTransaction,
        options: &BroadcastOptions,
    ) -> Result<Signature, LedgerError>;

    async fn simulate(&self, transaction: &SignedTransaction)
        -> Result<SimulationOutcome, LedgerError>;
}

/// Read side of the ledger
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// `Ok(None)` means the ledger has not seen the signature (yet).
    async fn signature_status(
        &self,
        signature: &Signature,
        search_history: bool,
    ) -> Result<Option<LedgerStatus>, LedgerError>;

    async fn block_height(&self) -> Result<u64, LedgerError>;

    /// Validity height of the current latest blockhash.
    async fn latest_valid_block_height(&self) -> Result<u64, LedgerError>;

    /// Lamport balance of `owner`.
    async fn balance(&self, owner: &Pubkey) -> Result<u64, LedgerError>;

    /// Base units of `mint` in the associated token account of `owner`.
    /// Zero when that account does not exist.
    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<u64, LedgerError>;
}
