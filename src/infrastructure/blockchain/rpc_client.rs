//! Solana RPC client: broadcasting and ledger reads

use async_trait::async_trait;
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig};
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::{TransactionConfirmationStatus, TransactionStatus, UiTransactionEncoding};
use spl_associated_token_account::get_associated_token_address_with_program_id;
use std::time::Duration;
use tracing::debug;

use crate::domain::execution::{
    BroadcastOptions, Broadcaster, LedgerReader, SimulationOutcome,
};
use crate::shared::errors::LedgerError;
use crate::shared::types::{ConfirmationLevel, LedgerStatus, SignedTransaction};

/// Solana RPC client wrapper
pub struct SolanaRpcClient {
    client: RpcClient,
    commitment: ConfirmationLevel,
}

impl SolanaRpcClient {
    /// Create new RPC client
    pub fn new(rpc_url: String, commitment: ConfirmationLevel) -> Self {
        Self {
            client: RpcClient::new_with_commitment(rpc_url, commitment_config(commitment)),
            commitment,
        }
    }

    /// Create new RPC client with a request timeout
    pub fn with_timeout(rpc_url: String, commitment: ConfirmationLevel, timeout: Duration) -> Self {
        Self {
            client: RpcClient::new_with_timeout_and_commitment(
                rpc_url,
                timeout,
                commitment_config(commitment),
            ),
            commitment,
        }
    }

    pub fn url(&self) -> String {
        self.client.url()
    }
}

#[async_trait]
impl Broadcaster for SolanaRpcClient {
    async fn submit(
        &self,
        transaction: &SignedTransaction,
        options: &BroadcastOptions,
    ) -> Result<Signature, LedgerError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: options.skip_preflight,
            preflight_commitment: Some(commitment_level(options.preflight_commitment)),
            encoding: Some(UiTransactionEncoding::Base64),
            max_retries: options.max_retries,
            ..RpcSendTransactionConfig::default()
        };
        self.client
            .send_transaction_with_config(transaction.transaction(), config)
            .await
            .map_err(rpc_error)
    }

    async fn simulate(&self, transaction: &SignedTransaction) -> Result<SimulationOutcome, LedgerError> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: true,
            commitment: Some(commitment_config(self.commitment)),
            encoding: Some(UiTransactionEncoding::Base64),
            ..RpcSimulateTransactionConfig::default()
        };
        let response = self
            .client
            .simulate_transaction_with_config(transaction.transaction(), config)
            .await
            .map_err(rpc_error)?;

        let result = response.value;
        debug!(
            "Simulation in slot {}: err={:?}, units={:?}",
            response.context.slot, result.err, result.units_consumed
        );
        Ok(SimulationOutcome {
            err: result.err.map(|e| e.to_string()),
            units_consumed: result.units_consumed,
            logs: result.logs.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl LedgerReader for SolanaRpcClient {
    async fn signature_status(
        &self,
        signature: &Signature,
        search_history: bool,
    ) -> Result<Option<LedgerStatus>, LedgerError> {
        let signatures = [*signature];
        let response = if search_history {
            self.client
                .get_signature_statuses_with_history(&signatures)
                .await
        } else {
            self.client.get_signature_statuses(&signatures).await
        }
        .map_err(rpc_error)?;

        let status = response.value.into_iter().next().ok_or_else(|| {
            LedgerError::UnexpectedResponse("empty getSignatureStatuses result".to_string())
        })?;
        Ok(status.map(ledger_status))
    }

    async fn block_height(&self) -> Result<u64, LedgerError> {
        self.client.get_block_height().await.map_err(rpc_error)
    }

    async fn latest_valid_block_height(&self) -> Result<u64, LedgerError> {
        let (_, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(commitment_config(self.commitment))
            .await
            .map_err(rpc_error)?;
        Ok(last_valid_block_height)
    }

    async fn balance(&self, owner: &Pubkey) -> Result<u64, LedgerError> {
        self.client.get_balance(owner).await.map_err(rpc_error)
    }

    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<u64, LedgerError> {
        let commitment = commitment_config(self.commitment);
        // The mint's owner is the token program the associated account lives under.
        let Some(mint_account) = self
            .client
            .get_account_with_commitment(mint, commitment)
            .await
            .map_err(rpc_error)?
            .value
        else {
            debug!("Mint {} not found", mint);
            return Ok(0);
        };

        let token_account =
            get_associated_token_address_with_program_id(owner, mint, &mint_account.owner);
        let exists = self
            .client
            .get_account_with_commitment(&token_account, commitment)
            .await
            .map_err(rpc_error)?
            .value
            .is_some();
        if !exists {
            debug!("No token account {} for {}", token_account, mint);
            return Ok(0);
        }

        let amount = self
            .client
            .get_token_account_balance_with_commitment(&token_account, commitment)
            .await
            .map_err(rpc_error)?
            .value;
        parse_token_amount(&amount.amount)
    }
}

fn parse_token_amount(amount: &str) -> Result<u64, LedgerError> {
    amount.parse().map_err(|_| {
        LedgerError::UnexpectedResponse(format!("token amount {:?} is not an integer", amount))
    })
}

fn rpc_error(e: ClientError) -> LedgerError {
    LedgerError::Rpc(e.to_string())
}

pub fn commitment_level(level: ConfirmationLevel) -> CommitmentLevel {
    match level {
        ConfirmationLevel::Processed => CommitmentLevel::Processed,
        ConfirmationLevel::Confirmed => CommitmentLevel::Confirmed,
        ConfirmationLevel::Finalized => CommitmentLevel::Finalized,
    }
}

pub fn commitment_config(level: ConfirmationLevel) -> CommitmentConfig {
    CommitmentConfig {
        commitment: commitment_level(level),
    }
}

/// Nodes omit `confirmationStatus` for rooted signatures found in history.
fn ledger_status(status: TransactionStatus) -> LedgerStatus {
    let confirmation = match status.confirmation_status {
        Some(TransactionConfirmationStatus::Processed) => ConfirmationLevel::Processed,
        Some(TransactionConfirmationStatus::Confirmed) => ConfirmationLevel::Confirmed,
        Some(TransactionConfirmationStatus::Finalized) | None => ConfirmationLevel::Finalized,
    };
    LedgerStatus {
        slot: status.slot,
        confirmation,
        err: status.err,
    }
}
