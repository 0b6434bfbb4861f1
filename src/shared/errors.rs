//! Error handling for the application

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::TransactionError;
use thiserror::Error;

use crate::shared::types::ExecutionStage;

/// Policy rejections raised by the safety guard. Deterministic for a given input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("amount must be a positive number of base units")]
    ZeroAmount,

    #[error("input and output asset are the same mint: {0}")]
    SameAsset(Pubkey),

    #[error("amount {amount} exceeds max notional {limit}")]
    NotionalExceeded { amount: u64, limit: u64 },

    #[error("slippage tolerance {requested} bps exceeds limit of {limit} bps")]
    SlippageExceeded { requested: u16, limit: u16 },

    #[error("insufficient balance: have {balance} base units, need {required}")]
    InsufficientBalance { balance: u64, required: u64 },

    #[error("wallet holds none of {0}")]
    EmptyBalance(Pubkey),
}

/// Ways a quote request can fail
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuoteFailure {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("service error: {0}")]
    Service(String),

    #[error("malformed quote: {0}")]
    Malformed(String),

    #[error("quote {field} {actual} does not match intent {expected}")]
    AssetMismatch {
        field: &'static str,
        expected: Pubkey,
        actual: Pubkey,
    },
}

impl QuoteFailure {
    /// Transport and service failures may clear up on a fresh request;
    /// a malformed or mismatched quote will not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QuoteFailure::Transport(_) | QuoteFailure::Service(_))
    }
}

/// Failure to turn a quote into a transaction. Treated as a stale quote.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct BuildError {
    pub message: String,
}

impl BuildError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Signer errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignError {
    #[error("transaction payload could not be decoded: {0}")]
    MalformedPayload(String),

    #[error("payload expects fee payer {expected}, signer holds {actual}")]
    SignerMismatch { expected: Pubkey, actual: Pubkey },

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Ledger RPC errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("rpc request failed: {0}")]
    Rpc(String),

    #[error("unexpected rpc response: {0}")]
    UnexpectedResponse(String),
}

/// Pipeline error taxonomy. Every variant knows the stage it belongs to.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("intent rejected: {0}")]
    IntentRejected(Rejection),

    #[error("quote failed: {0}")]
    Quote(QuoteFailure),

    #[error("price impact {actual_pct}% exceeds limit of {limit_pct}%")]
    PriceImpactExceeded { actual_pct: f64, limit_pct: f64 },

    #[error("pre-trade check failed: {0}")]
    PreTradeRejected(Rejection),

    #[error("ledger unavailable during {stage}: {source}")]
    Ledger {
        stage: ExecutionStage,
        source: LedgerError,
    },

    #[error("transaction build failed: {0}")]
    Build(BuildError),

    #[error("signing failed: {0}")]
    Sign(SignError),

    #[error("simulation rejected transaction: {0}")]
    SimulationRejected(String),

    #[error("broadcast failed after {attempts} attempt(s): {message}")]
    Broadcast { message: String, attempts: u32 },

    #[error("transaction {signature} not confirmed before block height {last_valid_block_height}")]
    ConfirmationTimeout {
        signature: Signature,
        last_valid_block_height: u64,
    },

    #[error("transaction {signature} failed on-chain: {error}")]
    OnchainFailure {
        signature: Signature,
        error: TransactionError,
    },

    #[error("cancelled during {stage} before anything was broadcast")]
    Cancelled { stage: ExecutionStage },
}

impl PipelineError {
    pub fn stage(&self) -> ExecutionStage {
        match self {
            PipelineError::IntentRejected(_) => ExecutionStage::Intake,
            PipelineError::Quote(_) => ExecutionStage::Quoting,
            PipelineError::PriceImpactExceeded { .. } | PipelineError::PreTradeRejected(_) => {
                ExecutionStage::Validating
            }
            PipelineError::Ledger { stage, .. } | PipelineError::Cancelled { stage } => *stage,
            PipelineError::Build(_) => ExecutionStage::Building,
            PipelineError::Sign(_) => ExecutionStage::Signing,
            PipelineError::SimulationRejected(_) => ExecutionStage::Simulating,
            PipelineError::Broadcast { .. } => ExecutionStage::Broadcasting,
            PipelineError::ConfirmationTimeout { .. } | PipelineError::OnchainFailure { .. } => {
                ExecutionStage::Confirming
            }
        }
    }

    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::IntentRejected(_) => "intent_rejected",
            PipelineError::Quote(_) => "quote_error",
            PipelineError::PriceImpactExceeded { .. } => "price_impact_exceeded",
            PipelineError::PreTradeRejected(_) => "pre_trade_rejected",
            PipelineError::Ledger { .. } => "ledger_error",
            PipelineError::Build(_) => "build_error",
            PipelineError::Sign(_) => "sign_error",
            PipelineError::SimulationRejected(_) => "simulation_rejected",
            PipelineError::Broadcast { .. } => "broadcast_error",
            PipelineError::ConfirmationTimeout { .. } => "confirmation_timeout",
            PipelineError::OnchainFailure { .. } => "onchain_failure",
            PipelineError::Cancelled { .. } => "cancelled",
        }
    }

    /// Policy verdicts as opposed to infrastructure faults.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            PipelineError::IntentRejected(_)
                | PipelineError::PriceImpactExceeded { .. }
                | PipelineError::PreTradeRejected(_)
                | PipelineError::SimulationRejected(_)
        )
    }

    /// Whether the orchestrator may restart from Quoting after this error.
    /// Only ever true for errors raised before anything was broadcast.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Quote(failure) => failure.is_retryable(),
            PipelineError::PriceImpactExceeded { .. }
            | PipelineError::Build(_)
            | PipelineError::SimulationRejected(_) => true,
            PipelineError::Sign(SignError::MalformedPayload(_)) => true,
            PipelineError::Ledger { stage, .. } => stage.is_idempotent(),
            _ => false,
        }
    }

    /// Corrupted key material. Never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Sign(SignError::SignerMismatch { .. } | SignError::Signing(_))
        )
    }
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Wallet error: {0}")]
    WalletError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Routing service error: {0}")]
    RoutingError(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
