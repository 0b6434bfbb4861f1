//! Common types used across the application

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::{TransactionError, VersionedTransaction};
use std::fmt;

use crate::shared::errors::PipelineError;

/// Caller's declared intent: swap `amount` base units of `input_mint` into `output_mint`.
///
/// Amounts are always in the smallest indivisible unit of the input asset;
/// display units are converted before an intent is constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapIntent {
    input_mint: Pubkey,
    output_mint: Pubkey,
    amount: u64,
    max_slippage_bps: u16,
    max_price_impact_pct: f64,
}

impl SwapIntent {
    pub fn new(
        input_mint: Pubkey,
        output_mint: Pubkey,
        amount: u64,
        max_slippage_bps: u16,
        max_price_impact_pct: f64,
    ) -> Self {
        Self {
            input_mint,
            output_mint,
            amount,
            max_slippage_bps,
            max_price_impact_pct,
        }
    }

    pub fn input_mint(&self) -> &Pubkey {
        &self.input_mint
    }

    pub fn output_mint(&self) -> &Pubkey {
        &self.output_mint
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn max_slippage_bps(&self) -> u16 {
        self.max_slippage_bps
    }

    pub fn max_price_impact_pct(&self) -> f64 {
        self.max_price_impact_pct
    }
}

/// One hop of a quoted route, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub venue: String,
    pub in_amount: u64,
    pub out_amount: u64,
    pub input_decimals: Option<u8>,
    pub output_decimals: Option<u8>,
}

/// A priced route issued by the routing service.
///
/// `raw` is the service's own document and is handed back verbatim at build time.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub request_id: String,
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub in_amount: u64,
    pub out_amount: u64,
    pub min_out_amount: u64,
    /// Percentage, e.g. `0.4` means 0.4%
    pub price_impact_pct: f64,
    pub route: Vec<RouteLeg>,
    pub expiry_hint: Option<u64>,
    pub raw: serde_json::Value,
}

impl Quote {
    pub fn route_summary(&self) -> String {
        if self.route.is_empty() {
            return "direct".to_string();
        }
        self.route
            .iter()
            .map(|leg| leg.venue.as_str())
            .collect::<Vec<_>>()
            .join(" → ")
    }

    pub fn output_decimals(&self) -> Option<u8> {
        self.route.last().and_then(|leg| leg.output_decimals)
    }
}

/// Serialized transaction returned by the routing service, not yet signed.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedTransaction {
    pub payload: Vec<u8>,
    pub compute_unit_limit: Option<u32>,
    pub last_valid_block_height: Option<u64>,
    pub prioritization_fee_lamports: Option<u64>,
}

/// A transaction carrying the execution identity's signature.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedTransaction {
    transaction: VersionedTransaction,
    signature: Signature,
}

impl SignedTransaction {
    /// Wraps a signed transaction. Returns `None` when it carries no signature.
    pub fn new(transaction: VersionedTransaction) -> Option<Self> {
        let signature = *transaction.signatures.first()?;
        if signature == Signature::default() {
            return None;
        }
        Some(Self {
            transaction,
            signature,
        })
    }

    pub fn transaction(&self) -> &VersionedTransaction {
        &self.transaction
    }

    /// Fee payer signature; doubles as the ledger's transaction id.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStage {
    Intake,
    Quoting,
    Validating,
    Building,
    Signing,
    Simulating,
    Broadcasting,
    Confirming,
}

impl ExecutionStage {
    /// Stages before anything leaves the process as a signed transaction.
    pub fn is_idempotent(&self) -> bool {
        *self < ExecutionStage::Broadcasting
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStage::Intake => "intake",
            ExecutionStage::Quoting => "quoting",
            ExecutionStage::Validating => "validating",
            ExecutionStage::Building => "building",
            ExecutionStage::Signing => "signing",
            ExecutionStage::Simulating => "simulating",
            ExecutionStage::Broadcasting => "broadcasting",
            ExecutionStage::Confirming => "confirming",
        }
    }
}

impl fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger commitment levels, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationLevel {
    Processed,
    Confirmed,
    Finalized,
}

impl Default for ConfirmationLevel {
    fn default() -> Self {
        ConfirmationLevel::Confirmed
    }
}

impl fmt::Display for ConfirmationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfirmationLevel::Processed => "processed",
            ConfirmationLevel::Confirmed => "confirmed",
            ConfirmationLevel::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

/// Status of a signature as reported by the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerStatus {
    pub slot: u64,
    pub confirmation: ConfirmationLevel,
    pub err: Option<TransactionError>,
}

impl LedgerStatus {
    pub fn satisfies(&self, level: ConfirmationLevel) -> bool {
        self.confirmation >= level
    }
}

/// Why confirmation waiting stopped without a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutCause {
    /// Ledger height passed the validity window; the transaction can no longer land.
    BlockhashExpired,
    /// Caller's timeout elapsed while the transaction could still land.
    DeadlineElapsed,
    /// Local waiting was cancelled; the transaction could still land.
    Cancelled,
}

impl TimeoutCause {
    pub fn may_still_land(&self) -> bool {
        !matches!(self, TimeoutCause::BlockhashExpired)
    }
}

/// Terminal status of one execution
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionStatus {
    Confirmed {
        slot: u64,
    },
    Rejected(PipelineError),
    Failed(PipelineError),
    TimedOut {
        cause: TimeoutCause,
        last_valid_block_height: u64,
        observed_block_height: Option<u64>,
    },
}

impl ExecutionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionStatus::Confirmed { .. } => "confirmed",
            ExecutionStatus::Rejected(_) => "rejected",
            ExecutionStatus::Failed(_) => "failed",
            ExecutionStatus::TimedOut { .. } => "timed_out",
        }
    }
}

/// The only artifact an execution hands back to its caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub signature: Option<Signature>,
    pub status: ExecutionStatus,
    /// Last stage entered before the terminal state.
    pub stage: ExecutionStage,
    pub input_amount: u64,
    /// Estimate from the accepted quote, not the executed amount.
    pub output_amount: u64,
    pub min_output_amount: u64,
    pub price_impact_pct: Option<f64>,
    pub quote_attempts: u32,
}

impl ExecutionResult {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.status, ExecutionStatus::Confirmed { .. })
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_confirmed() {
            0
        } else {
            1
        }
    }

    /// The terminal status expressed in the error taxonomy, if not confirmed.
    pub fn error(&self) -> Option<PipelineError> {
        match &self.status {
            ExecutionStatus::Confirmed { .. } => None,
            ExecutionStatus::Rejected(err) | ExecutionStatus::Failed(err) => Some(err.clone()),
            ExecutionStatus::TimedOut {
                last_valid_block_height,
                ..
            } => self
                .signature
                .map(|signature| PipelineError::ConfirmationTimeout {
                    signature,
                    last_valid_block_height: *last_valid_block_height,
                }),
        }
    }
}
