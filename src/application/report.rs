//! Swap and status reports: JSON for machines, a short summary for humans

use chrono::{DateTime, Utc};
use serde::Serialize;
use solana_sdk::signature::Signature;
use std::fmt::Write as _;

use crate::domain::execution::QuotePreview;
use crate::shared::errors::PipelineError;
use crate::shared::types::{
    ConfirmationLevel, ExecutionResult, ExecutionStage, ExecutionStatus, LedgerStatus,
    TimeoutCause,
};
use crate::shared::utils::{format_amount, AssetRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    DryRun,
    Execute,
}

#[derive(Debug, Serialize)]
pub struct AssetAmount {
    pub mint: String,
    pub symbol: Option<String>,
    pub amount: u64,
    /// Display amount, when the asset's decimals are known
    pub amount_ui: Option<String>,
}

impl AssetAmount {
    fn new(asset: &AssetRef, amount: u64, decimals: Option<u8>) -> Self {
        Self {
            mint: asset.mint.to_string(),
            symbol: asset.symbol.map(str::to_string),
            amount,
            amount_ui: decimals.or(asset.decimals).map(|d| format_amount(amount, d)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub kind: &'static str,
    pub stage: ExecutionStage,
    pub message: String,
    pub retryable: bool,
    /// Ledger's own error object for on-chain failures
    pub onchain_error: Option<serde_json::Value>,
}

impl From<&PipelineError> for ErrorDetails {
    fn from(err: &PipelineError) -> Self {
        let onchain_error = match err {
            PipelineError::OnchainFailure { error, .. } => serde_json::to_value(error).ok(),
            _ => None,
        };
        Self {
            kind: err.kind(),
            stage: err.stage(),
            message: err.to_string(),
            retryable: err.is_retryable(),
            onchain_error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TimeoutDetails {
    pub cause: TimeoutCause,
    pub last_valid_block_height: u64,
    pub observed_block_height: Option<u64>,
    pub may_still_land: bool,
}

#[derive(Debug, Serialize)]
pub struct SwapReport {
    pub mode: RunMode,
    pub status: String,
    pub success: bool,
    pub stage: ExecutionStage,
    pub signature: Option<String>,
    pub slot: Option<u64>,
    pub input: AssetAmount,
    /// Quote estimate, not the executed amount
    pub output: AssetAmount,
    pub min_output_amount: u64,
    pub price_impact_pct: Option<f64>,
    pub route: Option<String>,
    pub request_id: Option<String>,
    pub quote_attempts: u32,
    pub error: Option<ErrorDetails>,
    pub timeout: Option<TimeoutDetails>,
    pub explorer_url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SwapReport {
    /// Report for a quote-only run
    pub fn from_preview(preview: &QuotePreview, input: &AssetRef, output: &AssetRef) -> Self {
        let quote = &preview.quote;
        let (status, stage, error) = match &preview.verdict {
            Ok(()) => ("accepted".to_string(), ExecutionStage::Validating, None),
            Err(err) => (
                status_label(err).to_string(),
                err.stage(),
                Some(ErrorDetails::from(err)),
            ),
        };
        Self {
            mode: RunMode::DryRun,
            success: error.is_none(),
            status,
            stage,
            signature: None,
            slot: None,
            input: AssetAmount::new(input, quote.in_amount, None),
            output: AssetAmount::new(output, quote.out_amount, quote.output_decimals()),
            min_output_amount: quote.min_out_amount,
            price_impact_pct: Some(quote.price_impact_pct),
            route: Some(quote.route_summary()),
            request_id: Some(quote.request_id.clone()),
            quote_attempts: preview.attempts,
            error,
            timeout: None,
            explorer_url: None,
            timestamp: Utc::now(),
        }
    }

    /// Report for a dry run that failed before any quote was accepted
    pub fn from_error(err: &PipelineError, input: &AssetRef, output: &AssetRef, amount: u64) -> Self {
        Self {
            mode: RunMode::DryRun,
            status: status_label(err).to_string(),
            success: false,
            stage: err.stage(),
            signature: None,
            slot: None,
            input: AssetAmount::new(input, amount, None),
            output: AssetAmount::new(output, 0, None),
            min_output_amount: 0,
            price_impact_pct: None,
            route: None,
            request_id: None,
            quote_attempts: 0,
            error: Some(ErrorDetails::from(err)),
            timeout: None,
            explorer_url: None,
            timestamp: Utc::now(),
        }
    }

    /// Report for a live execution
    pub fn from_execution(
        result: &ExecutionResult,
        input: &AssetRef,
        output: &AssetRef,
        output_decimals: Option<u8>,
    ) -> Self {
        let (slot, timeout) = match &result.status {
            ExecutionStatus::Confirmed { slot } => (Some(*slot), None),
            ExecutionStatus::TimedOut {
                cause,
                last_valid_block_height,
                observed_block_height,
            } => (
                None,
                Some(TimeoutDetails {
                    cause: *cause,
                    last_valid_block_height: *last_valid_block_height,
                    observed_block_height: *observed_block_height,
                    may_still_land: cause.may_still_land(),
                }),
            ),
            _ => (None, None),
        };
        Self {
            mode: RunMode::Execute,
            status: result.status.label().to_string(),
            success: result.is_confirmed(),
            stage: result.stage,
            signature: result.signature.map(|s| s.to_string()),
            slot,
            input: AssetAmount::new(input, result.input_amount, None),
            output: AssetAmount::new(output, result.output_amount, output_decimals),
            min_output_amount: result.min_output_amount,
            price_impact_pct: result.price_impact_pct,
            route: None,
            request_id: None,
            quote_attempts: result.quote_attempts,
            error: result.error().as_ref().map(ErrorDetails::from),
            timeout,
            // Only broadcast transactions can show up on an explorer.
            explorer_url: result
                .signature
                .as_ref()
                .filter(|_| result.stage >= ExecutionStage::Broadcasting)
                .map(explorer_url),
            timestamp: Utc::now(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable summary
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let mode = match self.mode {
            RunMode::DryRun => "🟡 DRY RUN",
            RunMode::Execute => "🔴 LIVE EXECUTION",
        };
        let _ = writeln!(out, "\n=== Swap ({}) ===", mode);
        let _ = writeln!(
            out,
            "Input:        {}",
            describe(&self.input)
        );
        let _ = writeln!(out, "Output (est): {}", describe(&self.output));
        if self.min_output_amount > 0 {
            let _ = writeln!(out, "Min output:   {} (raw)", self.min_output_amount);
        }
        if let Some(impact) = self.price_impact_pct {
            let _ = writeln!(out, "Price impact: {:.4}%", impact);
        }
        if let Some(route) = &self.route {
            let _ = writeln!(out, "Route:        {}", route);
        }
        if self.quote_attempts > 1 {
            let _ = writeln!(out, "Quotes:       {} attempts", self.quote_attempts);
        }
        if let Some(signature) = &self.signature {
            let _ = writeln!(out, "Signature:    {}", signature);
        }
        if let Some(url) = &self.explorer_url {
            let _ = writeln!(out, "Explorer:     {}", url);
        }

        match (&self.error, &self.timeout) {
            (_, Some(timeout)) => {
                let _ = writeln!(
                    out,
                    "\n⌛ Not confirmed ({:?}); {}",
                    timeout.cause,
                    if timeout.may_still_land {
                        "it may still land, check with `swapline status <SIGNATURE>`"
                    } else {
                        "blockhash expired, it can no longer land"
                    }
                );
            }
            (Some(error), None) => {
                let _ = writeln!(out, "\n❌ {} at {}: {}", self.status.to_uppercase(), error.stage, error.message);
            }
            (None, None) => match (self.mode, self.slot) {
                (RunMode::DryRun, _) => {
                    let _ = writeln!(out, "\n🟡 DRY RUN COMPLETE - add --execute to swap");
                }
                (RunMode::Execute, Some(slot)) => {
                    let _ = writeln!(out, "\n✅ Confirmed in slot {}", slot);
                }
                (RunMode::Execute, None) => {
                    let _ = writeln!(out, "\n✅ {}", self.status);
                }
            },
        }
        out
    }
}

/// Ledger status of a single signature
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub signature: String,
    pub found: bool,
    pub slot: Option<u64>,
    pub confirmation: Option<ConfirmationLevel>,
    pub onchain_error: Option<serde_json::Value>,
    pub explorer_url: String,
    pub timestamp: DateTime<Utc>,
}

impl StatusReport {
    pub fn new(signature: &Signature, status: Option<&LedgerStatus>) -> Self {
        Self {
            signature: signature.to_string(),
            found: status.is_some(),
            slot: status.map(|s| s.slot),
            confirmation: status.map(|s| s.confirmation),
            onchain_error: status
                .and_then(|s| s.err.as_ref())
                .and_then(|err| serde_json::to_value(err).ok()),
            explorer_url: explorer_url(signature),
            timestamp: Utc::now(),
        }
    }

    /// Landed without error
    pub fn exit_code(&self) -> i32 {
        if self.found && self.onchain_error.is_none() {
            0
        } else {
            1
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn summary(&self) -> String {
        match (self.slot, self.confirmation, &self.onchain_error) {
            (Some(slot), Some(level), None) => {
                format!("✅ {} landed in slot {} ({})", self.signature, slot, level)
            }
            (Some(slot), _, Some(err)) => {
                format!("❌ {} failed in slot {}: {}", self.signature, slot, err)
            }
            _ => format!("❔ {} not found on the ledger", self.signature),
        }
    }
}

fn status_label(err: &PipelineError) -> &'static str {
    if err.is_rejection() {
        "rejected"
    } else {
        "failed"
    }
}

fn describe(asset: &AssetAmount) -> String {
    let label = asset.symbol.clone().unwrap_or_else(|| asset.mint.clone());
    match &asset.amount_ui {
        Some(ui) => format!("{} {} ({} raw)", ui, label, asset.amount),
        None => format!("{} {} (raw)", asset.amount, label),
    }
}

pub fn explorer_url(signature: &Signature) -> String {
    format!("https://solscan.io/tx/{}", signature)
}
