//! Application services: wiring config into the pipeline components

use solana_sdk::signature::Signature;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::report::{StatusReport, SwapReport};
use crate::domain::execution::{
    preview_quote, ExecutionSettings, LedgerReader, SwapOrchestrator, TransactionSigner,
};
use crate::domain::safety::SafetyGuard;
use crate::infrastructure::blockchain::{KeypairSigner, SolanaRpcClient};
use crate::infrastructure::routing::HttpRoutingClient;
use crate::shared::config::Config;
use crate::shared::errors::{AppError, PipelineError};
use crate::shared::types::{ExecutionStage, SwapIntent};
use crate::shared::utils::{
    is_native_sol, parse_base_units, resolve_asset, ui_to_base_units, AssetRef,
};

/// A swap as typed on the command line
#[derive(Debug, Clone)]
pub struct SwapRequest {
    pub input: String,
    pub output: String,
    pub amount: String,
    pub slippage_bps: Option<u16>,
    /// `amount` is already in base units
    pub raw: bool,
    pub input_decimals: Option<u8>,
}

/// Request resolved against the token table and config
#[derive(Debug, Clone)]
pub struct ResolvedSwap {
    pub input: AssetRef,
    pub output: AssetRef,
    pub intent: SwapIntent,
}

impl SwapRequest {
    /// `all` spends the wallet's whole balance of the input asset.
    pub fn sells_all(&self) -> bool {
        self.amount.trim().eq_ignore_ascii_case("all")
    }

    pub fn resolve(&self, config: &Config) -> Result<ResolvedSwap, AppError> {
        if self.sells_all() {
            return Err(AppError::InvalidArgument(
                "AMOUNT `all` reads the wallet balance and needs --execute".to_string(),
            ));
        }
        let input = resolve_asset(&self.input)?;
        let amount = if self.raw {
            parse_base_units(&self.amount)?
        } else {
            let decimals = self.input_decimals.or(input.decimals).ok_or_else(|| {
                AppError::InvalidArgument(format!(
                    "Decimals of {} are unknown; pass --input-decimals or --raw",
                    input.label()
                ))
            })?;
            ui_to_base_units(&self.amount, decimals)?
        };
        self.resolve_with_amount(config, amount)
    }

    /// Resolve with an amount already in base units.
    pub fn resolve_with_amount(&self, config: &Config, amount: u64) -> Result<ResolvedSwap, AppError> {
        let input = resolve_asset(&self.input)?;
        let output = resolve_asset(&self.output)?;
        let slippage_bps = self.slippage_bps.unwrap_or(config.trade.default_slippage_bps);
        let intent = SwapIntent::new(
            input.mint,
            output.mint,
            amount,
            slippage_bps,
            config.limits.max_price_impact_pct,
        );
        Ok(ResolvedSwap {
            input,
            output,
            intent,
        })
    }
}

/// Swap use cases
pub struct SwapService {
    config: Config,
}

impl SwapService {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn guard(&self) -> SafetyGuard {
        SafetyGuard::new(self.config.limits.clone())
    }

    fn rpc_client(&self) -> SolanaRpcClient {
        SolanaRpcClient::with_timeout(
            self.config.rpc.url.clone(),
            self.config.rpc.commitment,
            Duration::from_secs(30),
        )
    }

    /// Turn a request into a swap. `all` is read from the wallet, so it is
    /// only accepted when executing.
    pub async fn resolve(&self, request: &SwapRequest, execute: bool) -> Result<ResolvedSwap, AppError> {
        if !request.sells_all() || !execute {
            return request.resolve(&self.config);
        }
        let input = resolve_asset(&request.input)?;
        let owner = KeypairSigner::from_file(&self.config.wallet.keypair)?.public_key();
        let rpc = self.rpc_client();
        let held = if is_native_sol(&input.mint) {
            rpc.balance(&owner).await
        } else {
            rpc.token_balance(&owner, &input.mint).await
        }
        .map_err(|source| PipelineError::Ledger {
            stage: ExecutionStage::Intake,
            source,
        })?;

        let amount = self.guard().spendable(&input.mint, held);
        if amount == 0 {
            return Err(AppError::InvalidArgument(format!(
                "Wallet {} holds no spendable {}",
                owner,
                input.label()
            )));
        }
        info!("💰 Selling entire balance: {} base units of {}", amount, input.label());
        request.resolve_with_amount(&self.config, amount)
    }

    /// Intake, Quoting and Validating. Never loads the keypair.
    pub async fn dry_run(&self, swap: &ResolvedSwap) -> Result<SwapReport, AppError> {
        info!("🟡 Dry run: {} -> {}", swap.input.label(), swap.output.label());
        let routing = HttpRoutingClient::from_config(&self.config.routing)?;
        let policy = ExecutionSettings::from_config(&self.config).requote;

        let report = match preview_quote(&routing, &self.guard(), &swap.intent, &policy).await {
            Ok(preview) => SwapReport::from_preview(&preview, &swap.input, &swap.output),
            Err(err) => SwapReport::from_error(&err, &swap.input, &swap.output, swap.intent.amount()),
        };
        Ok(report)
    }

    /// Full pipeline against the ledger
    pub async fn execute(
        &self,
        swap: &ResolvedSwap,
        cancel: &CancellationToken,
    ) -> Result<SwapReport, AppError> {
        info!("🔴 Live execution: {} -> {}", swap.input.label(), swap.output.label());
        let signer = KeypairSigner::from_file(&self.config.wallet.keypair)?;
        let routing = Arc::new(HttpRoutingClient::from_config(&self.config.routing)?);
        let rpc = Arc::new(self.rpc_client());
        info!("🔗 RPC: {}", rpc.url());

        let orchestrator = SwapOrchestrator::new(
            routing.clone(),
            routing,
            Arc::new(signer),
            rpc.clone(),
            rpc,
            self.guard(),
            ExecutionSettings::from_config(&self.config),
        );
        let result = orchestrator.execute(&swap.intent, cancel).await;

        Ok(SwapReport::from_execution(
            &result,
            &swap.input,
            &swap.output,
            swap.output.decimals,
        ))
    }

    /// Follow-up lookup of a signature, e.g. after a timed-out execution
    pub async fn status(&self, signature: &str) -> Result<StatusReport, AppError> {
        let signature = Signature::from_str(signature.trim())
            .map_err(|e| AppError::InvalidArgument(format!("Invalid signature {:?}: {}", signature, e)))?;
        let rpc = self.rpc_client();
        let status = rpc
            .signature_status(&signature, true)
            .await
            .map_err(|source| PipelineError::Ledger {
                stage: ExecutionStage::Confirming,
                source,
            })?;
        Ok(StatusReport::new(&signature, status.as_ref()))
    }
}
