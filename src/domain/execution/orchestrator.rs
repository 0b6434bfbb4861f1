//! Swap orchestrator: drives one intent through the pipeline stages
//!
//! Everything up to and including simulation is idempotent and may be
//! restarted from a fresh quote. Once signed bytes are broadcast the only
//! retry left is resubmitting those exact bytes.

use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    retry_async, BroadcastOptions, Broadcaster, ConfirmationOutcome, ConfirmationTracker,
    LedgerReader, QuoteApiClient, RetryPolicy, SwapTransactionBuilder, TransactionSigner,
};
use crate::domain::safety::SafetyGuard;
use crate::shared::config::Config;
use crate::shared::errors::{LedgerError, PipelineError};
use crate::shared::types::{
    ConfirmationLevel, ExecutionResult, ExecutionStage, ExecutionStatus, LedgerStatus, Quote,
    SignedTransaction, SwapIntent,
};
use crate::shared::utils::is_native_sol;

/// Retry and confirmation knobs, resolved once from config
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// Restarts from Quoting while still in the idempotent zone
    pub requote: RetryPolicy,
    /// Resubmissions of identical signed bytes
    pub broadcast: RetryPolicy,
    pub broadcast_options: BroadcastOptions,
    pub simulate: bool,
    pub commitment: ConfirmationLevel,
    pub poll_interval: Duration,
    pub confirmation_timeout: Duration,
}

impl ExecutionSettings {
    pub fn from_config(config: &Config) -> Self {
        let exec = &config.execution;
        let initial = Duration::from_millis(exec.backoff_initial_ms);
        let max = Duration::from_millis(exec.backoff_max_ms);
        Self {
            requote: RetryPolicy::exponential(exec.quote_max_attempts, initial, max),
            broadcast: RetryPolicy::exponential(
                exec.broadcast_max_retries.saturating_add(1),
                initial,
                max,
            ),
            broadcast_options: BroadcastOptions {
                skip_preflight: exec.skip_preflight,
                max_retries: Some(0),
                preflight_commitment: config.rpc.commitment,
            },
            simulate: exec.simulate_before_send,
            commitment: config.rpc.commitment,
            poll_interval: exec.poll_interval(),
            confirmation_timeout: exec.confirmation_timeout(),
        }
    }
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Everything the broadcast half needs from a successful preparation
struct Prepared {
    signed: SignedTransaction,
    last_valid_block_height: u64,
}

/// Bookkeeping for one execution; becomes the `ExecutionResult`
struct Run {
    stage: ExecutionStage,
    signature: Option<Signature>,
    input_amount: u64,
    output_amount: u64,
    min_output_amount: u64,
    price_impact_pct: Option<f64>,
    quote_attempts: u32,
}

impl Run {
    fn new(intent: &SwapIntent) -> Self {
        Self {
            stage: ExecutionStage::Intake,
            signature: None,
            input_amount: intent.amount(),
            output_amount: 0,
            min_output_amount: 0,
            price_impact_pct: None,
            quote_attempts: 0,
        }
    }

    fn enter(&mut self, stage: ExecutionStage) {
        // Going backwards is only a restart from Quoting inside the idempotent zone.
        debug_assert!(
            stage >= self.stage || (stage == ExecutionStage::Quoting && self.stage.is_idempotent())
        );
        debug!("Stage {} -> {}", self.stage, stage);
        self.stage = stage;
    }

    fn record_quote(&mut self, quote: &Quote) {
        self.output_amount = quote.out_amount;
        self.min_output_amount = quote.min_out_amount;
        self.price_impact_pct = Some(quote.price_impact_pct);
    }

    fn finish(self, status: ExecutionStatus) -> ExecutionResult {
        ExecutionResult {
            signature: self.signature,
            status,
            stage: self.stage,
            input_amount: self.input_amount,
            output_amount: self.output_amount,
            min_output_amount: self.min_output_amount,
            price_impact_pct: self.price_impact_pct,
            quote_attempts: self.quote_attempts,
        }
    }

    fn fail(self, err: PipelineError) -> ExecutionResult {
        let status = if err.is_rejection() {
            ExecutionStatus::Rejected(err)
        } else {
            ExecutionStatus::Failed(err)
        };
        self.finish(status)
    }
}

/// Owns the pipeline: the only component that sequences stages or retries.
pub struct SwapOrchestrator {
    quotes: Arc<dyn QuoteApiClient>,
    builder: Arc<dyn SwapTransactionBuilder>,
    signer: Arc<dyn TransactionSigner>,
    broadcaster: Arc<dyn Broadcaster>,
    ledger: Arc<dyn LedgerReader>,
    guard: SafetyGuard,
    settings: ExecutionSettings,
}

impl SwapOrchestrator {
    pub fn new(
        quotes: Arc<dyn QuoteApiClient>,
        builder: Arc<dyn SwapTransactionBuilder>,
        signer: Arc<dyn TransactionSigner>,
        broadcaster: Arc<dyn Broadcaster>,
        ledger: Arc<dyn LedgerReader>,
        guard: SafetyGuard,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            quotes,
            builder,
            signer,
            broadcaster,
            ledger,
            guard,
            settings,
        }
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Run one intent to a terminal state. Never panics on pipeline errors;
    /// every outcome is reported through the returned result.
    pub async fn execute(&self, intent: &SwapIntent, cancel: &CancellationToken) -> ExecutionResult {
        let mut run = Run::new(intent);
        info!(
            "🚀 Executing swap of {} {} -> {}",
            intent.amount(),
            intent.input_mint(),
            intent.output_mint()
        );

        if let Err(rejection) = self.guard.validate_intent(intent) {
            warn!("❌ Intent rejected: {}", rejection);
            return run.fail(PipelineError::IntentRejected(rejection));
        }

        let prepared = match self.prepare(intent, &mut run, cancel).await {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!("❌ Swap stopped at {}: {}", run.stage, err);
                return run.fail(err);
            }
        };
        let signature = *prepared.signed.signature();

        run.enter(ExecutionStage::Broadcasting);
        if let Err(err) = self.broadcast(&prepared.signed).await {
            // The bytes may have reached a leader even though every submit errored.
            match self.ledger.signature_status(&signature, true).await {
                Ok(Some(_)) => info!("📡 {} is on the ledger despite submit errors", signature),
                _ => {
                    warn!("❌ Broadcast of {} failed: {}", signature, err);
                    return run.fail(err);
                }
            }
        }

        run.enter(ExecutionStage::Confirming);
        let tracker = ConfirmationTracker::new(
            self.ledger.clone(),
            self.settings.commitment,
            self.settings.poll_interval,
        );
        let outcome = tracker
            .await_confirmation(
                &signature,
                prepared.last_valid_block_height,
                self.settings.confirmation_timeout,
                cancel,
            )
            .await;

        match outcome {
            ConfirmationOutcome::Confirmed { slot } => {
                info!("✅ {} confirmed in slot {}", signature, slot);
                run.finish(ExecutionStatus::Confirmed { slot })
            }
            ConfirmationOutcome::Failed { slot, error } => {
                warn!("❌ {} failed on-chain in slot {}: {}", signature, slot, error);
                run.fail(PipelineError::OnchainFailure { signature, error })
            }
            ConfirmationOutcome::TimedOut {
                cause,
                observed_block_height,
            } => {
                warn!(
                    "⌛ {} unconfirmed ({:?}, may still land: {})",
                    signature,
                    cause,
                    cause.may_still_land()
                );
                run.finish(ExecutionStatus::TimedOut {
                    cause,
                    last_valid_block_height: prepared.last_valid_block_height,
                    observed_block_height,
                })
            }
        }
    }

    /// Look up a signature on the ledger, including history.
    pub async fn check_status(&self, signature: &Signature) -> Result<Option<LedgerStatus>, PipelineError> {
        self.ledger
            .signature_status(signature, true)
            .await
            .map_err(|source| PipelineError::Ledger {
                stage: ExecutionStage::Confirming,
                source,
            })
    }

    /// Quoting through Simulating, restarted from a fresh quote on retryable errors.
    async fn prepare(
        &self,
        intent: &SwapIntent,
        run: &mut Run,
        cancel: &CancellationToken,
    ) -> Result<Prepared, PipelineError> {
        let policy = self.settings.requote;
        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled { stage: run.stage });
            }
            run.quote_attempts = attempt;

            match self.prepare_once(intent, run).await {
                Ok(prepared) => return Ok(prepared),
                Err(err) if attempt < policy.max_attempts && err.is_retryable() => {
                    warn!(
                        "🔄 Attempt {}/{} failed at {}: {}; requoting",
                        attempt, policy.max_attempts, run.stage, err
                    );
                    // The signed bytes of this attempt are discarded unsent.
                    run.signature = None;
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(PipelineError::Cancelled { stage: run.stage });
                        }
                        _ = sleep(policy.backoff.delay(attempt)) => {}
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn prepare_once(&self, intent: &SwapIntent, run: &mut Run) -> Result<Prepared, PipelineError> {
        let owner = self.signer.public_key();

        run.enter(ExecutionStage::Quoting);
        let quote = self
            .quotes
            .get_quote(intent)
            .await
            .map_err(PipelineError::Quote)?;
        run.record_quote(&quote);
        info!(
            "💱 Quote {}: {} -> {} (min {}), impact {:.4}%, route {}",
            quote.request_id,
            quote.in_amount,
            quote.out_amount,
            quote.min_out_amount,
            quote.price_impact_pct,
            quote.route_summary()
        );

        run.enter(ExecutionStage::Validating);
        self.guard.validate_quote(intent, &quote)?;
        if self.guard.requires_balance_check() {
            let balance = if is_native_sol(intent.input_mint()) {
                self.ledger.balance(&owner).await
            } else {
                self.ledger.token_balance(&owner, intent.input_mint()).await
            }
            .map_err(|source| ledger_error(ExecutionStage::Validating, source))?;
            self.guard
                .validate_balance(intent, balance)
                .map_err(PipelineError::PreTradeRejected)?;
        }

        run.enter(ExecutionStage::Building);
        let unsigned = self
            .builder
            .build_transaction(&quote, &owner)
            .await
            .map_err(PipelineError::Build)?;
        let last_valid_block_height = match unsigned.last_valid_block_height {
            Some(height) => height,
            None => self
                .ledger
                .latest_valid_block_height()
                .await
                .map_err(|source| ledger_error(ExecutionStage::Building, source))?,
        };

        run.enter(ExecutionStage::Signing);
        let signed = self.signer.sign(&unsigned).map_err(PipelineError::Sign)?;
        run.signature = Some(*signed.signature());

        if self.settings.simulate {
            run.enter(ExecutionStage::Simulating);
            let outcome = self
                .broadcaster
                .simulate(&signed)
                .await
                .map_err(|source| ledger_error(ExecutionStage::Simulating, source))?;
            if let Some(err) = outcome.err {
                return Err(PipelineError::SimulationRejected(err));
            }
            debug!("Simulation ok, {:?} compute units", outcome.units_consumed);
        }

        Ok(Prepared {
            signed,
            last_valid_block_height,
        })
    }

    /// Submit the same signed bytes until one submission is accepted.
    async fn broadcast(&self, signed: &SignedTransaction) -> Result<(), PipelineError> {
        let expected = *signed.signature();
        let options = &self.settings.broadcast_options;

        let result = retry_async(
            &self.settings.broadcast,
            |attempt| async move {
                info!("📡 Sending {} (attempt {})", expected, attempt);
                let accepted = self.broadcaster.submit(signed, options).await?;
                if accepted != expected {
                    return Err(LedgerError::UnexpectedResponse(format!(
                        "node returned signature {}, expected {}",
                        accepted, expected
                    )));
                }
                Ok(())
            },
            |err| {
                warn!("⚠️ Submit of {} failed: {}", expected, err);
                true
            },
        )
        .await;

        result.map_err(|exhausted| PipelineError::Broadcast {
            message: exhausted.error.to_string(),
            attempts: exhausted.attempts,
        })
    }
}

fn ledger_error(stage: ExecutionStage, source: LedgerError) -> PipelineError {
    PipelineError::Ledger { stage, source }
}

/// Dry-run result: the quote and the guard's verdict on it
#[derive(Debug, Clone)]
pub struct QuotePreview {
    pub quote: Quote,
    pub attempts: u32,
    pub verdict: Result<(), PipelineError>,
}

/// Intake, Quoting and Validating only. Touches neither the wallet nor the ledger.
pub async fn preview_quote(
    quotes: &dyn QuoteApiClient,
    guard: &SafetyGuard,
    intent: &SwapIntent,
    policy: &RetryPolicy,
) -> Result<QuotePreview, PipelineError> {
    guard
        .validate_intent(intent)
        .map_err(PipelineError::IntentRejected)?;

    let (quote, attempts) = retry_async(
        policy,
        |attempt| async move { quotes.get_quote(intent).await.map(|quote| (quote, attempt)) },
        |failure| {
            warn!("⚠️ Quote request failed: {}", failure);
            failure.is_retryable()
        },
    )
    .await
    .map_err(|exhausted| PipelineError::Quote(exhausted.error))?;

    let verdict = guard.validate_quote(intent, &quote);
    Ok(QuotePreview {
        quote,
        attempts,
        verdict,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::retry::Backoff;
    use crate::domain::execution::testing::{
        sample_quote, status, StubBroadcaster, StubBuilder, StubLedger, StubQuotes,
    };
    use crate::domain::execution::SimulationOutcome;
    use crate::infrastructure::blockchain::KeypairSigner;
    use crate::shared::config::Limits;
    use crate::shared::errors::{BuildError, QuoteFailure, Rejection, SignError};
    use crate::shared::types::TimeoutCause;
    use crate::shared::utils::native_sol_mint;
    use solana_sdk::instruction::InstructionError;
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::Keypair;
    use solana_sdk::transaction::TransactionError;
    use std::sync::atomic::Ordering;

    struct Harness {
        quotes: Arc<StubQuotes>,
        builder: Arc<StubBuilder>,
        broadcaster: Arc<StubBroadcaster>,
        ledger: Arc<StubLedger>,
        settings: ExecutionSettings,
    }

    impl Harness {
        fn new(quotes: StubQuotes) -> Self {
            Self {
                quotes: Arc::new(quotes),
                builder: Arc::new(StubBuilder::ok()),
                broadcaster: Arc::new(StubBroadcaster::ok()),
                ledger: Arc::new(
                    StubLedger::new()
                        .with_statuses(vec![Ok(Some(status(321, ConfirmationLevel::Confirmed)))]),
                ),
                settings: fast_settings(),
            }
        }

        fn orchestrator(&self) -> SwapOrchestrator {
            SwapOrchestrator::new(
                self.quotes.clone(),
                self.builder.clone(),
                Arc::new(KeypairSigner::new(Keypair::new())),
                self.broadcaster.clone(),
                self.ledger.clone(),
                SafetyGuard::new(Limits::default()),
                self.settings.clone(),
            )
        }

        async fn run(&self, intent: &SwapIntent) -> ExecutionResult {
            self.orchestrator().execute(intent, &CancellationToken::new()).await
        }
    }

    fn fast_settings() -> ExecutionSettings {
        ExecutionSettings {
            requote: RetryPolicy::new(3, Backoff::None),
            broadcast: RetryPolicy::new(4, Backoff::None),
            broadcast_options: BroadcastOptions::default(),
            simulate: false,
            commitment: ConfirmationLevel::Confirmed,
            poll_interval: Duration::from_millis(2),
            confirmation_timeout: Duration::from_millis(40),
        }
    }

    fn sol_intent(amount: u64) -> SwapIntent {
        SwapIntent::new(native_sol_mint(), Pubkey::new_unique(), amount, 50, 1.0)
    }

    fn quoting(intent: &SwapIntent, impacts: &[f64]) -> StubQuotes {
        StubQuotes::new(impacts.iter().map(|p| Ok(sample_quote(intent, *p))).collect())
    }

    #[tokio::test]
    async fn confirms_acceptable_swap() {
        let intent = sol_intent(100_000_000);
        let h = Harness::new(quoting(&intent, &[0.4]));
        let result = h.run(&intent).await;

        assert_eq!(result.status, ExecutionStatus::Confirmed { slot: 321 });
        assert_eq!(result.stage, ExecutionStage::Confirming);
        assert_eq!(result.exit_code(), 0);
        assert_eq!(result.output_amount, 14_250_000);
        assert_eq!(result.price_impact_pct, Some(0.4));
        assert_eq!(result.quote_attempts, 1);

        let submitted = h.broadcaster.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(result.signature, Some(submitted[0]));
    }

    #[tokio::test]
    async fn excessive_price_impact_never_builds() {
        let intent = sol_intent(100_000_000);
        let h = Harness::new(quoting(&intent, &[3.2]));
        let result = h.run(&intent).await;

        assert_eq!(
            result.status,
            ExecutionStatus::Rejected(PipelineError::PriceImpactExceeded {
                actual_pct: 3.2,
                limit_pct: 1.0
            })
        );
        assert_eq!(result.stage, ExecutionStage::Validating);
        assert_eq!(result.signature, None);
        assert_eq!(h.quotes.calls(), 3);
        assert_eq!(h.builder.calls(), 0);
        assert!(h.broadcaster.submitted().is_empty());
    }

    #[tokio::test]
    async fn requote_recovers_from_price_impact() {
        let intent = sol_intent(100_000_000);
        let h = Harness::new(quoting(&intent, &[3.2, 0.3]));
        let result = h.run(&intent).await;

        assert!(result.is_confirmed());
        assert_eq!(result.quote_attempts, 2);
        assert_eq!(result.price_impact_pct, Some(0.3));
        assert_eq!(h.builder.calls(), 1);
    }

    #[tokio::test]
    async fn notional_ceiling_makes_no_calls() {
        let intent = sol_intent(1_000_000_001);
        let h = Harness::new(quoting(&intent, &[0.1]));
        let result = h.run(&intent).await;

        assert!(matches!(
            result.status,
            ExecutionStatus::Rejected(PipelineError::IntentRejected(Rejection::NotionalExceeded { .. }))
        ));
        assert_eq!(result.stage, ExecutionStage::Intake);
        assert_eq!(result.quote_attempts, 0);
        assert_eq!(h.quotes.calls(), 0);
    }

    #[tokio::test]
    async fn asset_mismatch_is_not_requoted() {
        let intent = sol_intent(100_000_000);
        let mut quote = sample_quote(&intent, 0.1);
        quote.output_mint = Pubkey::new_unique();
        let h = Harness::new(StubQuotes::new(vec![Ok(quote)]));
        let result = h.run(&intent).await;

        assert!(matches!(
            result.status,
            ExecutionStatus::Failed(PipelineError::Quote(QuoteFailure::AssetMismatch { .. }))
        ));
        assert_eq!(h.quotes.calls(), 1);
    }

    #[tokio::test]
    async fn stale_build_triggers_requote() {
        let intent = sol_intent(100_000_000);
        let mut h = Harness::new(quoting(&intent, &[0.2]));
        h.builder = Arc::new(StubBuilder::new(vec![
            Err(BuildError::new("quote expired")),
            Ok(()),
        ]));
        let result = h.run(&intent).await;

        assert!(result.is_confirmed());
        assert_eq!(h.quotes.calls(), 2);
        assert_eq!(h.builder.calls(), 2);
    }

    #[tokio::test]
    async fn undecodable_payload_triggers_requote() {
        let intent = sol_intent(100_000_000);
        let mut h = Harness::new(quoting(&intent, &[0.2]));
        let mut builder = StubBuilder::ok();
        builder.garbage_builds = 1;
        h.builder = Arc::new(builder);
        let result = h.run(&intent).await;

        assert!(result.is_confirmed());
        assert_eq!(result.quote_attempts, 2);
        assert_eq!(h.quotes.calls(), 2);
        assert_eq!(h.builder.calls(), 2);
        let submitted = h.broadcaster.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(result.signature, Some(submitted[0]));
    }

    #[tokio::test]
    async fn requote_discards_unsent_signature() {
        let intent = sol_intent(100_000_000);
        let mut h = Harness::new(StubQuotes::new(vec![
            Ok(sample_quote(&intent, 0.2)),
            Err(QuoteFailure::Malformed("missing outAmount".into())),
        ]));
        let mut broadcaster = StubBroadcaster::ok();
        broadcaster.simulation = SimulationOutcome {
            err: Some("custom program error: 0x1771".to_string()),
            units_consumed: None,
            logs: vec![],
        };
        h.broadcaster = Arc::new(broadcaster);
        h.settings.simulate = true;
        let result = h.run(&intent).await;

        assert!(matches!(
            result.status,
            ExecutionStatus::Failed(PipelineError::Quote(QuoteFailure::Malformed(_)))
        ));
        assert_eq!(result.stage, ExecutionStage::Quoting);
        assert_eq!(result.signature, None);
        assert!(h.broadcaster.submitted().is_empty());
    }

    #[tokio::test]
    async fn token_input_checks_token_balance() {
        let mint = Pubkey::new_unique();
        let intent = SwapIntent::new(mint, native_sol_mint(), 500_000, 50, 1.0);
        let mut h = Harness::new(quoting(&intent, &[0.2]));
        h.ledger = Arc::new(
            StubLedger::new()
                .with_token_balance(500_000)
                .with_balance(0)
                .with_statuses(vec![Ok(Some(status(88, ConfirmationLevel::Confirmed)))]),
        );
        let result = h.run(&intent).await;

        assert_eq!(result.status, ExecutionStatus::Confirmed { slot: 88 });
        assert_eq!(h.ledger.token_balance_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn token_input_beyond_holdings_never_builds() {
        let mint = Pubkey::new_unique();
        let intent = SwapIntent::new(mint, native_sol_mint(), 500_000, 50, 1.0);

        let mut h = Harness::new(quoting(&intent, &[0.2]));
        h.ledger = Arc::new(StubLedger::new().with_token_balance(120_000));
        let result = h.run(&intent).await;
        assert_eq!(
            result.status,
            ExecutionStatus::Rejected(PipelineError::PreTradeRejected(
                Rejection::InsufficientBalance {
                    balance: 120_000,
                    required: 500_000
                }
            ))
        );
        assert_eq!(h.builder.calls(), 0);

        let mut h = Harness::new(quoting(&intent, &[0.2]));
        h.ledger = Arc::new(StubLedger::new());
        let result = h.run(&intent).await;
        assert_eq!(
            result.status,
            ExecutionStatus::Rejected(PipelineError::PreTradeRejected(Rejection::EmptyBalance(mint)))
        );
        assert!(h.broadcaster.submitted().is_empty());
    }

    #[tokio::test]
    async fn signer_mismatch_is_fatal() {
        let intent = sol_intent(100_000_000);
        let mut h = Harness::new(quoting(&intent, &[0.2]));
        let mut builder = StubBuilder::ok();
        builder.fee_payer = Some(Pubkey::new_unique());
        h.builder = Arc::new(builder);
        let result = h.run(&intent).await;

        match &result.status {
            ExecutionStatus::Failed(err) => {
                assert!(matches!(err, PipelineError::Sign(SignError::SignerMismatch { .. })));
                assert!(err.is_fatal());
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(result.stage, ExecutionStage::Signing);
        assert_eq!(h.quotes.calls(), 1);
        assert!(h.broadcaster.submitted().is_empty());
    }

    #[tokio::test]
    async fn insufficient_balance_rejected_before_build() {
        let intent = sol_intent(100_000_000);
        let mut h = Harness::new(quoting(&intent, &[0.2]));
        h.ledger = Arc::new(StubLedger::new().with_balance(50_000_000));
        let result = h.run(&intent).await;

        assert_eq!(
            result.status,
            ExecutionStatus::Rejected(PipelineError::PreTradeRejected(
                Rejection::InsufficientBalance {
                    balance: 50_000_000,
                    required: 110_000_000
                }
            ))
        );
        assert_eq!(h.quotes.calls(), 1);
        assert_eq!(h.builder.calls(), 0);
    }

    #[tokio::test]
    async fn simulation_rejection_stops_before_broadcast() {
        let intent = sol_intent(100_000_000);
        let mut h = Harness::new(quoting(&intent, &[0.2]));
        let mut broadcaster = StubBroadcaster::ok();
        broadcaster.simulation = SimulationOutcome {
            err: Some("custom program error: 0x1771".to_string()),
            units_consumed: Some(48_000),
            logs: vec![],
        };
        h.broadcaster = Arc::new(broadcaster);
        h.settings.simulate = true;
        let result = h.run(&intent).await;

        assert!(matches!(
            result.status,
            ExecutionStatus::Rejected(PipelineError::SimulationRejected(_))
        ));
        assert_eq!(result.stage, ExecutionStage::Simulating);
        assert_eq!(h.broadcaster.simulations.load(Ordering::SeqCst), 3);
        assert!(h.broadcaster.submitted().is_empty());
    }

    #[tokio::test]
    async fn transient_submit_errors_resend_same_bytes() {
        let intent = sol_intent(100_000_000);
        let mut h = Harness::new(quoting(&intent, &[0.2]));
        h.broadcaster = Arc::new(StubBroadcaster::new(vec![
            Err(LedgerError::Rpc("connection reset".into())),
            Err(LedgerError::Rpc("connection reset".into())),
            Ok(()),
        ]));
        let result = h.run(&intent).await;

        assert!(result.is_confirmed());
        let submitted = h.broadcaster.submitted();
        assert_eq!(submitted.len(), 3);
        assert!(submitted.iter().all(|sig| *sig == submitted[0]));
        assert_eq!(h.quotes.calls(), 1);
        assert_eq!(h.builder.calls(), 1);
    }

    #[tokio::test]
    async fn exhausted_broadcast_never_requotes() {
        let intent = sol_intent(100_000_000);
        let mut h = Harness::new(quoting(&intent, &[0.2]));
        h.broadcaster = Arc::new(StubBroadcaster::new(vec![Err(LedgerError::Rpc(
            "node unhealthy".into(),
        ))]));
        h.ledger = Arc::new(StubLedger::new());
        let result = h.run(&intent).await;

        assert_eq!(
            result.status,
            ExecutionStatus::Failed(PipelineError::Broadcast {
                message: "rpc request failed: node unhealthy".to_string(),
                attempts: 4
            })
        );
        assert_eq!(result.stage, ExecutionStage::Broadcasting);
        assert!(result.signature.is_some());
        assert_eq!(h.quotes.calls(), 1);
        assert_eq!(h.builder.calls(), 1);
        assert_eq!(h.broadcaster.submitted().len(), 4);
    }

    #[tokio::test]
    async fn deadline_without_landing_times_out() {
        let intent = sol_intent(100_000_000);
        let mut h = Harness::new(quoting(&intent, &[0.2]));
        h.ledger = Arc::new(StubLedger::new());
        let result = h.run(&intent).await;

        match result.status {
            ExecutionStatus::TimedOut {
                cause,
                last_valid_block_height,
                ..
            } => {
                assert_eq!(cause, TimeoutCause::DeadlineElapsed);
                assert_eq!(last_valid_block_height, 1_000);
            }
            ref other => panic!("expected timeout, got {:?}", other),
        }
        assert!(matches!(
            result.error(),
            Some(PipelineError::ConfirmationTimeout { .. })
        ));
        assert_eq!(result.exit_code(), 1);
    }

    #[tokio::test]
    async fn expired_blockhash_is_timeout_not_failure() {
        let intent = sol_intent(100_000_000);
        let mut h = Harness::new(quoting(&intent, &[0.2]));
        h.ledger = Arc::new(StubLedger::new().with_heights(vec![Ok(1_001)]));
        let result = h.run(&intent).await;

        assert!(matches!(
            result.status,
            ExecutionStatus::TimedOut {
                cause: TimeoutCause::BlockhashExpired,
                observed_block_height: Some(1_001),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn onchain_failure_carries_ledger_error() {
        let intent = sol_intent(100_000_000);
        let mut h = Harness::new(quoting(&intent, &[0.2]));
        let error = TransactionError::InstructionError(2, InstructionError::Custom(6001));
        h.ledger = Arc::new(StubLedger::new().with_statuses(vec![Ok(Some(LedgerStatus {
            slot: 77,
            confirmation: ConfirmationLevel::Confirmed,
            err: Some(error.clone()),
        }))]));
        let result = h.run(&intent).await;

        let signature = result.signature.unwrap();
        assert_eq!(
            result.status,
            ExecutionStatus::Failed(PipelineError::OnchainFailure { signature, error })
        );
    }

    #[tokio::test]
    async fn missing_validity_height_falls_back_to_ledger() {
        let intent = sol_intent(100_000_000);
        let mut h = Harness::new(quoting(&intent, &[0.2]));
        let mut builder = StubBuilder::ok();
        builder.last_valid_block_height = None;
        h.builder = Arc::new(builder);
        let mut ledger = StubLedger::new();
        ledger.latest_valid_block_height = 5_000;
        h.ledger = Arc::new(ledger);
        let result = h.run(&intent).await;

        assert_eq!(h.ledger.latest_valid_calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result.status,
            ExecutionStatus::TimedOut {
                last_valid_block_height: 5_000,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn cancelled_before_start_sends_nothing() {
        let intent = sol_intent(100_000_000);
        let h = Harness::new(quoting(&intent, &[0.2]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = h.orchestrator().execute(&intent, &cancel).await;

        assert!(matches!(
            result.status,
            ExecutionStatus::Failed(PipelineError::Cancelled { .. })
        ));
        assert_eq!(h.quotes.calls(), 0);
        assert!(h.broadcaster.submitted().is_empty());
    }

    #[tokio::test]
    async fn preview_reports_verdict_without_wallet() {
        let intent = sol_intent(100_000_000);
        let quotes = StubQuotes::new(vec![
            Err(QuoteFailure::Transport("timeout".into())),
            Ok(sample_quote(&intent, 3.2)),
        ]);
        let guard = SafetyGuard::new(Limits::default());
        let preview = preview_quote(&quotes, &guard, &intent, &RetryPolicy::new(3, Backoff::None))
            .await
            .unwrap();

        assert_eq!(preview.attempts, 2);
        assert!(matches!(
            preview.verdict,
            Err(PipelineError::PriceImpactExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn check_status_reads_history() {
        let intent = sol_intent(100_000_000);
        let h = Harness::new(quoting(&intent, &[0.2]));
        let found = h
            .orchestrator()
            .check_status(&Signature::new_unique())
            .await
            .unwrap();

        assert_eq!(found.map(|s| s.slot), Some(321));
        assert_eq!(h.ledger.history_lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn settings_follow_config() {
        let mut config = Config::default();
        config.execution.broadcast_max_retries = 2;
        config.execution.simulate_before_send = true;
        let settings = ExecutionSettings::from_config(&config);

        assert_eq!(settings.broadcast.max_attempts, 3);
        assert_eq!(settings.requote.max_attempts, 3);
        assert!(settings.simulate);
        assert_eq!(settings.confirmation_timeout, Duration::from_secs(60));
    }
}
