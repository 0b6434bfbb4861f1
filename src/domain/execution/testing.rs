//! In-memory stand-ins for the component seams, with call counters

use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::message::{Message, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::system_instruction;
use solana_sdk::transaction::VersionedTransaction;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use super::{
    BroadcastOptions, Broadcaster, LedgerReader, QuoteApiClient, SimulationOutcome,
    SwapTransactionBuilder,
};
use crate::shared::errors::{BuildError, LedgerError, QuoteFailure};
use crate::shared::types::{
    ConfirmationLevel, LedgerStatus, Quote, RouteLeg, SignedTransaction, SwapIntent,
    UnsignedTransaction,
};

/// Replays queued responses, then repeats the last one forever.
pub(crate) struct Script<T> {
    queue: Mutex<VecDeque<T>>,
    last: Mutex<Option<T>>,
}

impl<T: Clone> Script<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            queue: Mutex::new(items.into()),
            last: Mutex::new(None),
        }
    }

    pub fn next(&self) -> Option<T> {
        let mut queue = self.queue.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(item) = queue.pop_front() {
            *last = Some(item.clone());
        }
        last.clone()
    }
}

/// Bincode bytes of an unsigned one-instruction transfer paid by `payer`.
pub(crate) fn unsigned_payload(payer: &Pubkey) -> Vec<u8> {
    let instruction = system_instruction::transfer(payer, &Pubkey::new_unique(), 1_000);
    let mut message = Message::new(&[instruction], Some(payer));
    message.recent_blockhash = Hash::new_unique();
    let tx = VersionedTransaction {
        signatures: vec![Signature::default(); message.header.num_required_signatures as usize],
        message: VersionedMessage::Legacy(message),
    };
    bincode::serialize(&tx).unwrap()
}

pub(crate) fn sample_quote(intent: &SwapIntent, price_impact_pct: f64) -> Quote {
    Quote {
        request_id: "quote-1".to_string(),
        input_mint: *intent.input_mint(),
        output_mint: *intent.output_mint(),
        in_amount: intent.amount(),
        out_amount: 14_250_000,
        min_out_amount: 14_178_750,
        price_impact_pct,
        route: vec![RouteLeg {
            venue: "Whirlpool".to_string(),
            in_amount: intent.amount(),
            out_amount: 14_250_000,
            input_decimals: Some(9),
            output_decimals: Some(6),
        }],
        expiry_hint: None,
        raw: serde_json::json!({ "requestId": "quote-1" }),
    }
}

pub(crate) fn status(slot: u64, confirmation: ConfirmationLevel) -> LedgerStatus {
    LedgerStatus {
        slot,
        confirmation,
        err: None,
    }
}

pub(crate) struct StubQuotes {
    script: Script<Result<Quote, QuoteFailure>>,
    pub calls: AtomicU32,
}

impl StubQuotes {
    pub fn new(responses: Vec<Result<Quote, QuoteFailure>>) -> Self {
        Self {
            script: Script::new(responses),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteApiClient for StubQuotes {
    async fn get_quote(&self, _intent: &SwapIntent) -> Result<Quote, QuoteFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .next()
            .unwrap_or_else(|| Err(QuoteFailure::Service("no scripted quote".to_string())))
    }
}

pub(crate) struct StubBuilder {
    script: Script<Result<(), BuildError>>,
    /// Fee payer written into the payload instead of the requested signer
    pub fee_payer: Option<Pubkey>,
    pub last_valid_block_height: Option<u64>,
    /// Number of leading builds that return undecodable bytes
    pub garbage_builds: u32,
    pub calls: AtomicU32,
}

impl StubBuilder {
    pub fn new(responses: Vec<Result<(), BuildError>>) -> Self {
        Self {
            script: Script::new(responses),
            fee_payer: None,
            last_valid_block_height: Some(1_000),
            garbage_builds: 0,
            calls: AtomicU32::new(0),
        }
    }

    pub fn ok() -> Self {
        Self::new(vec![Ok(())])
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SwapTransactionBuilder for StubBuilder {
    async fn build_transaction(
        &self,
        _quote: &Quote,
        signer: &Pubkey,
    ) -> Result<UnsignedTransaction, BuildError> {
        let previous = self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.next().unwrap_or(Ok(()))?;
        let payload = if previous < self.garbage_builds {
            vec![0xde, 0xad]
        } else {
            unsigned_payload(&self.fee_payer.unwrap_or(*signer))
        };
        Ok(UnsignedTransaction {
            payload,
            compute_unit_limit: Some(200_000),
            last_valid_block_height: self.last_valid_block_height,
            prioritization_fee_lamports: None,
        })
    }
}

pub(crate) struct StubBroadcaster {
    submits: Script<Result<(), LedgerError>>,
    pub simulation: SimulationOutcome,
    pub submitted: Mutex<Vec<Signature>>,
    pub simulations: AtomicU32,
}

impl StubBroadcaster {
    pub fn new(responses: Vec<Result<(), LedgerError>>) -> Self {
        Self {
            submits: Script::new(responses),
            simulation: SimulationOutcome::default(),
            submitted: Mutex::new(Vec::new()),
            simulations: AtomicU32::new(0),
        }
    }

    pub fn ok() -> Self {
        Self::new(vec![Ok(())])
    }

    pub fn submitted(&self) -> Vec<Signature> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Broadcaster for StubBroadcaster {
    async fn submit(
        &self,
        transaction: &SignedTransaction,
        _options: &BroadcastOptions,
    ) -> Result<Signature, LedgerError> {
        self.submitted.lock().unwrap().push(*transaction.signature());
        self.submits.next().unwrap_or(Ok(()))?;
        Ok(*transaction.signature())
    }

    async fn simulate(
        &self,
        _transaction: &SignedTransaction,
    ) -> Result<SimulationOutcome, LedgerError> {
        self.simulations.fetch_add(1, Ordering::SeqCst);
        Ok(self.simulation.clone())
    }
}

pub(crate) struct StubLedger {
    statuses: Script<Result<Option<LedgerStatus>, LedgerError>>,
    heights: Script<Result<u64, LedgerError>>,
    pub latest_valid_block_height: u64,
    pub balance: u64,
    pub token_balance: u64,
    pub token_balance_calls: AtomicU32,
    pub status_calls: AtomicU32,
    pub history_lookups: AtomicU32,
    pub latest_valid_calls: AtomicU32,
}

impl StubLedger {
    pub fn new() -> Self {
        Self {
            statuses: Script::new(vec![]),
            heights: Script::new(vec![]),
            latest_valid_block_height: 1_000,
            balance: 10_000_000_000,
            token_balance: 0,
            token_balance_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
            history_lookups: AtomicU32::new(0),
            latest_valid_calls: AtomicU32::new(0),
        }
    }

    pub fn with_statuses(mut self, statuses: Vec<Result<Option<LedgerStatus>, LedgerError>>) -> Self {
        self.statuses = Script::new(statuses);
        self
    }

    pub fn with_heights(mut self, heights: Vec<Result<u64, LedgerError>>) -> Self {
        self.heights = Script::new(heights);
        self
    }

    pub fn with_balance(mut self, balance: u64) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_token_balance(mut self, balance: u64) -> Self {
        self.token_balance = balance;
        self
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerReader for StubLedger {
    async fn signature_status(
        &self,
        _signature: &Signature,
        search_history: bool,
    ) -> Result<Option<LedgerStatus>, LedgerError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if search_history {
            self.history_lookups.fetch_add(1, Ordering::SeqCst);
        }
        self.statuses.next().unwrap_or(Ok(None))
    }

    async fn block_height(&self) -> Result<u64, LedgerError> {
        self.heights.next().unwrap_or(Ok(100))
    }

    async fn latest_valid_block_height(&self) -> Result<u64, LedgerError> {
        self.latest_valid_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.latest_valid_block_height)
    }

    async fn balance(&self, _owner: &Pubkey) -> Result<u64, LedgerError> {
        Ok(self.balance)
    }

    async fn token_balance(&self, _owner: &Pubkey, _mint: &Pubkey) -> Result<u64, LedgerError> {
        self.token_balance_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.token_balance)
    }
}

/// Ledger whose every call hangs, like an RPC node that stopped answering.
pub(crate) struct StalledLedger;

#[async_trait]
impl LedgerReader for StalledLedger {
    async fn signature_status(
        &self,
        _signature: &Signature,
        _search_history: bool,
    ) -> Result<Option<LedgerStatus>, LedgerError> {
        std::future::pending().await
    }

    async fn block_height(&self) -> Result<u64, LedgerError> {
        std::future::pending().await
    }

    async fn latest_valid_block_height(&self) -> Result<u64, LedgerError> {
        std::future::pending().await
    }

    async fn balance(&self, _owner: &Pubkey) -> Result<u64, LedgerError> {
        std::future::pending().await
    }

    async fn token_balance(&self, _owner: &Pubkey, _mint: &Pubkey) -> Result<u64, LedgerError> {
        std::future::pending().await
    }
}
