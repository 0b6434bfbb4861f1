//! Confirmation tracking by polling signature status and block height

use solana_sdk::signature::Signature;
use solana_sdk::transaction::TransactionError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::LedgerReader;
use crate::shared::types::{ConfirmationLevel, TimeoutCause};

/// How waiting for a broadcast transaction ended
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmationOutcome {
    Confirmed {
        slot: u64,
    },
    Failed {
        slot: u64,
        error: TransactionError,
    },
    TimedOut {
        cause: TimeoutCause,
        observed_block_height: Option<u64>,
    },
}

/// Watches one signature until a verdict, expiry, deadline or cancellation
pub struct ConfirmationTracker {
    ledger: Arc<dyn LedgerReader>,
    commitment: ConfirmationLevel,
    poll_interval: Duration,
}

/// Upper bound on the history lookup made after giving up.
const FINAL_LOOKUP_TIMEOUT: Duration = Duration::from_secs(1);

/// What one status poll saw
enum Poll {
    Verdict(ConfirmationOutcome),
    /// Seen in `slot` below the target commitment
    Seen(u64),
    Unseen,
}

/// Why a ledger call was abandoned
enum Interrupted {
    Deadline,
    Cancelled,
}

impl ConfirmationTracker {
    pub fn new(
        ledger: Arc<dyn LedgerReader>,
        commitment: ConfirmationLevel,
        poll_interval: Duration,
    ) -> Self {
        Self {
            ledger,
            commitment,
            poll_interval,
        }
    }

    /// Poll until the signature reaches the target commitment.
    ///
    /// Height above `last_valid_block_height` means the transaction can no
    /// longer land, unless the ledger has already reported it. Every ledger
    /// call races the deadline and `cancel`. Expiry, deadline and
    /// cancellation each get one last bounded history lookup before giving up.
    pub async fn await_confirmation(
        &self,
        signature: &Signature,
        last_valid_block_height: u64,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ConfirmationOutcome {
        let deadline = Instant::now() + timeout;
        let mut observed_block_height = None;
        let mut seen_in_slot = None;
        let mut polls = 0u32;

        info!(
            "⏳ Waiting for {} at {} (valid through block {})",
            signature, self.commitment, last_valid_block_height
        );

        loop {
            polls += 1;
            match bounded(self.check(signature, false), deadline, cancel).await {
                Ok(Poll::Verdict(outcome)) => {
                    debug!("Verdict for {} after {} poll(s)", signature, polls);
                    return outcome;
                }
                Ok(Poll::Seen(slot)) => seen_in_slot = Some(slot),
                Ok(Poll::Unseen) => {}
                Err(interrupted) => {
                    return self
                        .interrupted(signature, interrupted, timeout, observed_block_height)
                        .await;
                }
            }

            match bounded(self.ledger.block_height(), deadline, cancel).await {
                Ok(Ok(height)) => {
                    observed_block_height = Some(height);
                    if height > last_valid_block_height {
                        match seen_in_slot {
                            // Already in a block, so expiry of its blockhash no longer matters.
                            Some(slot) => debug!(
                                "Height {} passed {} but {} was seen in slot {}",
                                height, last_valid_block_height, signature, slot
                            ),
                            None => {
                                warn!(
                                    "⌛ Block height {} passed {} for {}",
                                    height, last_valid_block_height, signature
                                );
                                return self
                                    .give_up(signature, TimeoutCause::BlockhashExpired, observed_block_height)
                                    .await;
                            }
                        }
                    }
                }
                Ok(Err(e)) => warn!("⚠️ Block height lookup failed, still polling: {}", e),
                Err(interrupted) => {
                    return self
                        .interrupted(signature, interrupted, timeout, observed_block_height)
                        .await;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return self
                    .interrupted(signature, Interrupted::Deadline, timeout, observed_block_height)
                    .await;
            }

            let wait = self.poll_interval.min(deadline - now);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return self
                        .interrupted(signature, Interrupted::Cancelled, timeout, observed_block_height)
                        .await;
                }
                _ = sleep(wait) => {}
            }
        }
    }

    async fn check(&self, signature: &Signature, search_history: bool) -> Poll {
        match self.ledger.signature_status(signature, search_history).await {
            Ok(Some(status)) if status.satisfies(self.commitment) => Poll::Verdict(match status.err {
                Some(error) => ConfirmationOutcome::Failed {
                    slot: status.slot,
                    error,
                },
                None => ConfirmationOutcome::Confirmed { slot: status.slot },
            }),
            Ok(Some(status)) => {
                debug!("{} seen at {} in slot {}", signature, status.confirmation, status.slot);
                Poll::Seen(status.slot)
            }
            Ok(None) => Poll::Unseen,
            Err(e) => {
                warn!("⚠️ Status lookup for {} failed, still polling: {}", signature, e);
                Poll::Unseen
            }
        }
    }

    async fn interrupted(
        &self,
        signature: &Signature,
        interrupted: Interrupted,
        timeout: Duration,
        observed_block_height: Option<u64>,
    ) -> ConfirmationOutcome {
        let cause = match interrupted {
            Interrupted::Deadline => {
                warn!("⌛ Gave up waiting for {} after {:?}", signature, timeout);
                TimeoutCause::DeadlineElapsed
            }
            Interrupted::Cancelled => {
                warn!("🛑 Confirmation wait for {} cancelled", signature);
                TimeoutCause::Cancelled
            }
        };
        self.give_up(signature, cause, observed_block_height).await
    }

    async fn give_up(
        &self,
        signature: &Signature,
        cause: TimeoutCause,
        observed_block_height: Option<u64>,
    ) -> ConfirmationOutcome {
        match tokio::time::timeout(FINAL_LOOKUP_TIMEOUT, self.check(signature, true)).await {
            Ok(Poll::Verdict(outcome)) => {
                info!("Final lookup found a verdict for {}", signature);
                return outcome;
            }
            Ok(_) => {}
            Err(_) => warn!("⚠️ Final lookup for {} did not answer in time", signature),
        }
        ConfirmationOutcome::TimedOut {
            cause,
            observed_block_height,
        }
    }
}

/// Runs `call` until it completes, the deadline passes or `cancel` fires.
async fn bounded<F: Future>(
    call: F,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<F::Output, Interrupted> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupted::Cancelled),
        result = timeout_at(deadline, call) => result.map_err(|_| Interrupted::Deadline),
    }
}
