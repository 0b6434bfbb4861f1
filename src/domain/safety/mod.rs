//! Safety guard: pure checks of intents and quotes against configured limits

use solana_sdk::pubkey::Pubkey;

use crate::shared::config::Limits;
use crate::shared::errors::{PipelineError, QuoteFailure, Rejection};
use crate::shared::types::{Quote, SwapIntent};
use crate::shared::utils::is_native_sol;

/// Stateless validator over a read-only set of limits.
#[derive(Debug, Clone)]
pub struct SafetyGuard {
    limits: Limits,
}

impl SafetyGuard {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// First, cheapest check. Runs before any network call.
    pub fn validate_intent(&self, intent: &SwapIntent) -> Result<(), Rejection> {
        if intent.amount() == 0 {
            return Err(Rejection::ZeroAmount);
        }
        if intent.input_mint() == intent.output_mint() {
            return Err(Rejection::SameAsset(*intent.input_mint()));
        }
        if intent.amount() > self.limits.max_notional {
            return Err(Rejection::NotionalExceeded {
                amount: intent.amount(),
                limit: self.limits.max_notional,
            });
        }
        if intent.max_slippage_bps() > self.limits.max_slippage_bps {
            return Err(Rejection::SlippageExceeded {
                requested: intent.max_slippage_bps(),
                limit: self.limits.max_slippage_bps,
            });
        }
        Ok(())
    }

    /// Checks a quote against the intent it was issued for.
    ///
    /// Shape violations (wrong assets, wrong input amount, floor above
    /// estimate) come back as `Quote` errors; an over-limit price impact as
    /// `PriceImpactExceeded`.
    pub fn validate_quote(&self, intent: &SwapIntent, quote: &Quote) -> Result<(), PipelineError> {
        if quote.input_mint != *intent.input_mint() {
            return Err(PipelineError::Quote(QuoteFailure::AssetMismatch {
                field: "inputMint",
                expected: *intent.input_mint(),
                actual: quote.input_mint,
            }));
        }
        if quote.output_mint != *intent.output_mint() {
            return Err(PipelineError::Quote(QuoteFailure::AssetMismatch {
                field: "outputMint",
                expected: *intent.output_mint(),
                actual: quote.output_mint,
            }));
        }
        if quote.in_amount != intent.amount() {
            return Err(PipelineError::Quote(QuoteFailure::Malformed(format!(
                "inAmount {} differs from requested {}",
                quote.in_amount,
                intent.amount()
            ))));
        }
        if quote.min_out_amount > quote.out_amount {
            return Err(PipelineError::Quote(QuoteFailure::Malformed(format!(
                "minOutAmount {} above outAmount {}",
                quote.min_out_amount, quote.out_amount
            ))));
        }
        if !quote.price_impact_pct.is_finite() || quote.price_impact_pct < 0.0 {
            return Err(PipelineError::Quote(QuoteFailure::Malformed(format!(
                "priceImpactPct {} is not a valid percentage",
                quote.price_impact_pct
            ))));
        }

        let limit_pct = self.effective_price_impact_limit(intent);
        if quote.price_impact_pct > limit_pct {
            return Err(PipelineError::PriceImpactExceeded {
                actual_pct: quote.price_impact_pct,
                limit_pct,
            });
        }
        Ok(())
    }

    /// The wallet must hold the full input amount. Spending native SOL must
    /// also leave the fee reserve untouched.
    ///
    /// `balance` is lamports for native SOL and token base units otherwise.
    pub fn validate_balance(&self, intent: &SwapIntent, balance: u64) -> Result<(), Rejection> {
        if !self.requires_balance_check() {
            return Ok(());
        }
        let required = if is_native_sol(intent.input_mint()) {
            intent
                .amount()
                .saturating_add(self.limits.fee_reserve_lamports)
        } else {
            if balance == 0 {
                return Err(Rejection::EmptyBalance(*intent.input_mint()));
            }
            intent.amount()
        };
        if balance < required {
            return Err(Rejection::InsufficientBalance { balance, required });
        }
        Ok(())
    }

    pub fn requires_balance_check(&self) -> bool {
        self.limits.check_balance
    }

    /// Largest amount a "sell everything" intent may spend out of `balance`.
    pub fn spendable(&self, input_mint: &Pubkey, balance: u64) -> u64 {
        if is_native_sol(input_mint) {
            balance.saturating_sub(self.limits.fee_reserve_lamports)
        } else {
            balance
        }
    }

    /// The stricter of the configured limit and the intent's own tolerance.
    pub fn effective_price_impact_limit(&self, intent: &SwapIntent) -> f64 {
        let requested = intent.max_price_impact_pct();
        if requested.is_finite() && requested > 0.0 {
            requested.min(self.limits.max_price_impact_pct)
        } else {
            self.limits.max_price_impact_pct
        }
    }
}
