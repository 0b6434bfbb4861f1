//! Utility functions and helpers

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::shared::errors::AppError;

pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Well-known tokens: symbol, mint, decimals
pub const KNOWN_TOKENS: &[(&str, &str, u8)] = &[
    ("SOL", SOL_MINT, 9),
    ("USDC", "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", 6),
    ("BONK", "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263", 5),
    ("WIF", "EKpQGSJtjMFqKZ9KQanSqYXRcF8fBopzLHYxdM65zcjm", 6),
    ("JUP", "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN", 6),
];

/// A resolved asset: mint plus decimals when known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    pub mint: Pubkey,
    pub symbol: Option<&'static str>,
    pub decimals: Option<u8>,
}

impl AssetRef {
    pub fn label(&self) -> String {
        match self.symbol {
            Some(symbol) => symbol.to_string(),
            None => short_mint(&self.mint),
        }
    }
}

/// Resolve a symbol (case-insensitive) or base58 mint address.
pub fn resolve_asset(input: &str) -> Result<AssetRef, AppError> {
    let trimmed = input.trim();
    if let Some((symbol, mint, decimals)) = KNOWN_TOKENS
        .iter()
        .find(|(symbol, _, _)| symbol.eq_ignore_ascii_case(trimmed))
    {
        return Ok(AssetRef {
            mint: parse_mint(mint)?,
            symbol: Some(*symbol),
            decimals: Some(*decimals),
        });
    }

    let mint = parse_mint(trimmed)?;
    let known = KNOWN_TOKENS
        .iter()
        .find(|(_, known_mint, _)| *known_mint == trimmed);
    Ok(AssetRef {
        mint,
        symbol: known.map(|(symbol, _, _)| *symbol),
        decimals: known.map(|(_, _, decimals)| *decimals),
    })
}

pub fn parse_mint(address: &str) -> Result<Pubkey, AppError> {
    Pubkey::from_str(address)
        .map_err(|e| AppError::InvalidArgument(format!("Invalid mint {:?}: {}", address, e)))
}

pub fn native_sol_mint() -> Pubkey {
    // constant is a valid base58 address
    Pubkey::from_str(SOL_MINT).unwrap_or_default()
}

pub fn is_native_sol(mint: &Pubkey) -> bool {
    *mint == native_sol_mint()
}

/// Convert a display amount ("0.1") to base units, truncating extra precision.
pub fn ui_to_base_units(amount: &str, decimals: u8) -> Result<u64, AppError> {
    let value = Decimal::from_str(amount.trim())
        .map_err(|e| AppError::InvalidArgument(format!("Invalid amount {:?}: {}", amount, e)))?;
    if value.is_sign_negative() {
        return Err(AppError::InvalidArgument(format!("Amount must not be negative: {}", amount)));
    }
    let scale = 10u64
        .checked_pow(decimals as u32)
        .map(Decimal::from)
        .ok_or_else(|| AppError::InvalidArgument(format!("Unsupported decimals: {}", decimals)))?;
    value
        .checked_mul(scale)
        .and_then(|v| v.trunc().to_u64())
        .ok_or_else(|| AppError::InvalidArgument(format!("Amount out of range: {}", amount)))
}

/// Parse an amount that is already in base units.
pub fn parse_base_units(amount: &str) -> Result<u64, AppError> {
    amount
        .trim()
        .parse::<u64>()
        .map_err(|e| AppError::InvalidArgument(format!("Invalid raw amount {:?}: {}", amount, e)))
}

/// Format amount with proper decimals
pub fn format_amount(amount: u64, decimals: u8) -> String {
    let mut value = Decimal::from(amount);
    if value.set_scale(decimals as u32).is_err() {
        return amount.to_string();
    }
    value.normalize().to_string()
}

pub fn short_mint(mint: &Pubkey) -> String {
    let s = mint.to_string();
    if s.len() <= 12 {
        return s;
    }
    format!("{}...{}", &s[..4], &s[s.len() - 4..])
}

/// Generate unique ID
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
