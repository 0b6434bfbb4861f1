//! Configuration: TOML file, then environment, then CLI overrides.
//!
//! The resolved `Config` is built once at startup and passed by reference;
//! nothing in the pipeline reads the environment after that.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::shared::errors::AppError;
use crate::shared::types::ConfirmationLevel;

pub const DEFAULT_CONFIG_PATH: &str = "Config.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RpcCfg {
    pub url: String,
    pub commitment: ConfirmationLevel,
}

impl Default for RpcCfg {
    fn default() -> Self {
        Self {
            url: "https://api.mainnet-beta.solana.com".to_string(),
            commitment: ConfirmationLevel::Confirmed,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WalletCfg {
    pub keypair: String,
}

impl Default for WalletCfg {
    fn default() -> Self {
        Self {
            keypair: "./wallet/keypair.json".to_string(),
        }
    }
}

/// Wire dialect of the routing service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingFlavor {
    /// `{success, response, error}` envelopes, base58 transaction payloads
    Enveloped,
    /// Bare documents, base64 transaction payloads, fractional price impact
    Bare,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingCfg {
    pub flavor: RoutingFlavor,
    pub base_url: String,
    /// Name of the env var holding the API key, sent as `x-api-key`
    pub api_key_env: Option<String>,
    pub timeout_ms: u64,
    pub slippage_mode: Option<String>,
}

impl Default for RoutingCfg {
    fn default() -> Self {
        Self {
            flavor: RoutingFlavor::Enveloped,
            base_url: "https://public-api-v2.bags.fm/api/v1".to_string(),
            api_key_env: Some("BAGS_API_KEY".to_string()),
            timeout_ms: 30_000,
            slippage_mode: Some("manual".to_string()),
        }
    }
}

/// Safety limits. Read-only once the pipeline starts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Ceiling on intent amount, in base units of the input asset
    pub max_notional: u64,
    pub max_slippage_bps: u16,
    pub max_price_impact_pct: f64,
    pub check_balance: bool,
    /// Lamports kept aside for fees when spending native SOL
    pub fee_reserve_lamports: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_notional: 1_000_000_000, // 1 SOL
            max_slippage_bps: 1_000,
            max_price_impact_pct: 1.0,
            check_balance: true,
            fee_reserve_lamports: 10_000_000, // 0.01 SOL
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradeCfg {
    pub default_slippage_bps: u16,
}

impl Default for TradeCfg {
    fn default() -> Self {
        Self {
            default_slippage_bps: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionCfg {
    pub confirmation_timeout_seconds: u64,
    pub poll_interval_ms: u64,
    pub broadcast_max_retries: u32,
    pub skip_preflight: bool,
    pub simulate_before_send: bool,
    pub quote_max_attempts: u32,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for ExecutionCfg {
    fn default() -> Self {
        Self {
            confirmation_timeout_seconds: 60,
            poll_interval_ms: 500,
            broadcast_max_retries: 3,
            skip_preflight: true,
            simulate_before_send: false,
            quote_max_attempts: 3,
            backoff_initial_ms: 500,
            backoff_max_ms: 4_000,
        }
    }
}

impl ExecutionCfg {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rpc: RpcCfg,
    pub wallet: WalletCfg,
    pub routing: RoutingCfg,
    pub limits: Limits,
    pub trade: TradeCfg,
    pub execution: ExecutionCfg,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, AppError> {
        toml::from_str(content)
            .map_err(|e| AppError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Load from an explicit path, or from `Config.toml` when it exists, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SOLANA_RPC") {
            self.rpc.url = url;
        }
        if let Some(path) = lookup("WALLET_PATH") {
            self.wallet.keypair = path;
        }
        if let Some(url) = lookup("ROUTING_API_URL") {
            self.routing.base_url = url;
        }
        if let Some(v) = parse_env(&lookup, "SWAP_MAX_NOTIONAL")? {
            self.limits.max_notional = v;
        }
        if let Some(v) = parse_env(&lookup, "DEFAULT_SLIPPAGE_BPS")? {
            self.trade.default_slippage_bps = v;
        }
        if let Some(v) = parse_env(&lookup, "MAX_SLIPPAGE_BPS")? {
            self.limits.max_slippage_bps = v;
        }
        if let Some(v) = parse_env(&lookup, "MAX_PRICE_IMPACT_PCT")? {
            self.limits.max_price_impact_pct = v;
        }
        if let Some(v) = parse_env(&lookup, "CONFIRMATION_TIMEOUT_SECONDS")? {
            self.execution.confirmation_timeout_seconds = v;
        }
        if let Some(v) = parse_env(&lookup, "BROADCAST_MAX_RETRIES")? {
            self.execution.broadcast_max_retries = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.rpc.url.trim().is_empty() {
            return Err(AppError::ConfigError("rpc.url is empty".to_string()));
        }
        if self.routing.base_url.trim().is_empty() {
            return Err(AppError::ConfigError("routing.base_url is empty".to_string()));
        }
        if !(self.limits.max_price_impact_pct > 0.0) {
            return Err(AppError::ConfigError(format!(
                "limits.max_price_impact_pct must be positive, got {}",
                self.limits.max_price_impact_pct
            )));
        }
        if self.limits.max_slippage_bps > 10_000 {
            return Err(AppError::ConfigError(format!(
                "limits.max_slippage_bps must be at most 10000, got {}",
                self.limits.max_slippage_bps
            )));
        }
        if self.trade.default_slippage_bps > self.limits.max_slippage_bps {
            return Err(AppError::ConfigError(format!(
                "trade.default_slippage_bps {} exceeds limits.max_slippage_bps {}",
                self.trade.default_slippage_bps, self.limits.max_slippage_bps
            )));
        }
        if self.execution.poll_interval_ms == 0 {
            return Err(AppError::ConfigError("execution.poll_interval_ms must be positive".to_string()));
        }
        if self.execution.confirmation_timeout_seconds == 0 {
            return Err(AppError::ConfigError(
                "execution.confirmation_timeout_seconds must be positive".to_string(),
            ));
        }
        if self.execution.quote_max_attempts == 0 {
            return Err(AppError::ConfigError("execution.quote_max_attempts must be positive".to_string()));
        }
        Ok(())
    }
}

fn parse_env<F, T>(lookup: &F, key: &str) -> Result<Option<T>, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AppError::ConfigError(format!("{}={:?}: {}", key, raw, e))),
    }
}
