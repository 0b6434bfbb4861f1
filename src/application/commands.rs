//! CLI commands and handlers
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::services::{SwapRequest, SwapService};
use crate::shared::config::Config;
use crate::shared::errors::AppError;
use crate::shared::utils::KNOWN_TOKENS;

#[derive(Parser, Debug)]
#[command(name = "swapline")]
#[command(version, about = "Guarded token swaps on Solana through a routing service")]
pub struct Cli {
    /// Path to config file (defaults to ./Config.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// RPC endpoint URL (overrides config and SOLANA_RPC)
    #[arg(long, global = true)]
    pub rpc_url: Option<String>,

    /// Path to keypair file (overrides config and WALLET_PATH)
    #[arg(long, global = true)]
    pub keypair: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Quote a swap, and execute it with --execute
    Swap {
        /// Input token symbol or mint address
        input: String,

        /// Output token symbol or mint address
        output: String,

        /// Amount of the input token in display units (base units with --raw),
        /// or `all` to spend the whole wallet balance (needs --execute)
        amount: String,

        /// Slippage tolerance in basis points
        slippage_bps: Option<u16>,

        /// Sign and broadcast; without it this is a dry run
        #[arg(long)]
        execute: bool,

        /// Treat AMOUNT as base units
        #[arg(long)]
        raw: bool,

        /// Decimals of the input token when it is not a known symbol
        #[arg(long)]
        input_decimals: Option<u8>,

        /// Print the report as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Look up a transaction signature on the ledger
    Status {
        signature: String,

        /// Print the report as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// List known token symbols
    Tokens,
}

impl Cli {
    /// File, then environment, then command-line flags.
    pub fn resolve_config(&self) -> Result<Config, AppError> {
        let config = Config::load(self.config.as_deref())?;
        self.resolve_config_from(config, |key| std::env::var(key).ok())
    }

    /// Layer environment (through `lookup`) and flags over a loaded config.
    pub fn resolve_config_from<F>(&self, mut config: Config, lookup: F) -> Result<Config, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        config.apply_env(lookup)?;
        if let Some(rpc_url) = &self.rpc_url {
            config.rpc.url = rpc_url.clone();
        }
        if let Some(keypair) = &self.keypair {
            config.wallet.keypair = keypair.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

pub struct CommandExecutor;

impl CommandExecutor {
    /// Execute the selected command, returning the process exit code
    pub async fn execute(
        command: Commands,
        config: Config,
        cancel: CancellationToken,
    ) -> Result<i32, AppError> {
        match command {
            Commands::Swap {
                input,
                output,
                amount,
                slippage_bps,
                execute,
                raw,
                input_decimals,
                json,
            } => {
                let request = SwapRequest {
                    input,
                    output,
                    amount,
                    slippage_bps,
                    raw,
                    input_decimals,
                };
                Self::execute_swap_command(request, execute, json, config, cancel).await
            }
            Commands::Status { signature, json } => {
                Self::execute_status_command(&signature, json, config).await
            }
            Commands::Tokens => {
                Self::execute_tokens_command();
                Ok(0)
            }
        }
    }

    async fn execute_swap_command(
        request: SwapRequest,
        execute: bool,
        json: bool,
        config: Config,
        cancel: CancellationToken,
    ) -> Result<i32, AppError> {
        let service = SwapService::new(config);
        let swap = service.resolve(&request, execute).await?;
        info!(
            "💱 {} {} -> {} ({} base units, {} bps)",
            request.amount,
            swap.input.label(),
            swap.output.label(),
            swap.intent.amount(),
            swap.intent.max_slippage_bps()
        );

        let report = if execute {
            service.execute(&swap, &cancel).await?
        } else {
            service.dry_run(&swap).await?
        };

        if json {
            let rendered = report
                .to_json()
                .map_err(|e| AppError::InvalidArgument(format!("Failed to render report: {}", e)))?;
            println!("{}", rendered);
        } else {
            println!("{}", report.summary());
        }
        if !report.success {
            warn!("Swap finished as {}", report.status);
        }
        Ok(report.exit_code())
    }

    async fn execute_status_command(signature: &str, json: bool, config: Config) -> Result<i32, AppError> {
        let report = SwapService::new(config).status(signature).await?;
        if json {
            let rendered = report
                .to_json()
                .map_err(|e| AppError::InvalidArgument(format!("Failed to render report: {}", e)))?;
            println!("{}", rendered);
        } else {
            println!("{}", report.summary());
        }
        Ok(report.exit_code())
    }

    fn execute_tokens_command() {
        println!("{:<6} {:<46} {}", "SYMBOL", "MINT", "DECIMALS");
        for (symbol, mint, decimals) in KNOWN_TOKENS {
            println!("{:<6} {:<46} {}", symbol, mint, decimals);
        }
    }
}
