use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use swapline::application::{Cli, CommandExecutor};

async fn run(cli: Cli, cancel: CancellationToken) -> Result<i32> {
    let config = cli.resolve_config().context("failed to resolve configuration")?;
    let code = CommandExecutor::execute(cli.command, config, cancel).await?;
    Ok(code)
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    // Logs go to stderr so stdout carries only the report.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are not failures
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupted, stopping after the current step");
            on_signal.cancel();
        }
    });

    let code = match run(cli, cancel).await {
        Ok(code) => code,
        Err(e) => {
            error!("❌ {:#}", e);
            1
        }
    };
    std::process::exit(code);
}
