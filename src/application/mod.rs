//! Application layer - use cases and services

pub mod commands;
pub mod report;
pub mod services;

pub use commands::{Cli, CommandExecutor, Commands};
pub use report::{StatusReport, SwapReport};
pub use services::{SwapRequest, SwapService};
