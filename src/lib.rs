//! Swapline - guarded single-intent swap execution for Solana
//! Quote, validate, build, sign, broadcast and confirm one swap at a time

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

// Re-export main types for convenience
pub use domain::execution::{ExecutionSettings, SwapOrchestrator};
pub use domain::safety::SafetyGuard;
pub use shared::config::Config;
pub use shared::errors::{AppError, PipelineError};
pub use shared::types::{ExecutionResult, ExecutionStatus, SwapIntent};
