//! Infrastructure layer - external services and the ledger

pub mod blockchain;
pub mod routing;
