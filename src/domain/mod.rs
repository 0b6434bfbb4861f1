//! Domain layer - swap pipeline and safety policy

pub mod execution;
pub mod safety;
