//! shoal CLI
//!
//! Command implementations and output helpers for the `shoal` binary.

pub mod commands;
pub mod output;
