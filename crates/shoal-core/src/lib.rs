//! Core abstractions for shoal
//!
//! This crate holds everything the transport layer and the CLI share:
//! configuration records, error types, the host-info cache, and the trait
//! seams (file transfer) that keep the session engine decoupled from the
//! copy commands built on top of it.

pub mod config;
pub mod error;
pub mod hostinfo;
pub mod transfer;
pub mod types;

pub use error::ShoalError;
pub use types::HostId;
