//! File-transfer trait seam
//!
//! The control channel's `.up` / `.dl` verbs delegate here; the actual copy
//! implementation lives with the transport layer and rides the session's
//! existing connection.

use async_trait::async_trait;
use std::path::Path;

use crate::error::TransferError;

/// Copies files over an already-authenticated session
#[async_trait]
pub trait FileTransfer: Send + Sync {
    /// Upload a local file next to the remote user's home directory,
    /// keeping the file name.
    async fn upload(&self, local: &Path) -> Result<(), TransferError>;

    /// Download a remote file into the current local directory,
    /// keeping the file name.
    async fn download(&self, remote: &str) -> Result<(), TransferError>;
}
