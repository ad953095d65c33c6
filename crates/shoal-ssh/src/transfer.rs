//! SFTP transfer backend for `.up` / `.dl`
//!
//! One sftp subsystem channel per session, opened lazily when the first
//! transfer verb runs. Uploads land under the remote working directory,
//! downloads under the local one, both keeping the source file name.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use russh_sftp::client::SftpSession;
use tokio::io::AsyncWriteExt;
use tracing::info;

use shoal_core::error::TransferError;
use shoal_core::transfer::FileTransfer;

use crate::session::SshSession;

pub struct SftpTransfer {
    sftp: SftpSession,
}

impl SftpTransfer {
    /// Open the sftp subsystem on a fresh channel of `session`.
    pub async fn attach(session: &SshSession) -> Result<Self, TransferError> {
        let channel = session
            .open_channel()
            .await
            .map_err(|e| TransferError::Sftp(e.to_string()))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| TransferError::Sftp(e.to_string()))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| TransferError::Sftp(e.to_string()))?;
        Ok(Self { sftp })
    }
}

#[async_trait]
impl FileTransfer for SftpTransfer {
    async fn upload(&self, local: &Path) -> Result<(), TransferError> {
        let name = local
            .file_name()
            .ok_or_else(|| TransferError::Local(local.to_path_buf(), "not a file".to_string()))?
            .to_string_lossy()
            .to_string();

        let mut source = tokio::fs::File::open(local)
            .await
            .map_err(|e| TransferError::Local(local.to_path_buf(), e.to_string()))?;
        let mut target = self
            .sftp
            .create(&name)
            .await
            .map_err(|e| TransferError::Remote(name.clone(), e.to_string()))?;

        let written = tokio::io::copy(&mut source, &mut target)
            .await
            .map_err(|e| TransferError::Sftp(e.to_string()))?;
        target
            .shutdown()
            .await
            .map_err(|e| TransferError::Sftp(e.to_string()))?;

        info!("uploaded {} ({} bytes)", local.display(), written);
        Ok(())
    }

    async fn download(&self, remote: &str) -> Result<(), TransferError> {
        let name = remote_basename(remote);

        let mut source = self
            .sftp
            .open(remote)
            .await
            .map_err(|e| TransferError::Remote(remote.to_string(), e.to_string()))?;
        let mut target = tokio::fs::File::create(name)
            .await
            .map_err(|e| TransferError::Local(PathBuf::from(name), e.to_string()))?;

        let written = tokio::io::copy(&mut source, &mut target)
            .await
            .map_err(|e| TransferError::Sftp(e.to_string()))?;
        target
            .flush()
            .await
            .map_err(|e| TransferError::Local(PathBuf::from(name), e.to_string()))?;

        info!("downloaded {} ({} bytes)", remote, written);
        Ok(())
    }
}

/// Final path component of a remote path; downloads keep the file name.
fn remote_basename(remote: &str) -> &str {
    remote.rsplit('/').next().unwrap_or(remote)
}
