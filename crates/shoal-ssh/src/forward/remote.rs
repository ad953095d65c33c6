//! Remote port forwarding
//!
//! The listen side lives on the server: one `tcpip-forward` request per
//! spec, then every forwarded-tcpip channel the server opens is bridged
//! to the spec's local target.

use std::sync::Arc;

use russh::client::Msg;
use russh::Channel;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

use shoal_core::config::ForwardSpec;
use shoal_core::error::ForwardError;

use crate::session::SshSession;

/// Ask the server to listen at `spec.remote`. Returns the port the server
/// bound, which keys the dispatch of its forwarded-tcpip channels; for a
/// requested port of 0 that is the server's pick, not the spec's.
pub async fn request(session: &Arc<SshSession>, spec: &ForwardSpec) -> Result<u32, ForwardError> {
    let (host, port) = ForwardSpec::split_addr(&spec.remote)?;

    let bound = session
        .request_remote_listen(&host, port as u32)
        .await
        .map_err(|_| ForwardError::RemoteRejected {
            addr: spec.remote.clone(),
        })?;

    info!("{}: remote forward {} (listening on {})", session.host(), spec, bound);
    Ok(bound)
}

/// Bridge one forwarded-tcpip channel to the local target.
pub async fn bridge(
    channel: Channel<Msg>,
    local_target: &str,
    cancel: CancellationToken,
) -> Result<(), ForwardError> {
    let mut local = TcpStream::connect(local_target)
        .await
        .map_err(ForwardError::Io)?;
    let mut remote = channel.into_stream();

    tokio::select! {
        _ = cancel.cancelled() => Ok(()),
        result = super::pump(&mut local, &mut remote) => result,
    }
}
