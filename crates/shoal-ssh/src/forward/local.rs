//! Local port forwarding
//!
//! Bind a local listener; every accepted connection gets its own
//! direct-tcpip channel to the remote target and a bidirectional pump.

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use shoal_core::config::ForwardSpec;
use shoal_core::error::ForwardError;

use crate::session::SshSession;

/// Serve one local-forward spec until the session closes. A bind failure
/// is logged once and disables only this spec.
pub async fn serve(session: Arc<SshSession>, spec: ForwardSpec) {
    let listener = match TcpListener::bind(&spec.local).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!("{}: local forward bind {} failed: {}", session.host(), spec.local, e);
            return;
        }
    };
    info!("{}: local forward {}", session.host(), spec);

    let cancel = session.cancel_token();
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => return,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                debug!("{}: accept on {}: {}", session.host(), spec.local, e);
                continue;
            }
        };

        let session = Arc::clone(&session);
        let spec = spec.clone();
        tokio::spawn(async move {
            if let Err(e) = bridge(session, spec, stream, peer).await {
                debug!("local forward bridge: {}", e);
            }
        });
    }
}

async fn bridge(
    session: Arc<SshSession>,
    spec: ForwardSpec,
    mut stream: TcpStream,
    peer: std::net::SocketAddr,
) -> Result<(), ForwardError> {
    let (host, port) = ForwardSpec::split_addr(&spec.remote)?;

    let channel = session
        .open_direct_tcpip(&host, port as u32, &peer.ip().to_string(), peer.port() as u32)
        .await
        .map_err(|e| ForwardError::ChannelOpen {
            target: spec.remote.clone(),
            message: e.to_string(),
        })?;

    let mut remote = channel.into_stream();
    let cancel = session.cancel_token();
    tokio::select! {
        _ = cancel.cancelled() => Ok(()),
        result = super::pump(&mut stream, &mut remote) => result,
    }
}
