//! Port-forwarding tunnels
//!
//! Local, remote, dynamic (SOCKS5) and X11 forwards, all owned by their
//! parent session: every listener and byte pump selects on the session's
//! cancellation token, so closing the session leaves no orphans behind.

mod dynamic;
mod local;
mod remote;
mod x11;

pub use dynamic::serve_socks;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use shoal_core::config::{ForwardMode, ForwardSpec};
use shoal_core::error::ForwardError;

use crate::connector::IncomingChannel;
use crate::session::SshSession;

/// Starts every tunnel a session's config asks for and dispatches
/// server-opened channels to their bridges.
pub struct PortForwardManager;

impl PortForwardManager {
    /// Start all configured tunnels for `session`. A spec that fails to
    /// start (bad bind, rejected remote listen) is logged and skipped;
    /// the others proceed.
    pub async fn start(session: &Arc<SshSession>) {
        let config = session.config().clone();
        let mut remote_targets: HashMap<u32, String> = HashMap::new();

        for spec in &config.forwards {
            match spec.mode {
                ForwardMode::Local => {
                    let task = tokio::spawn(local::serve(Arc::clone(session), spec.clone()));
                    session.register_task(task);
                }
                ForwardMode::Remote => match remote::request(session, spec).await {
                    Ok(listen_port) => {
                        remote_targets.insert(listen_port, spec.local.clone());
                    }
                    Err(e) => warn!("{}: {}", session.host(), e),
                },
                ForwardMode::Dynamic | ForwardMode::X11 => {
                    // Dynamic comes from its own config field, X11 from a
                    // flag; neither belongs in the L/R spec list.
                    warn!("{}: ignoring spec {} in forward list", session.host(), spec);
                }
            }
        }

        if let Some(addr) = &config.dynamic_forward {
            match ForwardSpec::dynamic(addr) {
                Ok(spec) => {
                    let task = tokio::spawn(dynamic::serve(Arc::clone(session), spec));
                    session.register_task(task);
                }
                Err(e) => warn!("{}: {}", session.host(), e),
            }
        }

        // Remote forwards and X11 both arrive as server-opened channels.
        if !remote_targets.is_empty() || config.forward_x11 {
            Self::spawn_dispatcher(session, remote_targets);
        }
    }

    /// Route server-opened channels: forwarded-tcpip to the local target
    /// registered for its listen port, x11 to the local display.
    fn spawn_dispatcher(session: &Arc<SshSession>, remote_targets: HashMap<u32, String>) {
        let Some(mut incoming) = session.take_incoming() else {
            warn!("{}: incoming channels already claimed", session.host());
            return;
        };

        let cancel = session.cancel_token();
        let host = session.host().clone();
        let task = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => return,
                    event = incoming.recv() => event,
                };

                match event {
                    Some(IncomingChannel::ForwardedTcpip {
                        channel,
                        connected_address,
                        connected_port,
                    }) => match remote_targets.get(&connected_port) {
                        Some(target) => {
                            let target = target.clone();
                            let cancel = cancel.clone();
                            tokio::spawn(async move {
                                if let Err(e) = remote::bridge(channel, &target, cancel).await {
                                    debug!("remote forward bridge: {}", e);
                                }
                            });
                        }
                        None => {
                            debug!(
                                "{}: forwarded-tcpip for unknown port {}:{}, dropping",
                                host, connected_address, connected_port
                            );
                        }
                    },
                    Some(IncomingChannel::X11 { channel }) => {
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            // An unreachable display drops only this request.
                            if let Err(e) = x11::bridge(channel, cancel).await {
                                debug!("x11 bridge: {}", e);
                            }
                        });
                    }
                    None => return,
                }
            }
        });
        session.register_task(task);
    }
}

/// Shorthand for the two-way pump both bridge flavors run
pub(crate) async fn pump<A, B>(a: &mut A, b: &mut B) -> Result<(), ForwardError>
where
    A: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    B: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    tokio::io::copy_bidirectional(a, b).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_pump_is_byte_exact_both_directions() {
        let (mut client, mut side_a) = duplex(64);
        let (mut side_b, mut server) = duplex(64);

        let task = tokio::spawn(async move { pump(&mut side_a, &mut side_b).await });

        client.write_all(b"GET /index").await.unwrap();
        let mut request = [0u8; 10];
        server.read_exact(&mut request).await.unwrap();
        assert_eq!(&request, b"GET /index");

        server.write_all(b"200 ok").await.unwrap();
        let mut response = [0u8; 6];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(&response, b"200 ok");

        drop(client);
        drop(server);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_pump_preserves_chunk_order() {
        let (mut client, mut side_a) = duplex(8);
        let (mut side_b, mut server) = duplex(8);

        let task = tokio::spawn(async move { pump(&mut side_a, &mut side_b).await });

        // chunks larger than the conduit, written back to back
        client.write_all(b"alpha-beta-").await.unwrap();
        client.write_all(b"gamma-delta").await.unwrap();
        drop(client);

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"alpha-beta-gamma-delta");

        drop(server);
        task.await.unwrap().unwrap();
    }
}
