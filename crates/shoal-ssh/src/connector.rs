//! Dialing and authentication
//!
//! One call per host: dial, try the configured auth methods in order, hand
//! back the transport handle. Channels the server opens toward us
//! (forwarded-tcpip for remote tunnels, x11) are routed out through an
//! event channel so the forward manager can bridge them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Msg};
use russh::{Channel, ChannelId};
use russh_keys::key::PublicKey;
use tokio::sync::mpsc;
use tracing::debug;

use shoal_core::config::{AuthMethod, HostConfig};
use shoal_core::error::ConnectError;
use shoal_core::HostId;

/// A channel the server opened toward us
pub enum IncomingChannel {
    /// Remote-forward traffic; `connected_port` selects the local target
    ForwardedTcpip {
        channel: Channel<Msg>,
        connected_address: String,
        connected_port: u32,
    },
    /// X11 client connecting back through the session
    X11 { channel: Channel<Msg> },
}

/// Dial `config.dial_addr()` and authenticate, bounded by `timeout`.
///
/// Returns the transport handle plus the receiver for server-opened
/// channels. The caller decides what failure means; nothing here aborts
/// sibling connection attempts.
pub async fn connect(
    host: &HostId,
    config: &HostConfig,
    timeout: Duration,
) -> Result<
    (
        client::Handle<ClientHandler>,
        mpsc::UnboundedReceiver<IncomingChannel>,
    ),
    ConnectError,
> {
    let methods = config.auth_methods();
    if methods.is_empty() {
        return Err(ConnectError::NoAuthMethod(host.to_string()));
    }

    let addr = config.dial_addr();
    tokio::time::timeout(timeout, dial_and_auth(host, config, &addr, methods))
        .await
        .map_err(|_| ConnectError::Timeout {
            host: host.to_string(),
            seconds: timeout.as_secs(),
        })?
}

async fn dial_and_auth(
    host: &HostId,
    config: &HostConfig,
    addr: &str,
    methods: Vec<AuthMethod>,
) -> Result<
    (
        client::Handle<ClientHandler>,
        mpsc::UnboundedReceiver<IncomingChannel>,
    ),
    ConnectError,
> {
    let ssh_config = Arc::new(client::Config::default());
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
    let handler = ClientHandler {
        host: host.clone(),
        incoming_tx,
    };

    debug!("Dialing {}", addr);
    let mut handle = client::connect(ssh_config, addr, handler)
        .await
        .map_err(|e| ConnectError::Dial {
            host: host.to_string(),
            message: e.to_string(),
        })?;

    for method in methods {
        let authenticated = match method {
            AuthMethod::Password(password) => handle
                .authenticate_password(&config.user, password)
                .await
                .map_err(|e| ConnectError::Transport(e.to_string()))?,
            AuthMethod::Key { path, passphrase } => {
                let key = russh_keys::load_secret_key(&path, passphrase.as_deref()).map_err(
                    |e| ConnectError::KeyLoad {
                        path: path.clone(),
                        message: e.to_string(),
                    },
                )?;
                handle
                    .authenticate_publickey(&config.user, Arc::new(key))
                    .await
                    .map_err(|e| ConnectError::Transport(e.to_string()))?
            }
        };

        if authenticated {
            debug!("Authenticated to {} as {}", addr, config.user);
            return Ok((handle, incoming_rx));
        }
    }

    Err(ConnectError::AuthenticationFailed(host.to_string()))
}

/// russh client handler: accepts host keys and routes server-opened channels
pub struct ClientHandler {
    host: HostId,
    incoming_tx: mpsc::UnboundedSender<IncomingChannel>,
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        // Host-key policy is left to the surrounding tooling; the engine
        // logs the fingerprint and proceeds.
        debug!(
            "{}: server host key {}",
            self.host,
            server_public_key.fingerprint()
        );
        Ok(true)
    }

    async fn server_channel_open_forwarded_tcpip(
        &mut self,
        channel: Channel<Msg>,
        connected_address: &str,
        connected_port: u32,
        originator_address: &str,
        originator_port: u32,
        _session: &mut client::Session,
    ) -> Result<(), Self::Error> {
        debug!(
            "{}: forwarded-tcpip {}:{} from {}:{}",
            self.host, connected_address, connected_port, originator_address, originator_port
        );
        let _ = self.incoming_tx.send(IncomingChannel::ForwardedTcpip {
            channel,
            connected_address: connected_address.to_string(),
            connected_port,
        });
        Ok(())
    }

    async fn server_channel_open_x11(
        &mut self,
        channel: Channel<Msg>,
        originator_address: &str,
        originator_port: u32,
        _session: &mut client::Session,
    ) -> Result<(), Self::Error> {
        debug!(
            "{}: x11 channel from {}:{}",
            self.host, originator_address, originator_port
        );
        let _ = self.incoming_tx.send(IncomingChannel::X11 { channel });
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut client::Session,
    ) -> Result<(), Self::Error> {
        debug!("{}: channel {:?} closed", self.host, channel);
        Ok(())
    }
}
