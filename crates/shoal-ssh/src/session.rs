//! One authenticated session to one host
//!
//! `SshSession` wraps the transport handle together with everything whose
//! lifetime is tied to it: the cancellation token that tears down tunnels
//! and pumps, the transcript log, and the receiver for server-opened
//! channels. The interactive shell is exposed as a pair of byte conduits so
//! the control-channel taps never touch the channel object directly.

use std::sync::Mutex;

use bytes::Bytes;
use rand::distributions::Alphanumeric;
use rand::Rng;
use russh::client::{Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use shoal_core::config::HostConfig;
use shoal_core::error::ConnectError;
use shoal_core::HostId;

use crate::connector::{ClientHandler, IncomingChannel};
use crate::transcript::TranscriptLog;

/// Capacity of the shell byte conduits. Small: the conduits exist for
/// decoupling, not buffering, and backpressure should reach the reader.
const SHELL_CONDUIT_CAPACITY: usize = 64;

/// Input events flowing from the local side into the remote pty
#[derive(Debug)]
pub enum ShellInput {
    /// Raw bytes for the remote input stream
    Data(Bytes),
    /// Terminal was resized
    Resize { cols: u32, rows: u32 },
}

/// The two conduits of an open interactive shell
pub struct ShellStreams {
    /// Local keystrokes toward the remote (input tap writes here)
    pub input: mpsc::Sender<ShellInput>,
    /// Remote output toward the terminal (output tap reads here)
    pub output: mpsc::Receiver<Bytes>,
}

/// One authenticated connection plus everything it owns
pub struct SshSession {
    host: HostId,
    config: HostConfig,
    // Not Clone, and some requests need exclusive access; every caller
    // goes through the locking helpers below.
    handle: AsyncMutex<Handle<ClientHandler>>,
    cancel: CancellationToken,
    incoming: Mutex<Option<mpsc::UnboundedReceiver<IncomingChannel>>>,
    transcript: Mutex<Option<Arc<TranscriptLog>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SshSession {
    /// Wrap an authenticated handle
    pub fn new(
        host: HostId,
        config: HostConfig,
        handle: Handle<ClientHandler>,
        incoming: mpsc::UnboundedReceiver<IncomingChannel>,
    ) -> Self {
        Self {
            host,
            config,
            handle: AsyncMutex::new(handle),
            cancel: CancellationToken::new(),
            incoming: Mutex::new(Some(incoming)),
            transcript: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Host this session belongs to
    pub fn host(&self) -> &HostId {
        &self.host
    }

    /// The host's configuration record
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Token cancelled when the session closes; tunnels and pumps select on it
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether `close()` has run (or keepalive exhaustion closed us)
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Open a direct-tcpip channel toward `target_host:target_port`.
    pub async fn open_direct_tcpip(
        &self,
        target_host: &str,
        target_port: u32,
        originator: &str,
        originator_port: u32,
    ) -> Result<Channel<Msg>, ConnectError> {
        if self.is_closed() {
            return Err(ConnectError::SessionClosed);
        }
        self.handle
            .lock()
            .await
            .channel_open_direct_tcpip(target_host, target_port, originator, originator_port)
            .await
            .map_err(|e| ConnectError::Transport(e.to_string()))
    }

    /// Ask the server to listen at `host:port` for a remote forward.
    /// Returns the port the server actually bound (relevant when `port`
    /// is 0 and the server picks one).
    pub async fn request_remote_listen(&self, host: &str, port: u32) -> Result<u32, ConnectError> {
        if self.is_closed() {
            return Err(ConnectError::SessionClosed);
        }
        self.handle
            .lock()
            .await
            .tcpip_forward(host, port)
            .await
            .map_err(|e| ConnectError::Transport(e.to_string()))
    }

    /// Take the receiver for server-opened channels; the forward manager
    /// calls this once.
    pub fn take_incoming(&self) -> Option<mpsc::UnboundedReceiver<IncomingChannel>> {
        self.incoming.lock().expect("incoming lock poisoned").take()
    }

    /// Attach a transcript log
    pub fn set_transcript(&self, log: Arc<TranscriptLog>) {
        *self.transcript.lock().expect("transcript lock poisoned") = Some(log);
    }

    /// The attached transcript log, if any
    pub fn transcript(&self) -> Option<Arc<TranscriptLog>> {
        self.transcript
            .lock()
            .expect("transcript lock poisoned")
            .clone()
    }

    /// Keep a task's handle so `close()` can abort it
    pub fn register_task(&self, task: JoinHandle<()>) {
        self.tasks.lock().expect("tasks lock poisoned").push(task);
    }

    /// Open the interactive shell: pty + shell request, plus the x11-req
    /// when the host asks for display forwarding. The returned conduits are
    /// decoupled from the channel by a pump task owned by this session.
    pub async fn open_shell(
        &self,
        term: &str,
        cols: u32,
        rows: u32,
    ) -> Result<ShellStreams, ConnectError> {
        let channel = self.open_channel().await?;

        channel
            .request_pty(true, term, cols, rows, 0, 0, &[])
            .await
            .map_err(|e| ConnectError::Transport(e.to_string()))?;

        if self.config.forward_x11 {
            let cookie = fake_x11_cookie();
            channel
                .request_x11(true, false, "MIT-MAGIC-COOKIE-1", cookie.as_str(), 0)
                .await
                .map_err(|e| ConnectError::Transport(e.to_string()))?;
        }

        channel
            .request_shell(true)
            .await
            .map_err(|e| ConnectError::Transport(e.to_string()))?;

        let (input_tx, input_rx) = mpsc::channel(SHELL_CONDUIT_CAPACITY);
        let (output_tx, output_rx) = mpsc::channel(SHELL_CONDUIT_CAPACITY);

        let cancel = self.cancel.clone();
        let host = self.host.clone();
        self.register_task(tokio::spawn(async move {
            if let Err(e) = pump_shell(channel, input_rx, output_tx, cancel).await {
                debug!("{}: shell pump ended: {}", host, e);
            }
        }));

        Ok(ShellStreams {
            input: input_tx,
            output: output_rx,
        })
    }

    /// Run one command, streaming its output (stdout and stderr interleaved
    /// in arrival order) into `output`. Optional `stdin` feeds the remote
    /// process; closing it sends EOF. Returns the exit status.
    pub async fn exec_streamed(
        &self,
        command: &str,
        output: mpsc::Sender<Bytes>,
        stdin: Option<mpsc::Receiver<Bytes>>,
    ) -> Result<u32, ConnectError> {
        let mut channel = self.open_channel().await?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| ConnectError::Transport(e.to_string()))?;

        let mut stdin = stdin;
        let mut exit_status = 0u32;

        loop {
            enum Ev {
                Msg(Option<ChannelMsg>),
                Stdin(Option<Bytes>),
                Cancelled,
            }

            let ev = tokio::select! {
                msg = channel.wait() => Ev::Msg(msg),
                data = recv_opt(&mut stdin) => Ev::Stdin(data),
                _ = self.cancel.cancelled() => Ev::Cancelled,
            };

            match ev {
                Ev::Msg(Some(ChannelMsg::Data { data })) => {
                    if output.send(Bytes::copy_from_slice(&data)).await.is_err() {
                        break;
                    }
                }
                Ev::Msg(Some(ChannelMsg::ExtendedData { data, .. })) => {
                    if output.send(Bytes::copy_from_slice(&data)).await.is_err() {
                        break;
                    }
                }
                Ev::Msg(Some(ChannelMsg::ExitStatus { exit_status: s })) => exit_status = s,
                // Exit status can still arrive after EOF; only Close or a
                // dropped channel ends the stream.
                Ev::Msg(Some(ChannelMsg::Eof)) => {}
                Ev::Msg(Some(ChannelMsg::Close)) | Ev::Msg(None) => break,
                Ev::Msg(Some(_)) => {}
                Ev::Stdin(Some(data)) => {
                    channel
                        .data(&data[..])
                        .await
                        .map_err(|e| ConnectError::Transport(e.to_string()))?;
                }
                Ev::Stdin(None) => {
                    stdin = None;
                    let _ = channel.eof().await;
                }
                Ev::Cancelled => return Err(ConnectError::SessionClosed),
            }
        }

        Ok(exit_status)
    }

    /// Liveness probe: open and immediately close a throwaway channel.
    /// The transport failing to multiplex a new channel is the signal the
    /// keepalive monitor counts.
    pub async fn probe(&self) -> bool {
        match self.open_channel().await {
            Ok(channel) => {
                let _ = channel.close().await;
                true
            }
            Err(_) => false,
        }
    }

    /// Close the session: cancel every owned tunnel, pump, and monitor,
    /// then disconnect the transport. Blocked reads see end-of-stream.
    pub async fn close(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        debug!("{}: closing session", self.host);
        self.cancel.cancel();

        if let Err(e) = self
            .handle
            .lock()
            .await
            .disconnect(Disconnect::ByApplication, "closing", "en")
            .await
        {
            debug!("{}: disconnect: {}", self.host, e);
        }

        let tasks = std::mem::take(&mut *self.tasks.lock().expect("tasks lock poisoned"));
        for task in tasks {
            task.abort();
        }
    }

    /// Open a plain session channel on the transport.
    pub(crate) async fn open_channel(&self) -> Result<Channel<Msg>, ConnectError> {
        if self.is_closed() {
            return Err(ConnectError::SessionClosed);
        }
        self.handle
            .lock()
            .await
            .channel_open_session()
            .await
            .map_err(|e| ConnectError::Transport(e.to_string()))
    }
}

/// Bridge the shell channel to its two conduits until either side ends.
async fn pump_shell(
    mut channel: Channel<Msg>,
    mut input: mpsc::Receiver<ShellInput>,
    output: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
) -> Result<(), ConnectError> {
    loop {
        enum Ev {
            Msg(Option<ChannelMsg>),
            Input(Option<ShellInput>),
            Cancelled,
        }

        let ev = tokio::select! {
            msg = channel.wait() => Ev::Msg(msg),
            item = input.recv() => Ev::Input(item),
            _ = cancel.cancelled() => Ev::Cancelled,
        };

        match ev {
            Ev::Msg(Some(ChannelMsg::Data { data }))
            | Ev::Msg(Some(ChannelMsg::ExtendedData { data, .. })) => {
                if output.send(Bytes::copy_from_slice(&data)).await.is_err() {
                    let _ = channel.close().await;
                    return Ok(());
                }
            }
            Ev::Msg(Some(ChannelMsg::Eof))
            | Ev::Msg(Some(ChannelMsg::Close))
            | Ev::Msg(None) => return Ok(()),
            Ev::Msg(Some(other)) => {
                debug!("shell channel message ignored: {:?}", other);
            }
            Ev::Input(Some(ShellInput::Data(data))) => {
                channel
                    .data(&data[..])
                    .await
                    .map_err(|e| ConnectError::Transport(e.to_string()))?;
            }
            Ev::Input(Some(ShellInput::Resize { cols, rows })) => {
                if let Err(e) = channel.window_change(cols, rows, 0, 0).await {
                    warn!("window change failed: {}", e);
                }
            }
            Ev::Input(None) => {
                let _ = channel.eof().await;
                return Ok(());
            }
            Ev::Cancelled => {
                let _ = channel.close().await;
                return Ok(());
            }
        }
    }
}

/// `recv` on an optional stdin receiver; pends forever when there is none,
/// so the select arm simply never fires.
async fn recv_opt(stdin: &mut Option<mpsc::Receiver<Bytes>>) -> Option<Bytes> {
    match stdin {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Random cookie for the x11-req; the real cookie is substituted by the
/// X server side, this one only has to be well-formed hex.
fn fake_x11_cookie() -> String {
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| {
            let v: u8 = rng.gen_range(0..16);
            char::from_digit(v as u32, 16).unwrap()
        })
        .collect()
}

/// Fresh correlation tag, unique enough among concurrently pending tags.
pub fn new_tag() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tag_shape() {
        let tag = new_tag();
        assert_eq!(tag.len(), 12);
        assert!(tag.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_tags_are_unique() {
        let a = new_tag();
        let b = new_tag();
        assert_ne!(a, b);
    }

    #[test]
    fn test_x11_cookie_is_hex() {
        let cookie = fake_x11_cookie();
        assert_eq!(cookie.len(), 32);
        assert!(cookie.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
