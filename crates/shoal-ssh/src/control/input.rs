//! Input tap
//!
//! Sits between the local terminal and the remote input conduit. Keystrokes
//! pass straight through until the trigger key is pressed twice within the
//! debounce window; that opens the local `>> ` prompt. Trigger bytes are
//! always swallowed, a single press forwards nothing.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::warn;

use shoal_core::config::HostConfig;
use shoal_core::error::ControlError;
use shoal_core::transfer::FileTransfer;
use shoal_core::HostId;

use crate::control::command::{ControlCommand, HELP_TEXT};
use crate::control::output::{TagRequest, TAG_TIMEOUT};
use crate::session::{new_tag, ShellInput};
use crate::transcript::TranscriptLog;

/// Two trigger presses within this window open the prompt.
pub const TRIGGER_WINDOW: Duration = Duration::from_secs(1);

/// Everything the prompt verbs need to act on one host
pub struct ControlContext {
    pub host: HostId,
    pub hostinfo_script: String,
    pub process_info_script: Option<String>,
    pub web_port: Option<u16>,
    pub transfer: Option<Arc<dyn FileTransfer>>,
    pub hostinfo_updater: Option<Box<dyn Fn(&str) + Send + Sync>>,
    pub transcript: Option<Arc<TranscriptLog>>,
}

impl ControlContext {
    /// Context from a host's config record, with the built-in host-info
    /// script as fallback. Transfer backend and updater are attached by
    /// the caller.
    pub fn for_host(host: &HostId, config: &HostConfig) -> Self {
        Self {
            host: host.clone(),
            hostinfo_script: config
                .hostinfo_script
                .clone()
                .unwrap_or_else(|| HostConfig::default_hostinfo_script().to_string()),
            process_info_script: config.process_info_script.clone(),
            web_port: config.web_port,
            transfer: None,
            hostinfo_updater: None,
            transcript: None,
        }
    }
}

/// Run the tap until local input ends or the shell conduit closes.
pub(crate) async fn run<R, W>(
    local: R,
    echo: W,
    remote: mpsc::Sender<ShellInput>,
    tag_tx: mpsc::Sender<TagRequest>,
    trigger: u8,
    ctx: ControlContext,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut tap = Tap {
        reader: ByteReader::new(local),
        echo,
        remote,
        tag_tx,
        ctx,
    };

    let mut last_trigger: Option<Instant> = None;

    loop {
        let Some(byte) = tap.reader.next().await? else {
            return Ok(());
        };

        if byte == trigger {
            match last_trigger.take() {
                Some(at) if at.elapsed() <= TRIGGER_WINDOW => {
                    if !tap.prompt().await? {
                        return Ok(());
                    }
                }
                _ => last_trigger = Some(Instant::now()),
            }
            continue;
        }
        last_trigger = None;

        let mut chunk = vec![byte];
        chunk.extend_from_slice(tap.reader.buffered_until(trigger));
        if tap
            .remote
            .send(ShellInput::Data(Bytes::from(chunk)))
            .await
            .is_err()
        {
            return Ok(());
        }
    }
}

struct Tap<R, W> {
    reader: ByteReader<R>,
    echo: W,
    remote: mpsc::Sender<ShellInput>,
    tag_tx: mpsc::Sender<TagRequest>,
    ctx: ControlContext,
}

impl<R, W> Tap<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Read one line at the `>> ` prompt and dispatch it. Returns `false`
    /// on local end-of-input.
    async fn prompt(&mut self) -> io::Result<bool> {
        // Local command handling stays out of the transcript.
        let logging = self.ctx.transcript.as_ref().map(|log| {
            let was = log.is_enabled();
            log.set_enabled(false);
            was
        });

        let result = self.prompt_inner().await;

        if let (Some(log), Some(was)) = (&self.ctx.transcript, logging) {
            log.set_enabled(was);
        }
        result
    }

    async fn prompt_inner(&mut self) -> io::Result<bool> {
        self.echo.write_all(b"\r\n>> ").await?;
        self.echo.flush().await?;

        let mut line = String::new();
        loop {
            let Some(byte) = self.reader.next().await? else {
                return Ok(false);
            };
            match byte {
                b'\r' | b'\n' => break,
                // backspace / delete
                0x08 | 0x7f => {
                    if line.pop().is_some() {
                        self.echo.write_all(b"\x08 \x08").await?;
                        self.echo.flush().await?;
                    }
                }
                // Ctrl-C or Escape abandons the prompt
                0x03 | 0x1b => {
                    self.echo.write_all(b"\r\n").await?;
                    self.echo.flush().await?;
                    return Ok(true);
                }
                byte if (0x20..0x7f).contains(&byte) => {
                    line.push(byte as char);
                    self.echo.write_all(&[byte]).await?;
                    self.echo.flush().await?;
                }
                _ => {}
            }
        }
        self.echo.write_all(b"\r\n").await?;
        self.echo.flush().await?;

        self.dispatch(ControlCommand::parse(&line)).await?;
        Ok(true)
    }

    async fn dispatch(&mut self, command: ControlCommand) -> io::Result<()> {
        match command {
            ControlCommand::Help => {
                let help = HELP_TEXT.replace('\n', "\r\n");
                self.echo.write_all(help.as_bytes()).await?;
                self.echo.flush().await?;
            }
            ControlCommand::HostInfo => {
                let script = self.ctx.hostinfo_script.clone();
                match self.run_tagged(&script).await {
                    Ok(payload) => {
                        if let Some(update) = &self.ctx.hostinfo_updater {
                            update(&payload);
                        }
                        self.say(&payload).await?;
                    }
                    Err(e) => self.say(&e.to_string()).await?,
                }
            }
            ControlCommand::Ps { pid } => {
                if pid.is_empty() || !pid.chars().all(|c| c.is_ascii_digit()) {
                    let e = ControlError::InvalidArgument {
                        verb: ".ps".to_string(),
                        message: format!("{} is not a pid", pid),
                    };
                    self.say(&e.to_string()).await?;
                } else if let Some(script) = self.ctx.process_info_script.clone() {
                    let script = script.replace("{pid}", &pid);
                    match self.run_tagged(&script).await {
                        Ok(payload) => self.say(&payload).await?,
                        Err(e) => self.say(&e.to_string()).await?,
                    }
                } else {
                    self.say(&ControlError::MissingScript("process-info").to_string())
                        .await?;
                }
            }
            ControlCommand::Dash => self.open_web("/dashboard").await?,
            ControlCommand::Web => self.open_web("/").await?,
            ControlCommand::Exit => {
                self.inject("exit").await;
            }
            ControlCommand::Upload { local } => match self.ctx.transfer.clone() {
                Some(transfer) => match transfer.upload(Path::new(&local)).await {
                    Ok(()) => self.say(&format!("uploaded {}", local)).await?,
                    Err(e) => self.say(&e.to_string()).await?,
                },
                None => self.say("no transfer backend attached").await?,
            },
            ControlCommand::Download { remote } => match self.ctx.transfer.clone() {
                Some(transfer) => match transfer.download(&remote).await {
                    Ok(()) => self.say(&format!("downloaded {}", remote)).await?,
                    Err(e) => self.say(&e.to_string()).await?,
                },
                None => self.say("no transfer backend attached").await?,
            },
            ControlCommand::Literal(line) => {
                self.inject(&line).await;
            }
        }

        // Every verb ends with a carriage return to the remote so the
        // shell redraws its prompt after the local interlude.
        let _ = self
            .remote
            .send(ShellInput::Data(Bytes::from_static(b"\r")))
            .await;
        Ok(())
    }

    /// Hand a fresh tag to the output tap, inject the synthetic command,
    /// and wait for the correlated payload.
    async fn run_tagged(&mut self, script: &str) -> Result<String, ControlError> {
        let tag = new_tag();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tag_tx
            .try_send(TagRequest {
                tag: tag.clone(),
                reply: reply_tx,
            })
            .map_err(|_| ControlError::TagPending)?;

        // Leading space keeps the synthetic line out of shell history.
        let command = format!(
            " printf 'open:{tag}\\r\\n'; {script}; printf 'close:{tag}'\r",
            tag = tag,
            script = script
        );
        if self
            .remote
            .send(ShellInput::Data(Bytes::from(command)))
            .await
            .is_err()
        {
            return Err(ControlError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "shell conduit closed",
            )));
        }

        reply_rx
            .await
            .map_err(|_| ControlError::TagTimeout(TAG_TIMEOUT.as_secs()))
    }

    async fn open_web(&mut self, path: &str) -> io::Result<()> {
        let Some(port) = self.ctx.web_port else {
            return self.say("no web port configured for this host").await;
        };
        let url = web_url(port, path);
        self.say(&format!("opening {}", url)).await?;
        tokio::task::spawn_blocking(move || {
            if let Err(e) = open::that(&url) {
                warn!("cannot open {}: {}", url, e);
            }
        });
        Ok(())
    }

    async fn inject(&mut self, text: &str) {
        let data = Bytes::copy_from_slice(text.as_bytes());
        let _ = self.remote.send(ShellInput::Data(data)).await;
    }

    async fn say(&mut self, message: &str) -> io::Result<()> {
        self.echo.write_all(message.as_bytes()).await?;
        self.echo.write_all(b"\r\n").await?;
        self.echo.flush().await
    }
}

/// `.dash` / `.web` open the service on the local side of its tunnel,
/// never the remote address directly.
fn web_url(port: u16, path: &str) -> String {
    format!("http://127.0.0.1:{}{}", port, path)
}

/// Byte-at-a-time reader with a lookahead over its own buffer, so
/// passthrough can forward a whole buffered run in one conduit send.
struct ByteReader<R> {
    inner: R,
    buf: [u8; 1024],
    len: usize,
    pos: usize,
}

impl<R: AsyncRead + Unpin> ByteReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            buf: [0; 1024],
            len: 0,
            pos: 0,
        }
    }

    async fn next(&mut self) -> io::Result<Option<u8>> {
        if self.pos == self.len {
            self.len = self.inner.read(&mut self.buf).await?;
            self.pos = 0;
            if self.len == 0 {
                return Ok(None);
            }
        }
        let byte = self.buf[self.pos];
        self.pos += 1;
        Ok(Some(byte))
    }

    /// Already-buffered bytes up to (not including) the next `stop` byte.
    /// Never reads from the inner source.
    fn buffered_until(&mut self, stop: u8) -> &[u8] {
        let start = self.pos;
        while self.pos < self.len && self.buf[self.pos] != stop {
            self.pos += 1;
        }
        &self.buf[start..self.pos]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::testutil::SharedSink;
    use std::sync::Mutex;
    use tokio::io::duplex;

    const TRIGGER: u8 = 0x0b;

    fn test_ctx() -> ControlContext {
        let config = HostConfig::new("10.0.0.1", "root");
        ControlContext::for_host(&HostId::from("web1"), &config)
    }

    fn drain(rx: &mut mpsc::Receiver<ShellInput>) -> Vec<u8> {
        let mut sent = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let ShellInput::Data(data) = item {
                sent.extend_from_slice(&data);
            }
        }
        sent
    }

    #[tokio::test]
    async fn test_plain_bytes_pass_through() {
        let (mut writer, reader) = duplex(256);
        let echo = SharedSink::default();
        let (remote_tx, mut remote_rx) = mpsc::channel(64);
        let (tag_tx, _tag_rx) = mpsc::channel(1);

        let tap = tokio::spawn(run(reader, echo.clone(), remote_tx, tag_tx, TRIGGER, test_ctx()));

        writer.write_all(b"ls\r").await.unwrap();
        drop(writer);
        tap.await.unwrap().unwrap();

        assert_eq!(drain(&mut remote_rx), b"ls\r");
        assert!(echo.contents().is_empty());
    }

    #[tokio::test]
    async fn test_single_trigger_is_swallowed() {
        let (mut writer, reader) = duplex(256);
        let echo = SharedSink::default();
        let (remote_tx, mut remote_rx) = mpsc::channel(64);
        let (tag_tx, _tag_rx) = mpsc::channel(1);

        let tap = tokio::spawn(run(reader, echo.clone(), remote_tx, tag_tx, TRIGGER, test_ctx()));

        writer.write_all(&[TRIGGER, b'a']).await.unwrap();
        drop(writer);
        tap.await.unwrap().unwrap();

        assert_eq!(drain(&mut remote_rx), b"a");
        assert!(!echo.contains(b">> "));
    }

    #[tokio::test]
    async fn test_double_trigger_opens_prompt_and_injects_literal() {
        let (mut writer, reader) = duplex(256);
        let echo = SharedSink::default();
        let (remote_tx, mut remote_rx) = mpsc::channel(64);
        let (tag_tx, _tag_rx) = mpsc::channel(1);

        let tap = tokio::spawn(run(reader, echo.clone(), remote_tx, tag_tx, TRIGGER, test_ctx()));

        writer.write_all(&[TRIGGER, TRIGGER]).await.unwrap();
        writer.write_all(b"ls -la\r").await.unwrap();
        drop(writer);
        tap.await.unwrap().unwrap();

        assert!(echo.contains(b">> "));
        assert_eq!(drain(&mut remote_rx), b"ls -la\r");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_second_trigger_does_not_open_prompt() {
        let (mut writer, reader) = duplex(256);
        let echo = SharedSink::default();
        let (remote_tx, mut remote_rx) = mpsc::channel(64);
        let (tag_tx, _tag_rx) = mpsc::channel(1);

        let tap = tokio::spawn(run(reader, echo.clone(), remote_tx, tag_tx, TRIGGER, test_ctx()));

        writer.write_all(&[TRIGGER]).await.unwrap();
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(2)).await;

        writer.write_all(&[TRIGGER, b'x']).await.unwrap();
        drop(writer);
        tap.await.unwrap().unwrap();

        // both presses swallowed, no prompt
        assert_eq!(drain(&mut remote_rx), b"x");
        assert!(!echo.contains(b">> "));
    }

    #[tokio::test]
    async fn test_exit_verb_injects_exit() {
        let (mut writer, reader) = duplex(256);
        let echo = SharedSink::default();
        let (remote_tx, mut remote_rx) = mpsc::channel(64);
        let (tag_tx, _tag_rx) = mpsc::channel(1);

        let tap = tokio::spawn(run(reader, echo.clone(), remote_tx, tag_tx, TRIGGER, test_ctx()));

        writer.write_all(&[TRIGGER, TRIGGER]).await.unwrap();
        writer.write_all(b".exit\r").await.unwrap();
        drop(writer);
        tap.await.unwrap().unwrap();

        assert_eq!(drain(&mut remote_rx), b"exit\r");
    }

    #[tokio::test]
    async fn test_invalid_pid_is_rejected_locally() {
        let (mut writer, reader) = duplex(256);
        let echo = SharedSink::default();
        let (remote_tx, mut remote_rx) = mpsc::channel(64);
        let (tag_tx, _tag_rx) = mpsc::channel(1);

        let tap = tokio::spawn(run(reader, echo.clone(), remote_tx, tag_tx, TRIGGER, test_ctx()));

        writer.write_all(&[TRIGGER, TRIGGER]).await.unwrap();
        writer.write_all(b".ps abc\r").await.unwrap();
        drop(writer);
        tap.await.unwrap().unwrap();

        assert!(echo.contains(b"not a pid"));
        // nothing but the prompt redraw reaches the remote
        assert_eq!(drain(&mut remote_rx), b"\r");
    }

    #[tokio::test]
    async fn test_help_verb_redraws_remote_prompt() {
        let (mut writer, reader) = duplex(256);
        let echo = SharedSink::default();
        let (remote_tx, mut remote_rx) = mpsc::channel(64);
        let (tag_tx, _tag_rx) = mpsc::channel(1);

        let tap = tokio::spawn(run(reader, echo.clone(), remote_tx, tag_tx, TRIGGER, test_ctx()));

        writer.write_all(&[TRIGGER, TRIGGER]).await.unwrap();
        writer.write_all(b".?\r").await.unwrap();
        drop(writer);
        tap.await.unwrap().unwrap();

        assert!(echo.contains(b".hostinfo"));
        assert_eq!(drain(&mut remote_rx), b"\r");
    }

    #[test]
    fn test_web_url_targets_loopback() {
        assert_eq!(web_url(3000, "/dashboard"), "http://127.0.0.1:3000/dashboard");
        assert_eq!(web_url(8080, "/"), "http://127.0.0.1:8080/");
    }

    #[tokio::test]
    async fn test_hostinfo_round_trip_updates_cache() {
        let (mut writer, reader) = duplex(256);
        let echo = SharedSink::default();
        let (remote_tx, mut remote_rx) = mpsc::channel(64);
        let (tag_tx, mut tag_rx) = mpsc::channel::<TagRequest>(1);

        let seen = Arc::new(Mutex::new(None::<String>));
        let mut ctx = test_ctx();
        let seen_in_updater = Arc::clone(&seen);
        ctx.hostinfo_updater = Some(Box::new(move |info| {
            *seen_in_updater.lock().unwrap() = Some(info.to_string());
        }));

        // stand-in for the output tap
        let responder = tokio::spawn(async move {
            let request = tag_rx.recv().await.unwrap();
            let _ = request.reply.send("x86_64, 8C".to_string());
        });

        let tap = tokio::spawn(run(reader, echo.clone(), remote_tx, tag_tx, TRIGGER, ctx));

        writer.write_all(&[TRIGGER, TRIGGER]).await.unwrap();
        writer.write_all(b".hostinfo\r").await.unwrap();
        drop(writer);
        tap.await.unwrap().unwrap();
        responder.await.unwrap();

        let injected = drain(&mut remote_rx);
        assert!(injected.starts_with(b" printf 'open:"));
        assert!(injected.ends_with(b"\r"));
        assert!(echo.contains(b"x86_64, 8C"));
        assert_eq!(seen.lock().unwrap().as_deref(), Some("x86_64, 8C"));
    }

    #[tokio::test]
    async fn test_backspace_edits_prompt_line() {
        let (mut writer, reader) = duplex(256);
        let echo = SharedSink::default();
        let (remote_tx, mut remote_rx) = mpsc::channel(64);
        let (tag_tx, _tag_rx) = mpsc::channel(1);

        let tap = tokio::spawn(run(reader, echo.clone(), remote_tx, tag_tx, TRIGGER, test_ctx()));

        writer.write_all(&[TRIGGER, TRIGGER]).await.unwrap();
        writer.write_all(b"lz\x7fs\r").await.unwrap();
        drop(writer);
        tap.await.unwrap().unwrap();

        assert_eq!(drain(&mut remote_rx), b"ls\r");
    }
}
