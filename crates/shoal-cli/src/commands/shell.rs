//! Shell command implementation
//!
//! One interactive session: connect, start tunnels, open the pty shell,
//! then hand the terminal over to the control channel until either side
//! ends. The terminal is in raw mode for the whole interactive span; the
//! guard restores it on every exit path.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use shoal_core::config::{self, ConfigFile, ForwardSpec};
use shoal_core::hostinfo::HostInfoCache;
use shoal_core::HostId;
use shoal_ssh::transcript::{transcript_path, TranscriptLog};
use shoal_ssh::{
    ControlChannel, ControlContext, Orchestrator, PortForwardManager, SftpTransfer, ShellInput,
};

use crate::output::{print_info, print_success, print_warning};

/// Per-invocation overrides layered on top of the host's config record
pub struct ShellOptions {
    /// Extra local forwards, `listen=target`
    pub locals: Vec<String>,
    /// Extra remote forwards, `listen=target`
    pub remotes: Vec<String>,
    /// SOCKS listen address override
    pub dynamic: Option<String>,
    /// Request X11 forwarding
    pub x11: bool,
    /// Write a transcript log
    pub log: bool,
}

/// Open an interactive shell on `host`.
pub async fn shell_command(config: ConfigFile, host: &str, opts: ShellOptions) -> Result<()> {
    let host_id = HostId::new(host);
    let mut host_config = config.host(&host_id)?.clone();

    for spec in &opts.locals {
        host_config.forwards.push(parse_forward("L", spec)?);
    }
    for spec in &opts.remotes {
        host_config.forwards.push(parse_forward("R", spec)?);
    }
    if let Some(addr) = &opts.dynamic {
        host_config.dynamic_forward = Some(addr.clone());
    }
    if opts.x11 {
        host_config.forward_x11 = true;
    }

    let settings = config.settings.clone();
    print_info(&format!("Connecting to {}...", host_id));

    let pool = Orchestrator::new(settings.clone())
        .connect_all(vec![(host_id.clone(), host_config.clone())])
        .await;
    let Some(session) = pool.get(&host_id) else {
        bail!("connection to {} failed", host_id);
    };

    let transcript = if opts.log || host_config.log {
        match &settings.log_dir {
            Some(dir) => {
                let log = Arc::new(
                    TranscriptLog::open(
                        transcript_path(dir, host_id.as_str()),
                        settings.log_timestamp,
                    )
                    .context("cannot open transcript log")?,
                );
                print_info(&format!("Transcript: {}", log.path().display()));
                session.set_transcript(Arc::clone(&log));
                Some(log)
            }
            None => {
                print_warning("Transcript requested but no log_dir is configured");
                None
            }
        }
    } else {
        None
    };

    PortForwardManager::start(&session).await;

    let (cols, rows) = crossterm::terminal::size().unwrap_or((80, 24));
    let term = std::env::var("TERM").unwrap_or_else(|_| "xterm-256color".to_string());
    let streams = session
        .open_shell(&term, cols as u32, rows as u32)
        .await
        .context("cannot open shell")?;

    let mut ctx = ControlContext::for_host(&host_id, &host_config);
    ctx.transcript = transcript;

    let cache = Arc::new(HostInfoCache::load(
        settings
            .hostinfo_path
            .clone()
            .unwrap_or_else(config::default_hostinfo_path),
    ));
    let updater_host = host_id.clone();
    ctx.hostinfo_updater = Some(Box::new(move |info| {
        if let Err(e) = cache.set(&updater_host, info) {
            warn!("hostinfo cache: {}", e);
        }
    }));

    match SftpTransfer::attach(&session).await {
        Ok(transfer) => ctx.transfer = Some(Arc::new(transfer)),
        Err(e) => debug!("sftp subsystem unavailable: {}", e),
    }

    spawn_resize_watcher(streams.input.clone(), session.cancel_token());

    print_info("Press the trigger key twice for the local command prompt (.? for help)");
    let guard = RawModeGuard::enable()?;
    let result = ControlChannel::new(settings.trigger_key)
        .run(
            streams,
            tokio::io::stdin(),
            tokio::io::stdout(),
            tokio::io::stdout(),
            ctx,
        )
        .await;
    drop(guard);

    session.close().await;
    result?;
    print_success("Session closed");
    Ok(())
}

/// Parse a `listen=target` override into a forward spec. For remote
/// forwards the listen side lives on the server, so the pair is swapped
/// into the spec's local/remote slots.
fn parse_forward(flag: &str, spec: &str) -> Result<ForwardSpec> {
    let (listen, target) = spec
        .split_once('=')
        .with_context(|| format!("{:?} is not listen=target", spec))?;
    let spec = match flag {
        "R" => ForwardSpec::new(flag, target, listen)?,
        _ => ForwardSpec::new(flag, listen, target)?,
    };
    Ok(spec)
}

/// Forward terminal resizes into the shell conduit.
fn spawn_resize_watcher(input: mpsc::Sender<ShellInput>, cancel: CancellationToken) {
    #[cfg(unix)]
    tokio::spawn(async move {
        let mut winch = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::window_change(),
        ) {
            Ok(signal) => signal,
            Err(e) => {
                warn!("cannot watch for terminal resizes: {}", e);
                return;
            }
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = winch.recv() => {
                    if changed.is_none() {
                        return;
                    }
                }
            }
            if let Ok((cols, rows)) = crossterm::terminal::size() {
                let resize = ShellInput::Resize {
                    cols: cols as u32,
                    rows: rows as u32,
                };
                if input.send(resize).await.is_err() {
                    return;
                }
            }
        }
    });

    #[cfg(not(unix))]
    {
        let _ = (input, cancel);
    }
}

/// Restores the terminal even when the session errors out.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        enable_raw_mode().context("cannot enter raw mode")?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_core::config::ForwardMode;

    #[test]
    fn test_parse_local_forward() {
        let spec = parse_forward("L", "127.0.0.1:8080=10.0.0.5:80").unwrap();
        assert_eq!(spec.mode, ForwardMode::Local);
        assert_eq!(spec.local, "127.0.0.1:8080");
        assert_eq!(spec.remote, "10.0.0.5:80");
    }

    #[test]
    fn test_parse_remote_forward_swaps_sides() {
        let spec = parse_forward("R", "0.0.0.0:9000=127.0.0.1:3000").unwrap();
        assert_eq!(spec.mode, ForwardMode::Remote);
        // listen side of an R spec is the remote slot
        assert_eq!(spec.remote, "0.0.0.0:9000");
        assert_eq!(spec.local, "127.0.0.1:3000");
    }

    #[test]
    fn test_parse_forward_rejects_missing_separator() {
        assert!(parse_forward("L", "127.0.0.1:8080").is_err());
    }
}
