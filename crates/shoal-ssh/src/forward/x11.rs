//! X11 channel bridging
//!
//! Each x11 channel the server opens is connected to the local display
//! socket with a bidirectional pump. An unreachable display drops only
//! that one request.

use russh::client::Msg;
use russh::Channel;
use tokio::net::{TcpStream, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use shoal_core::error::ForwardError;

/// Bridge one x11 channel to the socket `$DISPLAY` points at.
pub async fn bridge(channel: Channel<Msg>, cancel: CancellationToken) -> Result<(), ForwardError> {
    let display = std::env::var("DISPLAY").unwrap_or_else(|_| ":0".to_string());
    let mut remote = channel.into_stream();

    match display_target(&display) {
        DisplayTarget::Unix(path) => {
            let mut local = UnixStream::connect(&path).await.map_err(|e| {
                debug!("cannot reach display {}: {}", path, e);
                ForwardError::Io(e)
            })?;
            tokio::select! {
                _ = cancel.cancelled() => Ok(()),
                result = super::pump(&mut local, &mut remote) => result,
            }
        }
        DisplayTarget::Tcp(addr) => {
            let mut local = TcpStream::connect(&addr).await.map_err(|e| {
                debug!("cannot reach display {}: {}", addr, e);
                ForwardError::Io(e)
            })?;
            tokio::select! {
                _ = cancel.cancelled() => Ok(()),
                result = super::pump(&mut local, &mut remote) => result,
            }
        }
    }
}

enum DisplayTarget {
    Unix(String),
    Tcp(String),
}

/// Resolve a DISPLAY value to the socket it names: `:N[.S]` (and
/// `unix:N[.S]`) map to the abstract socket dir, `host:N` to TCP port
/// 6000+N.
fn display_target(display: &str) -> DisplayTarget {
    let (host, rest) = match display.split_once(':') {
        Some(pair) => pair,
        None => ("", display),
    };
    let number: u16 = rest
        .split('.')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);

    if host.is_empty() || host == "unix" {
        DisplayTarget::Unix(format!("/tmp/.X11-unix/X{}", number))
    } else {
        DisplayTarget::Tcp(format!("{}:{}", host, 6000 + number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_display_is_unix_socket() {
        match display_target(":0") {
            DisplayTarget::Unix(path) => assert_eq!(path, "/tmp/.X11-unix/X0"),
            DisplayTarget::Tcp(_) => panic!("expected unix socket"),
        }
        match display_target("unix:10.0") {
            DisplayTarget::Unix(path) => assert_eq!(path, "/tmp/.X11-unix/X10"),
            DisplayTarget::Tcp(_) => panic!("expected unix socket"),
        }
    }

    #[test]
    fn test_remote_display_is_tcp() {
        match display_target("xhost:1") {
            DisplayTarget::Tcp(addr) => assert_eq!(addr, "xhost:6001"),
            DisplayTarget::Unix(_) => panic!("expected tcp"),
        }
    }
}
