//! Dynamic (SOCKS5) forwarding
//!
//! A local SOCKS proxy whose destination is resolved per connection from
//! the handshake instead of being fixed at startup. Only CONNECT is
//! supported; that is what every client uses through an SSH tunnel.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use shoal_core::config::ForwardSpec;
use shoal_core::error::ForwardError;

use crate::session::SshSession;

const SOCKS_VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;
const REPLY_SUCCESS: u8 = 0x00;
const REPLY_CMD_NOT_SUPPORTED: u8 = 0x07;

/// Serve one SOCKS listener until the session closes.
pub async fn serve(session: Arc<SshSession>, spec: ForwardSpec) {
    let listener = match TcpListener::bind(&spec.local).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!("{}: socks bind {} failed: {}", session.host(), spec.local, e);
            return;
        }
    };
    info!("{}: dynamic forward {}", session.host(), spec.local);

    let cancel = session.cancel_token();
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => return,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                debug!("{}: socks accept: {}", session.host(), e);
                continue;
            }
        };

        let session = Arc::clone(&session);
        tokio::spawn(async move {
            if let Err(e) = serve_socks(session, stream, peer).await {
                debug!("socks connection: {}", e);
            }
        });
    }
}

/// Handshake one client and pump its bytes through a direct-tcpip channel
/// to the destination it asked for.
pub async fn serve_socks(
    session: Arc<SshSession>,
    mut stream: TcpStream,
    peer: std::net::SocketAddr,
) -> Result<(), ForwardError> {
    let (host, port) = handshake(&mut stream).await?;

    let channel = session
        .open_direct_tcpip(&host, port as u32, &peer.ip().to_string(), peer.port() as u32)
        .await
        .map_err(|e| ForwardError::ChannelOpen {
            target: format!("{}:{}", host, port),
            message: e.to_string(),
        })?;

    let mut remote = channel.into_stream();
    let cancel = session.cancel_token();
    tokio::select! {
        _ = cancel.cancelled() => Ok(()),
        result = super::pump(&mut stream, &mut remote) => result,
    }
}

/// Run the SOCKS5 greeting and CONNECT request, returning the destination.
async fn handshake<S>(stream: &mut S) -> Result<(String, u16), ForwardError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Greeting: VER NMETHODS METHODS...
    let mut head = [0u8; 2];
    stream.read_exact(&mut head).await?;
    if head[0] != SOCKS_VERSION {
        return Err(ForwardError::Socks(format!(
            "unsupported version {}",
            head[0]
        )));
    }
    let mut methods = vec![0u8; head[1] as usize];
    stream.read_exact(&mut methods).await?;
    stream.write_all(&[SOCKS_VERSION, METHOD_NO_AUTH]).await?;

    // Request: VER CMD RSV ATYP DST.ADDR DST.PORT
    let mut request = [0u8; 4];
    stream.read_exact(&mut request).await?;
    if request[1] != CMD_CONNECT {
        stream
            .write_all(&[
                SOCKS_VERSION,
                REPLY_CMD_NOT_SUPPORTED,
                0,
                ATYP_IPV4,
                0,
                0,
                0,
                0,
                0,
                0,
            ])
            .await?;
        return Err(ForwardError::Socks(format!(
            "unsupported command {}",
            request[1]
        )));
    }

    let host = match request[3] {
        ATYP_IPV4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            std::net::Ipv4Addr::from(addr).to_string()
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            let mut name = vec![0u8; len[0] as usize];
            stream.read_exact(&mut name).await?;
            String::from_utf8(name)
                .map_err(|_| ForwardError::Socks("non-utf8 domain name".into()))?
        }
        ATYP_IPV6 => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await?;
            std::net::Ipv6Addr::from(addr).to_string()
        }
        other => {
            return Err(ForwardError::Socks(format!(
                "unsupported address type {}",
                other
            )));
        }
    };

    let mut port = [0u8; 2];
    stream.read_exact(&mut port).await?;
    let port = u16::from_be_bytes(port);

    // Bound address in the reply is conventionally zeroed for tunnels.
    stream
        .write_all(&[SOCKS_VERSION, REPLY_SUCCESS, 0, ATYP_IPV4, 0, 0, 0, 0, 0, 0])
        .await?;

    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_connect_ipv4() {
        let (mut client, mut server) = duplex(256);

        let task = tokio::spawn(async move { handshake(&mut server).await });

        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00]);

        // CONNECT 10.0.0.9:8080
        client
            .write_all(&[0x05, 0x01, 0x00, 0x01, 10, 0, 0, 9, 0x1f, 0x90])
            .await
            .unwrap();
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[1], REPLY_SUCCESS);

        let (host, port) = task.await.unwrap().unwrap();
        assert_eq!(host, "10.0.0.9");
        assert_eq!(port, 8080);
    }

    #[tokio::test]
    async fn test_connect_domain() {
        let (mut client, mut server) = duplex(256);

        let task = tokio::spawn(async move { handshake(&mut server).await });

        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();

        let mut request = vec![0x05, 0x01, 0x00, 0x03, 11];
        request.extend_from_slice(b"example.com");
        request.extend_from_slice(&443u16.to_be_bytes());
        client.write_all(&request).await.unwrap();
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();

        let (host, port) = task.await.unwrap().unwrap();
        assert_eq!(host, "example.com");
        assert_eq!(port, 443);
    }

    #[tokio::test]
    async fn test_non_connect_command_is_rejected() {
        let (mut client, mut server) = duplex(256);

        let task = tokio::spawn(async move { handshake(&mut server).await });

        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();

        // BIND is not supported
        client
            .write_all(&[0x05, 0x02, 0x00, 0x01, 1, 2, 3, 4, 0, 80])
            .await
            .unwrap();
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[1], REPLY_CMD_NOT_SUPPORTED);

        assert!(task.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_wrong_version_is_rejected() {
        let (mut client, mut server) = duplex(64);
        let task = tokio::spawn(async move { handshake(&mut server).await });

        client.write_all(&[0x04, 0x01]).await.unwrap();
        assert!(matches!(
            task.await.unwrap(),
            Err(ForwardError::Socks(_))
        ));
    }
}
