//! Output tap
//!
//! Sits between the remote output conduit and the terminal. In passthrough
//! it copies bytes straight out; when the input tap hands it a correlation
//! tag it withholds everything and scans for the tagged window instead.
//! The withheld bytes are never shown on success, and shown verbatim if
//! the tag expires.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::debug;

use crate::transcript::TranscriptLog;

/// Upper bound on how long output is withheld for one tag.
pub const TAG_TIMEOUT: Duration = Duration::from_secs(15);

/// One tag hand-off from the input tap. Dropping the reply sender without
/// sending signals expiry to the waiter.
pub struct TagRequest {
    pub tag: String,
    pub reply: oneshot::Sender<String>,
}

/// Run the tap until the remote conduit ends.
pub(crate) async fn run<W>(
    mut remote: mpsc::Receiver<Bytes>,
    mut terminal: W,
    mut tag_rx: mpsc::Receiver<TagRequest>,
    transcript: Option<Arc<TranscriptLog>>,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut tags_open = true;

    loop {
        // The input tap hands the tag over before injecting its command,
        // so when a tag and remote bytes are both ready the tag must win
        // or the open marker slips out in passthrough.
        tokio::select! {
            biased;
            request = tag_rx.recv(), if tags_open => match request {
                Some(request) => {
                    if !await_tagged(&mut remote, &mut terminal, &transcript, request).await? {
                        return Ok(());
                    }
                }
                None => tags_open = false,
            },
            chunk = remote.recv() => match chunk {
                Some(chunk) => {
                    emit(&mut terminal, &transcript, &chunk).await?;
                }
                None => return Ok(()),
            },
        }
    }
}

/// Withhold output while scanning for one tagged window. Returns `false`
/// when the remote conduit ended.
async fn await_tagged<W>(
    remote: &mut mpsc::Receiver<Bytes>,
    terminal: &mut W,
    transcript: &Option<Arc<TranscriptLog>>,
    request: TagRequest,
) -> io::Result<bool>
where
    W: AsyncWrite + Unpin,
{
    let deadline = Instant::now() + TAG_TIMEOUT;
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        tokio::select! {
            chunk = remote.recv() => match chunk {
                Some(chunk) => {
                    buffer.extend_from_slice(&chunk);
                    if let Some(payload) = extract_tagged(&buffer, &request.tag) {
                        // Everything withheld belongs to the synthetic
                        // command; none of it reaches the terminal.
                        let _ = request.reply.send(payload);
                        return Ok(true);
                    }
                }
                None => {
                    emit(terminal, transcript, &buffer).await?;
                    return Ok(false);
                }
            },
            _ = tokio::time::sleep_until(deadline) => {
                debug!("tag {} expired, flushing withheld output", request.tag);
                emit(terminal, transcript, &buffer).await?;
                return Ok(true);
            }
        }
    }
}

async fn emit<W>(
    terminal: &mut W,
    transcript: &Option<Arc<TranscriptLog>>,
    bytes: &[u8],
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if bytes.is_empty() {
        return Ok(());
    }
    terminal.write_all(bytes).await?;
    terminal.flush().await?;
    if let Some(log) = transcript {
        log.write(bytes);
    }
    Ok(())
}

/// Find `open:<tag>` terminated by its own line ending, then the matching
/// `close:<tag>`, and return the trimmed payload between them. The shell's
/// echo of the synthetic command also contains both markers, but there the
/// tag is followed by printf escape text rather than a real line ending,
/// which is what the all-carriage-return check rejects.
fn extract_tagged(buffer: &[u8], tag: &str) -> Option<String> {
    let text = String::from_utf8_lossy(buffer);
    let open = format!("open:{}", tag);
    let close = format!("close:{}", tag);

    let mut search = 0;
    while let Some(pos) = text[search..].find(&open) {
        let after = search + pos + open.len();
        let rest = &text[after..];
        if let Some(nl) = rest.find('\n') {
            if rest[..nl].chars().all(|c| c == '\r') {
                let payload = &rest[nl + 1..];
                if let Some(end) = payload.find(&close) {
                    return Some(payload[..end].trim().to_string());
                }
            }
        }
        search = after;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::testutil::SharedSink;

    #[test]
    fn test_extract_skips_echoed_markers() {
        let echoed = b" printf 'open:abc123\\r\\n'; hostname; printf 'close:abc123'\r\n";
        let mut stream = Vec::new();
        stream.extend_from_slice(echoed);
        stream.extend_from_slice(b"open:abc123\r\nhello\r\nclose:abc123");
        assert_eq!(extract_tagged(&stream, "abc123").as_deref(), Some("hello"));
    }

    #[test]
    fn test_extract_needs_complete_window() {
        assert_eq!(extract_tagged(b"open:t1\r\npartial", "t1"), None);
        assert_eq!(extract_tagged(b"no markers here", "t1"), None);
    }

    #[test]
    fn test_extract_handles_onlcr_doubled_cr() {
        // pty ONLCR turns \n into \r\n, so the marker line ends \r\r\n
        let stream = b"open:t1\r\r\nout\r\r\nclose:t1";
        assert_eq!(extract_tagged(stream, "t1").as_deref(), Some("out"));
    }

    #[tokio::test]
    async fn test_passthrough_copies_bytes() {
        let (remote_tx, remote_rx) = mpsc::channel(8);
        let (_tag_tx, tag_rx) = mpsc::channel::<TagRequest>(1);
        let sink = SharedSink::default();

        let tap = tokio::spawn(run(remote_rx, sink.clone(), tag_rx, None));

        remote_tx.send(Bytes::from_static(b"abc")).await.unwrap();
        remote_tx.send(Bytes::from_static(b"def")).await.unwrap();
        drop(remote_tx);

        tap.await.unwrap().unwrap();
        assert_eq!(sink.contents(), b"abcdef");
    }

    #[tokio::test]
    async fn test_tagged_window_is_withheld_and_delivered() {
        let (remote_tx, remote_rx) = mpsc::channel(8);
        let (tag_tx, tag_rx) = mpsc::channel(1);
        let sink = SharedSink::default();

        let tap = tokio::spawn(run(remote_rx, sink.clone(), tag_rx, None));

        let (reply_tx, reply_rx) = oneshot::channel();
        tag_tx
            .send(TagRequest {
                tag: "t1".to_string(),
                reply: reply_tx,
            })
            .await
            .unwrap();

        remote_tx
            .send(Bytes::from_static(b"open:t1\r\n  hello  \r\n"))
            .await
            .unwrap();
        remote_tx
            .send(Bytes::from_static(b"close:t1"))
            .await
            .unwrap();

        assert_eq!(reply_rx.await.unwrap(), "hello");
        drop(remote_tx);
        tap.await.unwrap().unwrap();
        // withheld bytes never reach the terminal on success
        assert!(sink.contents().is_empty());
    }

    #[tokio::test]
    async fn test_pending_tag_wins_over_already_buffered_bytes() {
        let (remote_tx, remote_rx) = mpsc::channel(8);
        let (tag_tx, tag_rx) = mpsc::channel(1);
        let sink = SharedSink::default();

        // Both the tag and the bytes carrying its window are queued before
        // the tap polls once; the tag must still be registered first.
        let (reply_tx, reply_rx) = oneshot::channel();
        tag_tx
            .send(TagRequest {
                tag: "t1".to_string(),
                reply: reply_tx,
            })
            .await
            .unwrap();
        remote_tx
            .send(Bytes::from_static(b"open:t1\r\nhi\r\nclose:t1"))
            .await
            .unwrap();

        let tap = tokio::spawn(run(remote_rx, sink.clone(), tag_rx, None));

        assert_eq!(reply_rx.await.unwrap(), "hi");
        drop(remote_tx);
        tap.await.unwrap().unwrap();
        assert!(sink.contents().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_tag_flushes_verbatim_once() {
        let (remote_tx, remote_rx) = mpsc::channel(8);
        let (tag_tx, tag_rx) = mpsc::channel(1);
        let sink = SharedSink::default();

        let tap = tokio::spawn(run(remote_rx, sink.clone(), tag_rx, None));

        let (reply_tx, reply_rx) = oneshot::channel();
        tag_tx
            .send(TagRequest {
                tag: "t1".to_string(),
                reply: reply_tx,
            })
            .await
            .unwrap();
        remote_tx
            .send(Bytes::from_static(b"unrelated output"))
            .await
            .unwrap();
        tokio::task::yield_now().await;

        tokio::time::advance(TAG_TIMEOUT + Duration::from_millis(1)).await;
        // the waiter sees the dropped reply sender
        assert!(reply_rx.await.is_err());

        // back in passthrough: the withheld bytes came out verbatim and new
        // output flows normally
        remote_tx.send(Bytes::from_static(b" and more")).await.unwrap();
        drop(remote_tx);
        tap.await.unwrap().unwrap();
        assert_eq!(sink.contents(), b"unrelated output and more");
    }

    #[tokio::test]
    async fn test_eof_while_buffering_flushes() {
        let (remote_tx, remote_rx) = mpsc::channel(8);
        let (tag_tx, tag_rx) = mpsc::channel(1);
        let sink = SharedSink::default();

        let tap = tokio::spawn(run(remote_rx, sink.clone(), tag_rx, None));

        let (reply_tx, _reply_rx) = oneshot::channel();
        tag_tx
            .send(TagRequest {
                tag: "t1".to_string(),
                reply: reply_tx,
            })
            .await
            .unwrap();
        remote_tx
            .send(Bytes::from_static(b"tail bytes"))
            .await
            .unwrap();
        drop(remote_tx);

        tap.await.unwrap().unwrap();
        assert_eq!(sink.contents(), b"tail bytes");
    }
}
