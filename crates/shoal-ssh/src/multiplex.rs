//! Fan-out output multiplexing and input broadcasting
//!
//! One reader task per session streams remote output into a shared console
//! sink, each line prefixed with the host's label. Bytes from one host keep
//! their order; nothing is guaranteed across hosts. In broadcast mode one
//! local input stream is duplicated to every live session; a closed target
//! drops its copy silently instead of failing the broadcast.

use bytes::{Bytes, BytesMut};
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::warn;

use shoal_core::HostId;

use crate::orchestrator::SessionPool;

/// Capacity of each per-host output conduit
const OUTPUT_CHANNEL_CAPACITY: usize = 64;

/// Render a host label from the template; `${SERVER}` expands to the host id.
pub fn render_label(template: &str, host: &HostId) -> String {
    template.replace("${SERVER}", host.as_str())
}

/// Merges per-host output streams into one labeled console sink
pub struct Multiplexer {
    label_template: String,
}

impl Multiplexer {
    /// Create a multiplexer with the given label template
    pub fn new(label_template: impl Into<String>) -> Self {
        Self {
            label_template: label_template.into(),
        }
    }

    /// Run `command` on every session in the pool, labeling output lines
    /// into `sink`. When `broadcast_input` is given, its stream is
    /// duplicated to every session's stdin. Returns once every per-host
    /// stream has reached end-of-stream.
    pub async fn fan_out<W>(
        &self,
        pool: &SessionPool,
        command: &str,
        sink: Arc<Mutex<W>>,
        broadcast_input: Option<mpsc::Receiver<Bytes>>,
    ) where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut tasks = JoinSet::new();
        let mut broadcaster = InputBroadcaster::new();

        for session in pool.list() {
            let label = render_label(&self.label_template, session.host());
            let (output_tx, output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);

            let stdin_rx = broadcast_input.as_ref().map(|_| {
                let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
                broadcaster.add_target(tx);
                rx
            });

            let command = command.to_string();
            let exec_session = Arc::clone(&session);
            tasks.spawn(async move {
                if let Err(e) = exec_session.exec_streamed(&command, output_tx, stdin_rx).await {
                    warn!("{}: {}", exec_session.host(), e);
                }
            });

            let sink = Arc::clone(&sink);
            tasks.spawn(async move {
                write_labeled(label, output_rx, sink).await;
            });
        }

        let input_task = broadcast_input.map(|mut input| {
            tokio::spawn(async move {
                while let Some(data) = input.recv().await {
                    broadcaster.broadcast(data).await;
                }
            })
        });

        // Completion barrier: every exec and every labeler has finished.
        while tasks.join_next().await.is_some() {}

        if let Some(task) = input_task {
            task.abort();
        }
    }
}

/// Copy one host's output into the shared sink, one labeled line at a time.
/// Partial lines are held until their newline arrives; a trailing partial
/// line is flushed labeled at end-of-stream.
async fn write_labeled<W>(label: String, mut output: mpsc::Receiver<Bytes>, sink: Arc<Mutex<W>>)
where
    W: AsyncWrite + Unpin + Send,
{
    let mut pending = BytesMut::new();

    while let Some(chunk) = output.recv().await {
        pending.extend_from_slice(&chunk);

        while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
            let line = pending.split_to(pos + 1);
            let mut sink = sink.lock().await;
            let _ = sink.write_all(label.as_bytes()).await;
            let _ = sink.write_all(&line).await;
        }
    }

    if !pending.is_empty() {
        let mut sink = sink.lock().await;
        let _ = sink.write_all(label.as_bytes()).await;
        let _ = sink.write_all(&pending).await;
        let _ = sink.write_all(b"\n").await;
    }
    let _ = sink.lock().await.flush().await;
}

/// Duplicates one local input stream to many per-host write targets
pub struct InputBroadcaster {
    targets: Vec<mpsc::Sender<Bytes>>,
}

impl InputBroadcaster {
    /// Create an empty broadcaster
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
        }
    }

    /// Add one per-host write target
    pub fn add_target(&mut self, target: mpsc::Sender<Bytes>) {
        self.targets.push(target);
    }

    /// Number of targets still accepting writes
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Check if no targets remain
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Write `data` to every live target. A closed target is dropped
    /// silently; the broadcast itself never fails.
    pub async fn broadcast(&mut self, data: Bytes) {
        let mut live = Vec::with_capacity(self.targets.len());
        for target in self.targets.drain(..) {
            if target.send(data.clone()).await.is_ok() {
                live.push(target);
            }
        }
        self.targets = live;
    }
}

impl Default for InputBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
