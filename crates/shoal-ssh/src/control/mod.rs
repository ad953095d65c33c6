//! Interactive control channel
//!
//! Two taps around the shell's byte conduits: the input tap watches local
//! keystrokes for the double-press trigger and runs the `>> ` prompt, the
//! output tap withholds remote output while a correlation tag is pending.
//! The only state they share is the tag hand-off channel.

mod command;
mod input;
mod output;

pub use command::ControlCommand;
pub use input::{ControlContext, TRIGGER_WINDOW};
pub use output::{TagRequest, TAG_TIMEOUT};

use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::session::ShellStreams;

/// Joins the two taps to an open shell and runs them to completion.
pub struct ControlChannel {
    trigger: u8,
}

impl ControlChannel {
    /// `trigger` is the key byte whose double press opens the prompt.
    pub fn new(trigger: u8) -> Self {
        Self { trigger }
    }

    /// Run until the remote side ends, or local input ends and the
    /// remaining remote output has drained.
    pub async fn run<R, Wi, Wo>(
        self,
        streams: ShellStreams,
        local_input: R,
        echo: Wi,
        terminal: Wo,
        ctx: ControlContext,
    ) -> io::Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        Wi: AsyncWrite + Unpin + Send + 'static,
        Wo: AsyncWrite + Unpin + Send + 'static,
    {
        // Capacity 1: at most one tag outstanding.
        let (tag_tx, tag_rx) = mpsc::channel(1);
        let transcript = ctx.transcript.clone();
        let ShellStreams {
            input: shell_input,
            output: shell_output,
        } = streams;

        let mut output_task = tokio::spawn(output::run(shell_output, terminal, tag_rx, transcript));
        let mut input_task = tokio::spawn(input::run(
            local_input,
            echo,
            shell_input,
            tag_tx,
            self.trigger,
            ctx,
        ));

        tokio::select! {
            result = &mut output_task => {
                // remote ended; no point reading more local keystrokes
                input_task.abort();
                flatten(result)
            }
            result = &mut input_task => {
                flatten(result)?;
                flatten(output_task.await)
            }
        }
    }
}

fn flatten(joined: Result<io::Result<()>, tokio::task::JoinError>) -> io::Result<()> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
    }
}
