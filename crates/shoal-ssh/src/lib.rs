//! Session engine for shoal
//!
//! Everything built on top of the `russh` transport: establishing
//! authenticated sessions in parallel, fanning commands out across hosts
//! with labeled output, the interactive control channel that intercepts
//! local keystrokes, port-forwarding tunnels bound to a session's lifetime,
//! and background keepalive probing.

pub mod connector;
pub mod control;
pub mod forward;
pub mod keepalive;
pub mod multiplex;
pub mod orchestrator;
pub mod session;
pub mod transcript;
pub mod transfer;

pub use connector::{ClientHandler, IncomingChannel};
pub use control::{ControlChannel, ControlContext};
pub use forward::PortForwardManager;
pub use keepalive::KeepAliveMonitor;
pub use multiplex::{InputBroadcaster, Multiplexer};
pub use orchestrator::{Orchestrator, SessionPool};
pub use session::{ShellInput, ShellStreams, SshSession};
pub use transcript::TranscriptLog;
pub use transfer::SftpTransfer;
