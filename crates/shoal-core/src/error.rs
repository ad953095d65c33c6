//! Core error types for shoal

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the shoal ecosystem
#[derive(Error, Debug)]
pub enum ShoalError {
    /// Connection error
    #[error("Connection error: {0}")]
    Connect(#[from] ConnectError),

    /// Port forwarding error
    #[error("Forward error: {0}")]
    Forward(#[from] ForwardError),

    /// Control channel error
    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    /// File transfer error
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connection-related errors
#[derive(Error, Debug)]
pub enum ConnectError {
    /// No usable authentication method configured for the host
    #[error("{0} has no auth method configured")]
    NoAuthMethod(String),

    /// Every configured authentication method was rejected
    #[error("Authentication failed for {0}")]
    AuthenticationFailed(String),

    /// Dial or handshake failed
    #[error("Connection to {host} failed: {message}")]
    Dial { host: String, message: String },

    /// Dial and auth did not finish within the configured bound
    #[error("Connection to {host} timed out after {seconds}s")]
    Timeout { host: String, seconds: u64 },

    /// Private key could not be loaded
    #[error("Cannot load key {path}: {message}")]
    KeyLoad { path: PathBuf, message: String },

    /// Session was closed (keepalive exhaustion or remote disconnect)
    #[error("Session closed")]
    SessionClosed,

    /// Underlying transport error
    #[error("SSH transport error: {0}")]
    Transport(String),
}

/// Port-forwarding errors
#[derive(Error, Debug)]
pub enum ForwardError {
    /// Local listener could not be bound
    #[error("Cannot bind {addr}: {message}")]
    Bind { addr: String, message: String },

    /// Server rejected the remote-forward request
    #[error("Remote forward for {addr} rejected by server")]
    RemoteRejected { addr: String },

    /// SOCKS handshake was malformed or unsupported
    #[error("SOCKS handshake failed: {0}")]
    Socks(String),

    /// Forward spec string could not be parsed
    #[error("Invalid forward spec: {0}")]
    InvalidSpec(String),

    /// Channel open toward the tunnel target failed
    #[error("Cannot open channel to {target}: {message}")]
    ChannelOpen { target: String, message: String },

    /// I/O error while pumping bytes
    #[error("Forward I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Control-channel errors
#[derive(Error, Debug)]
pub enum ControlError {
    /// No response arrived for the outstanding correlation tag
    #[error("No tagged response within {0}s")]
    TagTimeout(u64),

    /// A tagged command was issued while another was pending
    #[error("A tagged command is already pending")]
    TagPending,

    /// Command argument rejected before touching the remote
    #[error("Invalid argument for {verb}: {message}")]
    InvalidArgument { verb: String, message: String },

    /// Required script is not configured for the host
    #[error("{0} script is not configured")]
    MissingScript(&'static str),

    /// Local input or terminal I/O failed
    #[error("Control I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// File-transfer errors
#[derive(Error, Debug)]
pub enum TransferError {
    /// Local file missing or unreadable
    #[error("Local file {0}: {1}")]
    Local(PathBuf, String),

    /// Remote file missing or unwritable
    #[error("Remote file {0}: {1}")]
    Remote(String, String),

    /// SFTP subsystem failure
    #[error("SFTP error: {0}")]
    Sftp(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Host not present in the config
    #[error("Unknown host: {0}")]
    UnknownHost(String),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
