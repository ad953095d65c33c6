//! Port-forward specifications
//!
//! A spec is immutable once its tunnel is started. The mode flag follows the
//! classic client convention: `L` (or empty) for local, `R` for remote, `D`
//! for a dynamic SOCKS proxy; X11 has no address pair and is requested with
//! a config flag instead of a spec string.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ForwardError;

/// Direction of a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForwardMode {
    /// Local listen, remote target
    Local,
    /// Remote listen, local target
    Remote,
    /// Local SOCKS proxy, per-connection target
    Dynamic,
    /// X11 channel bridging to the local display
    X11,
}

impl ForwardMode {
    /// Parse the one-letter mode flag; empty means local.
    pub fn parse(flag: &str) -> Result<Self, ForwardError> {
        match flag.to_ascii_uppercase().as_str() {
            "" | "L" => Ok(Self::Local),
            "R" => Ok(Self::Remote),
            "D" => Ok(Self::Dynamic),
            other => Err(ForwardError::InvalidSpec(format!(
                "unknown mode flag {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for ForwardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Local => "L",
            Self::Remote => "R",
            Self::Dynamic => "D",
            Self::X11 => "X11",
        };
        f.write_str(s)
    }
}

/// One tunnel: mode plus the local/remote `host:port` address pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardSpec {
    /// Tunnel direction
    pub mode: ForwardMode,
    /// Listen side for local/dynamic, target side for remote
    pub local: String,
    /// Target side for local, listen side for remote; unused for dynamic
    #[serde(default)]
    pub remote: String,
}

impl ForwardSpec {
    /// Build a spec from a mode flag and an address pair, validating both
    /// addresses as `host:port`.
    pub fn new(flag: &str, local: &str, remote: &str) -> Result<Self, ForwardError> {
        let mode = ForwardMode::parse(flag)?;
        let local = validate_addr(local)?;
        let remote = match mode {
            ForwardMode::Dynamic => String::new(),
            _ => validate_addr(remote)?,
        };
        Ok(Self {
            mode,
            local,
            remote,
        })
    }

    /// Dynamic spec listening at `addr`
    pub fn dynamic(addr: &str) -> Result<Self, ForwardError> {
        Ok(Self {
            mode: ForwardMode::Dynamic,
            local: validate_addr(addr)?,
            remote: String::new(),
        })
    }

    /// Split an address into `(host, port)`
    pub fn split_addr(addr: &str) -> Result<(String, u16), ForwardError> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| ForwardError::InvalidSpec(format!("{:?} is not host:port", addr)))?;
        let port: u16 = port
            .parse()
            .map_err(|_| ForwardError::InvalidSpec(format!("bad port in {:?}", addr)))?;
        let host = if host.is_empty() { "127.0.0.1" } else { host };
        Ok((host.to_string(), port))
    }
}

impl fmt::Display for ForwardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ForwardMode::Dynamic => write!(f, "D {}", self.local),
            _ => write!(f, "{} {} -> {}", self.mode, self.local, self.remote),
        }
    }
}

fn validate_addr(addr: &str) -> Result<String, ForwardError> {
    ForwardSpec::split_addr(addr)?;
    Ok(addr.to_string())
}
