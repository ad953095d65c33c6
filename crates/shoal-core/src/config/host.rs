//! Per-host configuration records

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::forward::ForwardSpec;

/// One `[hosts.<name>]` record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Address to dial (hostname or IP)
    pub addr: String,

    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Login user
    pub user: String,

    /// Password authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Private-key authentication
    #[serde(default)]
    pub key_path: Option<PathBuf>,

    /// Passphrase for the private key
    #[serde(default)]
    pub key_passphrase: Option<String>,

    /// Port forwards started alongside the session (`L`/`R` specs)
    #[serde(default)]
    pub forwards: Vec<ForwardSpec>,

    /// Local SOCKS proxy address for dynamic forwarding
    #[serde(default)]
    pub dynamic_forward: Option<String>,

    /// Request X11 forwarding for the interactive session
    #[serde(default)]
    pub forward_x11: bool,

    /// Port of the auxiliary local web service used by `.dash` / `.web`
    #[serde(default)]
    pub web_port: Option<u16>,

    /// Shell script producing the one-line host summary for `.hostinfo`
    #[serde(default)]
    pub hostinfo_script: Option<String>,

    /// Shell script for `.ps`; `{pid}` expands to the argument
    #[serde(default)]
    pub process_info_script: Option<String>,

    /// Write a transcript log for interactive sessions on this host
    #[serde(default)]
    pub log: bool,
}

fn default_port() -> u16 {
    22
}

impl HostConfig {
    /// Create a minimal record with just address and user
    pub fn new(addr: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            port: default_port(),
            user: user.into(),
            password: None,
            key_path: None,
            key_passphrase: None,
            forwards: Vec::new(),
            dynamic_forward: None,
            forward_x11: false,
            web_port: None,
            hostinfo_script: None,
            process_info_script: None,
            log: false,
        }
    }

    /// `addr:port` for dialing
    pub fn dial_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }

    /// Configured authentication methods, in the order they are tried.
    /// Empty means the host cannot be dialed at all.
    pub fn auth_methods(&self) -> Vec<AuthMethod> {
        let mut methods = Vec::new();
        if let Some(path) = &self.key_path {
            methods.push(AuthMethod::Key {
                path: path.clone(),
                passphrase: self.key_passphrase.clone(),
            });
        }
        if let Some(password) = &self.password {
            methods.push(AuthMethod::Password(password.clone()));
        }
        methods
    }

    /// Default host-info script, used when none is configured.
    /// One line: arch, cpu count, free/total memory, free/total disk, distro.
    pub fn default_hostinfo_script() -> &'static str {
        concat!(
            "uname -m; echo -n \", \"; grep -c ^processor /proc/cpuinfo; ",
            "echo -n \"C, \"; free -h | awk '/^Mem:/ {print $7}'; ",
            "echo -n \"/\"; free -h | awk '/^Mem:/ {print $2}'; ",
            "echo -n \", \"; df -h --total / | grep total | awk '{print $4}'; ",
            "echo -n \"/\"; df -h --total / | grep total | awk '{print $2}'; ",
            "echo -n \", \"; cat /etc/os-release | grep ^PRETTY_NAME= | cut -d '\"' -f2"
        )
    }
}

/// One way of authenticating against a host
#[derive(Debug, Clone)]
pub enum AuthMethod {
    /// Password authentication
    Password(String),
    /// Public-key authentication from a key file
    Key {
        path: PathBuf,
        passphrase: Option<String>,
    },
}
