//! Local command verbs
//!
//! Lines typed at the `>> ` prompt. A verb matches case-insensitively and
//! with exact arity; anything else, dot-prefixed or not, is injected into
//! the remote shell verbatim.

/// One parsed prompt line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// `.?` - list the available verbs
    Help,
    /// `.hostinfo` - run the host-info script under a correlation tag
    HostInfo,
    /// `.ps <pid>` - run the process-info script for one pid
    Ps { pid: String },
    /// `.dash` - open the local dashboard in a browser
    Dash,
    /// `.web` - open the host's web port in a browser
    Web,
    /// `.exit` / `.quit` - inject `exit` into the remote shell
    Exit,
    /// `.up <localfile>` - upload a file over SFTP
    Upload { local: String },
    /// `.dl <remotefile>` - download a file over SFTP
    Download { remote: String },
    /// Everything else, passed through unchanged
    Literal(String),
}

impl ControlCommand {
    /// Parse one prompt line. A dot-prefixed line that does not fully match
    /// a verb and its arity falls through to `Literal`.
    pub fn parse(line: &str) -> ControlCommand {
        let trimmed = line.trim();
        let mut parts = trimmed.split_whitespace();
        let verb = parts.next().unwrap_or("").to_ascii_lowercase();
        let arg = parts.next();
        let extra = parts.next();

        if extra.is_some() {
            return ControlCommand::Literal(line.to_string());
        }

        match (verb.as_str(), arg) {
            (".?", None) => ControlCommand::Help,
            (".hostinfo", None) => ControlCommand::HostInfo,
            (".ps", Some(pid)) => ControlCommand::Ps {
                pid: pid.to_string(),
            },
            (".dash", None) => ControlCommand::Dash,
            (".web", None) => ControlCommand::Web,
            (".exit", None) | (".quit", None) => ControlCommand::Exit,
            (".up", Some(path)) => ControlCommand::Upload {
                local: path.to_string(),
            },
            (".dl", Some(path)) => ControlCommand::Download {
                remote: path.to_string(),
            },
            _ => ControlCommand::Literal(line.to_string()),
        }
    }
}

/// Text printed for `.?`
pub const HELP_TEXT: &str = "\
.?              this help
.hostinfo       refresh host information
.ps <pid>       show process information
.dash           open the dashboard in a browser
.web            open the host's web port in a browser
.up <file>      upload a local file
.dl <file>      download a remote file
.exit | .quit   exit the remote shell
anything else is sent to the remote shell as typed
";
