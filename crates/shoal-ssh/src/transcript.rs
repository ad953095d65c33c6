//! Session transcript logging
//!
//! Appends remote output to a per-session file, optionally prefixing each
//! line with a timestamp. Logging can be toggled at runtime: the control
//! channel suspends it while a local command is being handled so prompts
//! and synthetic output stay out of the transcript.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::warn;

/// Timestamped transcript sink with a runtime on/off toggle
pub struct TranscriptLog {
    path: PathBuf,
    file: Mutex<File>,
    enabled: AtomicBool,
    timestamp: bool,
    at_line_start: AtomicBool,
}

impl TranscriptLog {
    /// Open (append) the transcript file, creating parent directories.
    pub fn open(path: impl Into<PathBuf>, timestamp: bool) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
            enabled: AtomicBool::new(true),
            timestamp,
            at_line_start: AtomicBool::new(true),
        })
    }

    /// The transcript file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Suspend or resume logging
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Whether writes currently reach the file
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Append remote output. Disabled writes are dropped, not buffered.
    pub fn write(&self, data: &[u8]) {
        if !self.is_enabled() || data.is_empty() {
            return;
        }

        let mut file = self.file.lock().expect("transcript lock poisoned");
        let result = if self.timestamp {
            self.write_timestamped(&mut file, data)
        } else {
            file.write_all(data)
        };

        if let Err(e) = result {
            warn!("transcript write to {} failed: {}", self.path.display(), e);
        }
    }

    fn write_timestamped(&self, file: &mut File, data: &[u8]) -> std::io::Result<()> {
        let stamp = Local::now().format("%Y/%m/%d %H:%M:%S ").to_string();
        for &byte in data {
            if self.at_line_start.swap(false, Ordering::SeqCst) {
                file.write_all(stamp.as_bytes())?;
            }
            file.write_all(&[byte])?;
            if byte == b'\n' {
                self.at_line_start.store(true, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}

/// Build the transcript path for a host: `<dir>/<yyyymmdd>_<host>.log`,
/// `:` in the host id replaced so the name stays filesystem-safe.
pub fn transcript_path(dir: &Path, host: &str) -> PathBuf {
    let host = host.replace(':', "_");
    let date = Local::now().format("%Y%m%d");
    dir.join(format!("{}_{}.log", date, host))
}
