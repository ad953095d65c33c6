//! Host-info cache
//!
//! Process-wide mapping of host identifier to the last-seen one-line info
//! string produced by `.hostinfo`. The whole flat JSON object is rewritten
//! on every change; a no-op update does not touch the file. One explicit
//! owner holds the cache — there is no ambient global.

use serde_json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use crate::error::ConfigError;
use crate::types::HostId;

/// Cache of host → info string, persisted as a flat JSON object
#[derive(Debug)]
pub struct HostInfoCache {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl HostInfoCache {
    /// Load the cache from `path`. A missing or unreadable file starts the
    /// cache empty rather than failing startup.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Ignoring malformed host-info cache {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Last-seen info string for a host
    pub fn get(&self, host: &HostId) -> Option<String> {
        self.entries
            .lock()
            .expect("hostinfo lock poisoned")
            .get(host.as_str())
            .cloned()
    }

    /// Record a new info string, persisting the whole map when it changed.
    pub fn set(&self, host: &HostId, info: &str) -> Result<(), ConfigError> {
        let snapshot = {
            let mut entries = self.entries.lock().expect("hostinfo lock poisoned");
            if entries.get(host.as_str()).map(String::as_str) == Some(info) {
                return Ok(());
            }
            entries.insert(host.to_string(), info.to_string());
            entries.clone()
        };

        self.flush(&snapshot)
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.lock().expect("hostinfo lock poisoned").len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, snapshot: &BTreeMap<String, String>) -> Result<(), ConfigError> {
        let json = serde_json::to_string(snapshot)
            .map_err(|e| ConfigError::Invalid(format!("hostinfo serialize: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Invalid(format!("hostinfo dir: {}", e)))?;
        }

        std::fs::write(&self.path, json)
            .map_err(|e| ConfigError::Invalid(format!("hostinfo write: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HostInfoCache::load(dir.path().join("hostinfo.json"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_persists_flat_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostinfo.json");
        let cache = HostInfoCache::load(&path);

        cache
            .set(&HostId::new("web-01"), "x86_64, 8C, 4G/16G")
            .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: BTreeMap<String, String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["web-01"], "x86_64, 8C, 4G/16G");
    }

    #[test]
    fn test_unchanged_value_skips_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostinfo.json");
        let cache = HostInfoCache::load(&path);
        let host = HostId::new("db");

        cache.set(&host, "info").unwrap();
        let mtime = std::fs::metadata(&path).unwrap().modified().unwrap();

        // Same value again: the file must not be rewritten
        std::fs::remove_file(&path).unwrap();
        cache.set(&host, "info").unwrap();
        assert!(!path.exists());

        // New value: rewritten
        cache.set(&host, "other").unwrap();
        assert!(path.exists());
        let _ = mtime;
    }

    #[test]
    fn test_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostinfo.json");

        {
            let cache = HostInfoCache::load(&path);
            cache.set(&HostId::new("a"), "one").unwrap();
            cache.set(&HostId::new("b"), "two").unwrap();
        }

        let reloaded = HostInfoCache::load(&path);
        assert_eq!(reloaded.get(&HostId::new("a")).as_deref(), Some("one"));
        assert_eq!(reloaded.get(&HostId::new("b")).as_deref(), Some("two"));
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn test_malformed_cache_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostinfo.json");
        std::fs::write(&path, "not json").unwrap();

        let cache = HostInfoCache::load(&path);
        assert!(cache.is_empty());
    }
}
