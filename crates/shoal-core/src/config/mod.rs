//! Configuration management for shoal

mod forward;
mod host;

pub use forward::{ForwardMode, ForwardSpec};
pub use host::{AuthMethod, HostConfig};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::types::HostId;

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shoal")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Get the default host-info cache path
pub fn default_hostinfo_path() -> PathBuf {
    default_config_dir().join("hostinfo.json")
}

/// Top-level config file: `[settings]` plus one `[hosts.<name>]` per host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Process-wide settings
    #[serde(default)]
    pub settings: Settings,

    /// Host records keyed by host identifier
    #[serde(default)]
    pub hosts: BTreeMap<String, HostConfig>,
}

impl ConfigFile {
    /// Look up one host record
    pub fn host(&self, id: &HostId) -> Result<&HostConfig, ConfigError> {
        self.hosts
            .get(id.as_str())
            .ok_or_else(|| ConfigError::UnknownHost(id.to_string()))
    }
}

/// Process-wide settings shared by every session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Dial+auth bound in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Keepalive probe interval in seconds
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,

    /// Consecutive keepalive failures before the session is closed
    #[serde(default = "default_keepalive_max")]
    pub keepalive_max_failures: u32,

    /// Per-host output label in fan-out mode; `${SERVER}` expands to the host id
    #[serde(default = "default_label_template")]
    pub label_template: String,

    /// Key byte that, pressed twice within a second, opens the local command
    /// prompt (default Ctrl-K)
    #[serde(default = "default_trigger_key")]
    pub trigger_key: u8,

    /// Where the host-info JSON cache is persisted
    #[serde(default)]
    pub hostinfo_path: Option<PathBuf>,

    /// Directory for transcript logs; unset disables logging
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Prefix each transcript line with a timestamp
    #[serde(default)]
    pub log_timestamp: bool,
}

fn default_connect_timeout() -> u64 {
    20
}

fn default_keepalive_interval() -> u64 {
    30
}

fn default_keepalive_max() -> u32 {
    5
}

fn default_label_template() -> String {
    "${SERVER} :: ".to_string()
}

fn default_trigger_key() -> u8 {
    0x0b // Ctrl-K
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            keepalive_interval_secs: default_keepalive_interval(),
            keepalive_max_failures: default_keepalive_max(),
            label_template: default_label_template(),
            trigger_key: default_trigger_key(),
            hostinfo_path: None,
            log_dir: None,
            log_timestamp: false,
        }
    }
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.connect_timeout_secs, 20);
        assert_eq!(settings.keepalive_interval_secs, 30);
        assert_eq!(settings.keepalive_max_failures, 5);
        assert_eq!(settings.trigger_key, 0x0b);
        assert_eq!(settings.label_template, "${SERVER} :: ");
    }

    #[test]
    fn test_config_file_parse() {
        let toml = r#"
            [settings]
            connect_timeout_secs = 5

            [hosts.web-01]
            addr = "10.0.0.1"
            user = "deploy"
            password = "secret"

            [hosts.web-02]
            addr = "10.0.0.2"
            port = 2222
            user = "deploy"
            key_path = "~/.ssh/id_ed25519"
        "#;

        let config: ConfigFile = toml::from_str(toml).unwrap();
        assert_eq!(config.settings.connect_timeout_secs, 5);
        assert_eq!(config.settings.keepalive_interval_secs, 30);
        assert_eq!(config.hosts.len(), 2);

        let web01 = config.host(&HostId::new("web-01")).unwrap();
        assert_eq!(web01.addr, "10.0.0.1");
        assert_eq!(web01.port, 22);

        let web02 = config.host(&HostId::new("web-02")).unwrap();
        assert_eq!(web02.port, 2222);
    }

    #[test]
    fn test_unknown_host_is_error() {
        let config = ConfigFile::default();
        assert!(matches!(
            config.host(&HostId::new("missing")),
            Err(ConfigError::UnknownHost(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let result: Result<ConfigFile, _> = load_config(Path::new("/nonexistent/shoal.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");

        let mut config = ConfigFile::default();
        config
            .hosts
            .insert("db".into(), HostConfig::new("192.168.1.5", "admin"));

        save_config(&path, &config).unwrap();
        let reloaded: ConfigFile = load_config(&path).unwrap();
        assert_eq!(reloaded.hosts["db"].addr, "192.168.1.5");
    }
}
