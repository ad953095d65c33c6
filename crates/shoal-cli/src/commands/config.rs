//! Config command implementations

use std::path::PathBuf;

use anyhow::{Context, Result};

use shoal_core::config;

use crate::output::{print_error, print_info, print_success, print_warning};

/// Show the current configuration file verbatim.
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let path = config_path
        .cloned()
        .unwrap_or_else(config::default_config_path);

    if !path.exists() {
        print_warning(&format!("No configuration file found at {}", path.display()));
        print_info("Run 'shoal config init' to create one");
        return Ok(());
    }

    print_info(&format!("Configuration file: {}", path.display()));
    println!();

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    println!("{}", content);

    Ok(())
}

/// Write a commented starter configuration.
pub fn config_init(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let path = config_path
        .cloned()
        .unwrap_or_else(config::default_config_path);

    if path.exists() && !force {
        print_error(&format!("Config file already exists: {}", path.display()));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }

    std::fs::write(&path, starter_config())
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    print_success(&format!("Created configuration file: {}", path.display()));
    Ok(())
}

/// Print the config directory path.
pub fn config_path() -> Result<()> {
    println!("{}", config::default_config_dir().display());
    Ok(())
}

fn starter_config() -> &'static str {
    r#"# shoal configuration

[settings]
# Dial + auth bound per host, in seconds
connect_timeout_secs = 20

# Keepalive probing: probe interval and consecutive failures tolerated
keepalive_interval_secs = 30
keepalive_max_failures = 5

# Per-host label for fan-out output; ${SERVER} expands to the host name
label_template = "${SERVER} :: "

# Key byte whose double press opens the local command prompt (11 = Ctrl-K)
trigger_key = 11

# Directory for transcript logs; leave unset to disable logging
# log_dir = "~/.local/share/shoal/logs"
# log_timestamp = true

# Example host records
# [hosts.web-01]
# addr = "10.0.0.1"
# user = "deploy"
# key_path = "~/.ssh/id_ed25519"
# forwards = [{ mode = "Local", local = "127.0.0.1:8080", remote = "127.0.0.1:80" }]
# web_port = 3000

# [hosts.db]
# addr = "10.0.0.2"
# port = 2222
# user = "admin"
# password = "change-me"
# dynamic_forward = "127.0.0.1:1080"
# forward_x11 = true
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_core::config::ConfigFile;

    #[test]
    fn test_starter_config_is_valid_toml() {
        let parsed: Result<ConfigFile, _> = toml::from_str(starter_config());
        assert!(parsed.is_ok());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[settings]\n").unwrap();

        config_init(Some(&path), false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[settings]\n");

        config_init(Some(&path), true).unwrap();
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains("label_template"));
    }
}
