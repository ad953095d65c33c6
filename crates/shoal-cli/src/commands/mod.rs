//! CLI command implementations

mod config;
mod exec;
mod list;
mod shell;

pub use config::{config_init, config_path, config_show};
pub use exec::exec_command;
pub use list::list_command;
pub use shell::{shell_command, ShellOptions};

use std::path::PathBuf;

use shoal_core::config::{self as core_config, ConfigFile};
use shoal_core::error::ConfigError;

use crate::output::print_warning;

/// Load the config file, or fall back to defaults when none exists yet.
/// A present-but-broken file is still an error.
pub fn load_or_default(path: Option<&PathBuf>) -> Result<ConfigFile, ConfigError> {
    let path = path.cloned().unwrap_or_else(core_config::default_config_path);
    match core_config::load_config(&path) {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound(_)) => {
            print_warning(&format!(
                "No config at {}; run 'shoal config init' to create one",
                path.display()
            ));
            Ok(ConfigFile::default())
        }
        Err(e) => Err(e),
    }
}
