//! List command implementation

use anyhow::Result;

use shoal_core::config::{self, ConfigFile};
use shoal_core::hostinfo::HostInfoCache;
use shoal_core::HostId;

use crate::output::format_hosts;

/// Print the configured hosts, annotated with their cached `.hostinfo`
/// line when one is known.
pub fn list_command(config: &ConfigFile) -> Result<()> {
    let cache = HostInfoCache::load(
        config
            .settings
            .hostinfo_path
            .clone()
            .unwrap_or_else(config::default_hostinfo_path),
    );

    println!("{}", format_hosts(config));
    if config.hosts.is_empty() {
        return Ok(());
    }

    let known: Vec<(String, String)> = config
        .hosts
        .keys()
        .filter_map(|name| {
            cache
                .get(&HostId::new(name))
                .map(|info| (name.clone(), info))
        })
        .collect();

    if !known.is_empty() {
        println!();
        for (name, info) in known {
            println!("{}: {}", name, info);
        }
    }
    Ok(())
}
