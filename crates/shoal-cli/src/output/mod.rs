//! Output formatting utilities for the CLI
//!
//! Colored status messages plus the plain-text host listing. Labeled
//! fan-out output is handled by the session engine; this module only
//! covers the CLI's own chrome.

use tabled::{settings::Style, Table, Tabled};

use shoal_core::config::{ConfigFile, ForwardSpec};

/// Format the configured hosts as an ASCII table, or "No hosts configured"
/// when the inventory is empty.
pub fn format_hosts(config: &ConfigFile) -> String {
    if config.hosts.is_empty() {
        return "No hosts configured".to_string();
    }

    #[derive(Tabled)]
    struct HostRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "ENDPOINT")]
        endpoint: String,
        #[tabled(rename = "FORWARDS")]
        forwards: String,
    }

    let rows: Vec<HostRow> = config
        .hosts
        .iter()
        .map(|(name, host)| {
            let mut extras: Vec<String> =
                host.forwards.iter().map(ForwardSpec::to_string).collect();
            if let Some(addr) = &host.dynamic_forward {
                extras.push(format!("D {}", addr));
            }
            if host.forward_x11 {
                extras.push("X11".to_string());
            }

            HostRow {
                name: name.clone(),
                endpoint: format!("{}@{}:{}", host.user, host.addr, host.port),
                forwards: if extras.is_empty() {
                    "-".to_string()
                } else {
                    extras.join(", ")
                },
            }
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow with a warning symbol prefix
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan with an info symbol prefix
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_core::config::HostConfig;

    #[test]
    fn test_format_hosts_empty() {
        assert_eq!(format_hosts(&ConfigFile::default()), "No hosts configured");
    }

    #[test]
    fn test_format_hosts_lists_records() {
        let mut config = ConfigFile::default();
        config
            .hosts
            .insert("web-01".into(), HostConfig::new("10.0.0.1", "deploy"));
        let mut db = HostConfig::new("10.0.0.2", "admin");
        db.port = 2222;
        db.forward_x11 = true;
        config.hosts.insert("db".into(), db);

        let out = format_hosts(&config);
        assert!(out.contains("web-01"));
        assert!(out.contains("deploy@10.0.0.1:22"));
        assert!(out.contains("admin@10.0.0.2:2222"));
        assert!(out.contains("X11"));
    }
}
