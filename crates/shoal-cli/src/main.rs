//! shoal CLI
//!
//! Interactive multi-host SSH client:
//! - Shell: one interactive session with tunnels and the in-band control prompt
//! - Exec: one command fanned out to many hosts with labeled output
//! - List / Config: inspect and manage the host inventory

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shoal::commands;

#[derive(Parser)]
#[command(name = "shoal")]
#[command(author, version, about = "Interactive multi-host SSH client")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an interactive shell on a configured host
    Shell {
        /// Host name from the config
        host: String,
        /// Extra local forward, listen=target (e.g. 127.0.0.1:8080=10.0.0.5:80)
        #[arg(short = 'L', long = "local")]
        locals: Vec<String>,
        /// Extra remote forward, listen=target (listen side on the server)
        #[arg(short = 'R', long = "remote")]
        remotes: Vec<String>,
        /// SOCKS proxy listen address (dynamic forward)
        #[arg(short = 'D', long = "dynamic")]
        dynamic: Option<String>,
        /// Request X11 forwarding
        #[arg(short = 'X', long)]
        x11: bool,
        /// Write a transcript log of the session
        #[arg(long)]
        log: bool,
    },

    /// Run a command on one or more hosts in parallel
    Exec {
        /// Command to run remotely
        command: String,
        /// Host names from the config
        #[arg(required = true)]
        hosts: Vec<String>,
        /// Broadcast local stdin to every host
        #[arg(short = 'i', long)]
        stdin: bool,
    },

    /// List configured hosts
    List,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create a starter configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show config directory path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Shell {
            host,
            locals,
            remotes,
            dynamic,
            x11,
            log,
        } => {
            let config = commands::load_or_default(cli.config.as_ref())?;
            let opts = commands::ShellOptions {
                locals,
                remotes,
                dynamic,
                x11,
                log,
            };
            commands::shell_command(config, &host, opts).await?;
        }

        Commands::Exec {
            command,
            hosts,
            stdin,
        } => {
            let config = commands::load_or_default(cli.config.as_ref())?;
            commands::exec_command(config, &hosts, &command, stdin).await?;
        }

        Commands::List => {
            let config = commands::load_or_default(cli.config.as_ref())?;
            commands::list_command(&config)?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(cli.config.as_ref())?,
            ConfigAction::Init { force } => commands::config_init(cli.config.as_ref(), force)?,
            ConfigAction::Path => commands::config_path()?,
        },
    }

    Ok(())
}
