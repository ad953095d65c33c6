//! Exec command implementation
//!
//! Fan one command out to many hosts, labeling each output line with its
//! host. With `--stdin` the local input stream is duplicated to every
//! remote process as well.

use std::sync::Arc;

use anyhow::{bail, Result};
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, Mutex};

use shoal_core::config::ConfigFile;
use shoal_core::HostId;
use shoal_ssh::{Multiplexer, Orchestrator};

use crate::output::print_info;

pub async fn exec_command(
    config: ConfigFile,
    hosts: &[String],
    command: &str,
    broadcast_stdin: bool,
) -> Result<()> {
    let mut targets = Vec::new();
    for name in hosts {
        let id = HostId::new(name);
        let host_config = config.host(&id)?.clone();
        targets.push((id, host_config));
    }

    let settings = config.settings.clone();
    let pool = Orchestrator::new(settings.clone()).connect_all(targets).await;
    if pool.is_empty() {
        bail!("no host could be reached");
    }
    print_info(&format!("Connected to {}/{} hosts", pool.len(), hosts.len()));

    let stdin_rx = broadcast_stdin.then(|| {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut stdin = tokio::io::stdin();
            let mut buf = [0u8; 1024];
            loop {
                match stdin.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        rx
    });

    let sink = Arc::new(Mutex::new(tokio::io::stdout()));
    Multiplexer::new(settings.label_template.clone())
        .fan_out(&pool, command, sink, stdin_rx)
        .await;

    pool.close_all().await;
    Ok(())
}
