//! Parallel connection establishment
//!
//! One task per host, a counted join at the end: total latency is roughly
//! the slowest single host, and a failing host never affects its siblings.
//! The resulting pool may be empty; the caller decides what that means.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{info, warn};

use shoal_core::config::{HostConfig, Settings};
use shoal_core::error::ConnectError;
use shoal_core::HostId;

use crate::connector;
use crate::keepalive::KeepAliveMonitor;
use crate::session::SshSession;

/// Shared host → session mapping. Single-key insert/lookup only; the lock
/// is internal to the map and never held across I/O.
pub struct SessionPool {
    sessions: DashMap<HostId, Arc<SshSession>>,
}

impl SessionPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Get a session by host
    pub fn get(&self, host: &HostId) -> Option<Arc<SshSession>> {
        self.sessions.get(host).map(|r| Arc::clone(&r))
    }

    /// Insert a session
    pub fn insert(&self, session: Arc<SshSession>) {
        self.sessions.insert(session.host().clone(), session);
    }

    /// Remove a session without closing it
    pub fn remove(&self, host: &HostId) -> Option<Arc<SshSession>> {
        self.sessions.remove(host).map(|(_, s)| s)
    }

    /// All sessions, in host order
    pub fn list(&self) -> Vec<Arc<SshSession>> {
        let mut sessions: Vec<_> = self.sessions.iter().map(|r| Arc::clone(&r)).collect();
        sessions.sort_by(|a, b| a.host().cmp(b.host()));
        sessions
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if the pool is empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close every session and drain the pool
    pub async fn close_all(&self) {
        let hosts: Vec<HostId> = self.sessions.iter().map(|r| r.key().clone()).collect();
        for host in hosts {
            if let Some((_, session)) = self.sessions.remove(&host) {
                session.close().await;
            }
        }
    }
}

impl Default for SessionPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Establishes N authenticated sessions in parallel
pub struct Orchestrator {
    settings: Settings,
}

impl Orchestrator {
    /// Create an orchestrator with the given settings
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Connect to every target concurrently and return the sessions that
    /// succeeded. Hosts without any auth method are skipped without
    /// dialing; failures are logged and excluded. Blocks until every
    /// attempt has finished.
    pub async fn connect_all(&self, targets: Vec<(HostId, HostConfig)>) -> SessionPool {
        let timeout = Duration::from_secs(self.settings.connect_timeout_secs);
        let keepalive = KeepAliveMonitor::from_settings(&self.settings);
        let keepalive = Arc::new(keepalive);

        let results = connect_each(targets, move |host, config| {
            let keepalive = Arc::clone(&keepalive);
            async move {
                let (handle, incoming) = connector::connect(&host, &config, timeout).await?;
                let session = Arc::new(SshSession::new(host.clone(), config, handle, incoming));
                session.register_task(keepalive.spawn(Arc::clone(&session)));
                info!("{}: connected", host);
                Ok(session)
            }
        })
        .await;

        let pool = SessionPool::new();
        for entry in results.iter() {
            pool.insert(Arc::clone(entry.value()));
        }
        pool
    }
}

/// Fan out one connect attempt per target and join them all. Targets with
/// no auth method configured are skipped before dialing. The map only ever
/// holds successes.
async fn connect_each<T, F, Fut>(
    targets: Vec<(HostId, HostConfig)>,
    connect: F,
) -> Arc<DashMap<HostId, T>>
where
    T: Send + Sync + 'static,
    F: Fn(HostId, HostConfig) -> Fut,
    Fut: Future<Output = Result<T, ConnectError>> + Send + 'static,
{
    let results = Arc::new(DashMap::new());
    let mut tasks = JoinSet::new();

    for (host, config) in targets {
        if config.auth_methods().is_empty() {
            warn!("{}: no auth method configured, skipping", host);
            continue;
        }

        let fut = connect(host.clone(), config);
        let results = Arc::clone(&results);
        tasks.spawn(async move {
            match fut.await {
                Ok(value) => {
                    results.insert(host, value);
                }
                Err(e) => {
                    warn!("{}: {}", host, e);
                }
            }
        });
    }

    // Completion barrier: wait for every attempt, slow and failing alike.
    while tasks.join_next().await.is_some() {}

    results
}
