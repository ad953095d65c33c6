//! Background liveness probing
//!
//! One monitor task per session: probe every interval, count consecutive
//! failures, close the session once the configured maximum is reached.
//! The task runs for the session's lifetime and stops with it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use shoal_core::config::Settings;

use crate::session::SshSession;

/// Probes a session and closes it after too many consecutive failures
pub struct KeepAliveMonitor {
    /// Probe interval
    pub interval: Duration,
    /// Consecutive failures tolerated before the session is closed
    pub max_failures: u32,
}

impl KeepAliveMonitor {
    /// Create a monitor with explicit parameters
    pub fn new(interval: Duration, max_failures: u32) -> Self {
        Self {
            interval,
            max_failures,
        }
    }

    /// Monitor configured from the process-wide settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Duration::from_secs(settings.keepalive_interval_secs),
            settings.keepalive_max_failures,
        )
    }

    /// Start probing `session`. The task ends when the session closes,
    /// whether by this monitor or by any other path.
    pub fn spawn(&self, session: Arc<SshSession>) -> JoinHandle<()> {
        let interval = self.interval;
        let max_failures = self.max_failures;
        let cancel = session.cancel_token();

        tokio::spawn(async move {
            let mut failures = 0u32;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }

                if session.probe().await {
                    failures = 0;
                } else {
                    failures += 1;
                    debug!(
                        "{}: keepalive failure {}/{}",
                        session.host(),
                        failures,
                        max_failures
                    );
                }

                if failures >= max_failures {
                    warn!(
                        "{}: {} consecutive keepalive failures, closing session",
                        session.host(),
                        failures
                    );
                    session.close().await;
                    return;
                }
            }
        })
    }
}

impl Default for KeepAliveMonitor {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), 5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parameters() {
        let monitor = KeepAliveMonitor::default();
        assert_eq!(monitor.interval, Duration::from_secs(30));
        assert_eq!(monitor.max_failures, 5);
    }

    #[test]
    fn test_from_settings() {
        let mut settings = Settings::default();
        settings.keepalive_interval_secs = 7;
        settings.keepalive_max_failures = 2;

        let monitor = KeepAliveMonitor::from_settings(&settings);
        assert_eq!(monitor.interval, Duration::from_secs(7));
        assert_eq!(monitor.max_failures, 2);
    }
}
