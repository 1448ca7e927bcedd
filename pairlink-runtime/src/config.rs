//! Manager tuning. Deserializable so hosts can embed it in their own config file.

use std::time::Duration;

use pairlink_core::RestartPolicy;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    /// Session read buffer (default 1024). Each read emits at most this many bytes.
    pub read_buffer_size: usize,
    /// Bound on one dial attempt; none waits for the transport's own timeout.
    pub dial_timeout_ms: Option<u64>,
    /// How long an owner call waits for a cancelled role to finish (default 2000).
    pub shutdown_grace_ms: u64,
    pub restart: RestartPolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 1024,
            dial_timeout_ms: None,
            shutdown_grace_ms: 2000,
            restart: RestartPolicy::default(),
        }
    }
}

impl ManagerConfig {
    pub fn dial_timeout(&self) -> Option<Duration> {
        self.dial_timeout_ms.map(Duration::from_millis)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }
}
