//! Load config from file and environment.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use pairlink_runtime::ManagerConfig;
use serde::Deserialize;

/// Peer configuration. File: ~/.config/pairlink/config.toml or /etc/pairlink/config.toml.
/// Env overrides: PAIRLINK_LISTEN, PAIRLINK_DIAL_TIMEOUT_MS.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Local TCP listen address (default 0.0.0.0:45700).
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Peer to dial right after startup.
    #[serde(default)]
    pub dial: Option<String>,
    /// Manager tuning: buffer size, dial timeout, restart policy.
    #[serde(default)]
    pub manager: ManagerConfig,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 45700))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            dial: None,
            manager: ManagerConfig::default(),
        }
    }
}

/// Load config: defaults, then the explicit or first existing config file, then env vars.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let mut c = match explicit {
        Some(path) => read_file(path)?,
        None => {
            let home = std::env::var_os("HOME").map(PathBuf::from);
            load_file(home.as_deref(), Path::new(SYSTEM_CONFIG)).unwrap_or_default()
        }
    };
    apply_env(&mut c, |key| std::env::var(key).ok());
    Ok(c)
}

fn read_file(path: &Path) -> anyhow::Result<Config> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&s).with_context(|| format!("parsing config {}", path.display()))
}

const SYSTEM_CONFIG: &str = "/etc/pairlink/config.toml";

/// The per-user file shadows `system`. A broken file is reported and defaults are used.
fn load_file(home: Option<&Path>, system: &Path) -> Option<Config> {
    let user = home.map(|h| h.join(".config").join("pairlink").join("config.toml"));
    let path = match user {
        Some(user) if user.is_file() => user,
        _ if system.is_file() => system.to_path_buf(),
        _ => return None,
    };
    match read_file(&path) {
        Ok(c) => {
            tracing::debug!(path = %path.display(), "loaded config");
            Some(c)
        }
        Err(e) => {
            tracing::warn!("ignoring config file: {:#}", e);
            None
        }
    }
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("PAIRLINK_LISTEN") {
        match s.parse::<SocketAddr>() {
            Ok(addr) => c.listen = addr,
            Err(_) => tracing::warn!(value = %s, "PAIRLINK_LISTEN is not a socket address"),
        }
    }
    if let Some(s) = var("PAIRLINK_DIAL_TIMEOUT_MS") {
        match s.parse::<u64>() {
            Ok(ms) => c.manager.dial_timeout_ms = Some(ms),
            Err(_) => tracing::warn!(value = %s, "PAIRLINK_DIAL_TIMEOUT_MS is not a number"),
        }
    }
}
