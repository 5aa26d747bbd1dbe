use std::{env, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use hook_protocol::Flavor;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use tracing::debug;
use zbus::Connection;

use crate::logger::LogConfig;

pub const ENV_FLAVOR: &str = "HOOKBUS_FLAVOR";
pub const ENV_BUS: &str = "HOOKBUS_BUS";
pub const ENV_RETRY_INTERVAL_MS: &str = "HOOKBUS_RETRY_INTERVAL_MS";
pub const ENV_RETRY_MAX_WAIT_MS: &str = "HOOKBUS_RETRY_MAX_WAIT_MS";
pub const ENV_UNLOAD_GRACE_MS: &str = "HOOKBUS_UNLOAD_GRACE_MS";
pub const ENV_LOG_LEVEL: &str = "HOOKBUS_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "HOOKBUS_LOG_DIR";
pub const ENV_CLIENT_NAME: &str = "HOOKBUS_CLIENT_NAME";

/// Which message bus to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    #[default]
    Session,
    System,
}

impl BusKind {
    pub async fn connect(self) -> zbus::Result<Connection> {
        match self {
            BusKind::Session => Connection::session().await,
            BusKind::System => Connection::system().await,
        }
    }
}

/// Fixed-interval retry with an upper bound on the total wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            max_wait: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub flavor: Flavor,
    pub bus: BusKind,
    pub retry: RetryPolicy,
    /// How long the host waits for clients to clean up after unloading them.
    pub unload_grace: Duration,
    pub client_name: String,
    pub log: LogConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            flavor: Flavor::default(),
            bus: BusKind::default(),
            retry: RetryPolicy::default(),
            unload_grace: Duration::from_millis(250),
            client_name: "hookbus".to_string(),
            log: LogConfig::default(),
        }
    }
}

/// Load `path`, or `./.env` when `None`, into the process environment.
/// Missing files are fine; unreadable ones are not. Runs before logging is
/// set up, so the loaded path is returned for the caller to report.
pub fn load_env_file(path: Option<&Path>) -> Result<Option<PathBuf>> {
    match path {
        Some(path) => {
            dotenvy::from_path(path).with_context(|| format!("loading {}", path.display()))?;
            Ok(Some(path.to_path_buf()))
        }
        None => match dotenvy::dotenv() {
            Ok(found) => Ok(Some(found)),
            Err(err) if err.not_found() => {
                debug!("no .env file");
                Ok(None)
            }
            Err(err) => Err(err).context("loading .env"),
        },
    }
}

fn parse_millis(key: &str, raw: &str) -> Result<Duration> {
    let ms: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a number of milliseconds, got `{raw}`"))?;
    Ok(Duration::from_millis(ms))
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key → value source; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_FLAVOR) {
            config.flavor = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_FLAVOR}: unknown flavor `{raw}`"))?;
        }
        if let Some(raw) = lookup(ENV_BUS) {
            config.bus = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_BUS}: expected `session` or `system`, got `{raw}`"))?;
        }
        if let Some(raw) = lookup(ENV_RETRY_INTERVAL_MS) {
            config.retry.interval = parse_millis(ENV_RETRY_INTERVAL_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RETRY_MAX_WAIT_MS) {
            config.retry.max_wait = parse_millis(ENV_RETRY_MAX_WAIT_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_UNLOAD_GRACE_MS) {
            config.unload_grace = parse_millis(ENV_UNLOAD_GRACE_MS, &raw)?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|l| !l.trim().is_empty()) {
            config.log.level = level;
        }
        if let Some(dir) = lookup(ENV_LOG_DIR).filter(|d| !d.trim().is_empty()) {
            config.log.dir = Some(PathBuf::from(dir));
        }
        if let Some(name) = lookup(ENV_CLIENT_NAME).filter(|n| !n.trim().is_empty()) {
            config.client_name = name;
        }
        Ok(config)
    }
}
