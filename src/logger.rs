use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing::Subscriber;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

/// Target of the per-dispatch event lines written to the JSON log.
pub const EVENTS_TARGET: &str = "events";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// An `EnvFilter` directive, e.g. `info` or `hookbus=debug,zbus=warn`.
    pub level: String,
    /// When set, logs also go to daily rolling files in this directory.
    pub dir: Option<PathBuf>,
    /// File name prefix, usually the running role (`host`, `client`).
    pub prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            prefix: "hookbus".to_string(),
        }
    }
}

/// Keeps the file writers flushing; drop it last.
#[must_use]
#[derive(Default)]
pub struct LogGuard {
    _guards: Vec<WorkerGuard>,
}

fn file_writer(dir: &Path, name: String) -> (tracing_appender::non_blocking::NonBlocking, WorkerGuard) {
    tracing_appender::non_blocking(RollingFileAppender::new(Rotation::DAILY, dir, name))
}

/// Build the subscriber without installing it.
///
/// - stderr gets human readable lines filtered by `config.level`.
/// - `<dir>/<prefix>.log` gets the same lines without colours.
/// - `<dir>/<prefix>-events.json` gets one JSON line per dispatched event,
///   whatever `config.level` says.
pub fn build_subscriber(config: &LogConfig) -> Result<(impl Subscriber + Send + Sync + 'static, LogGuard)> {
    let env_filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("invalid log level `{}`", config.level))?;

    let mut guard = LogGuard::default();
    let (text_layer, json_layer) = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            let (text, text_guard) = file_writer(dir, format!("{}.log", config.prefix));
            let (json, json_guard) = file_writer(dir, format!("{}-events.json", config.prefix));
            guard._guards.extend([text_guard, json_guard]);
            (
                Some(fmt::layer().with_writer(text).with_ansi(false)),
                Some(
                    fmt::layer()
                        .json()
                        .with_writer(json)
                        .with_target(true)
                        .with_filter(EnvFilter::new(format!("{EVENTS_TARGET}=info"))),
                ),
            )
        }
        None => (None, None),
    };

    let human = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .and_then(text_layer)
        .with_filter(env_filter);
    let subscriber = Registry::default().with(human).with(json_layer);
    Ok((subscriber, guard))
}

/// Install the global subscriber.
///
/// Installing twice is not an error; the second call keeps the first subscriber.
pub fn init_tracing(config: &LogConfig) -> Result<LogGuard> {
    let (subscriber, guard) = build_subscriber(config)?;
    if subscriber.try_init().is_err() {
        tracing::debug!("tracing already initialised");
    }
    Ok(guard)
}
