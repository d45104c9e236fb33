//! Log file sink and subscriber installation.
//!
//! The log file is opened in append mode and every JSON line reaches it in a
//! single `write` call, so several processes can share one file.

use crate::json_layer::JsonLayer;
use crate::LogConfig;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// `~/.tokenkeeper/logs/session.jsonl`
fn default_log_path() -> io::Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".tokenkeeper/logs/session.jsonl"))
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "home directory not found"))
}

/// `RUST_LOG` when set, otherwise the configured level.
fn level_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Shared append-only handle to the log file.
#[derive(Clone)]
pub struct CentralLogWriter {
    file: Arc<Mutex<File>>,
}

impl CentralLogWriter {
    /// Open `path` for appending, creating it and its parent directories.
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }
}

impl Write for CentralLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.lock().write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.lock().write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for CentralLogWriter {
    type Writer = CentralLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Install the JSONL file layer and, when asked, a compact stderr layer.
///
/// Fails only if the log file cannot be opened. An already installed global
/// subscriber is left in place.
pub(crate) fn try_init_subscriber(config: &LogConfig) -> io::Result<()> {
    let log_path = config
        .log_path
        .clone()
        .map_or_else(default_log_path, Ok)?;
    let file = CentralLogWriter::new(&log_path)?;

    let json = JsonLayer::new(config.service_name.clone(), file, config.redact_secrets)
        .with_filter(level_filter(&config.default_level));
    let stderr = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(io::stderr)
            .with_filter(level_filter(&config.default_level))
    });

    if tracing_subscriber::registry()
        .with(json)
        .with(stderr)
        .try_init()
        .is_ok()
    {
        tracing::info!(
            log_path = %log_path.display(),
            service = %config.service_name,
            "logging initialized"
        );
    }
    Ok(())
}
