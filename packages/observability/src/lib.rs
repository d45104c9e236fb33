//! # Observability
//!
//! Logging layer shared by every tokenkeeper crate.
//!
//! Library code only ever uses `tracing` macros with structured fields:
//!
//! ```rust,ignore
//! tracing::info!(user_id = %user_id, tier = "remote", "token record restored");
//! ```
//!
//! The embedding application calls [`init`] or [`init_with_config`] once at
//! startup. Events are written as JSONL to a central file
//! (`~/.tokenkeeper/logs/session.jsonl` by default), one object per line, with
//! credential-looking fields replaced by `[REDACTED]` before they reach disk.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "fitness-app".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! ```

mod json_layer;
mod redact;
mod writer;

use std::path::PathBuf;

pub use json_layer::{JsonLayer, LogEntry};
pub use redact::{redact_fields, redact_value, REDACTED};
pub use writer::CentralLogWriter;

/// Logging setup for one process.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the emitting service, included in every log line.
    pub service_name: String,

    /// Default level filter (e.g. "debug", "info"). `RUST_LOG` wins when set.
    pub default_level: String,

    /// Defaults to `~/.tokenkeeper/logs/session.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit compact logs to stderr.
    pub also_stderr: bool,

    /// Replace credential-looking field values with `[REDACTED]`.
    /// Only disable this for local debugging.
    pub redact_secrets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
            redact_secrets: true,
        }
    }
}

/// Install logging with defaults for `service_name`.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Install the global subscriber described by `config`.
///
/// If the log file cannot be opened, logging falls back to a compact stderr
/// subscriber instead of failing the host application. Calling this more than
/// once is harmless; only the first subscriber is installed.
pub fn init_with_config(config: LogConfig) {
    if let Err(e) = writer::try_init_subscriber(&config) {
        use tracing_subscriber::util::SubscriberInitExt;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_level)),
            )
            .with_target(true)
            .compact()
            .with_writer(std::io::stderr)
            .finish()
            .try_init();
        tracing::warn!(error = %e, "log file unavailable, logging to stderr only");
    }
}

pub use tracing::{debug, error, info, instrument, trace, warn, Level};
