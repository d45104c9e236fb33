//! Logging initialization.
//!
//! Thin wrapper over the observability crate. Every tokenkeeper crate logs
//! through `tracing`; the host application calls [`init_logging`] once.

use crate::Paths;
use observability::LogConfig;

/// Log to `~/.tokenkeeper/logs/session.jsonl` as `token-session`.
///
/// `RUST_LOG` overrides `level`. `TOKENKEEPER_LOG_STDERR=1` mirrors output
/// to stderr and `TOKENKEEPER_LOG_UNREDACTED=1` turns credential redaction
/// off.
pub fn init_logging(level: &str) {
    init_logging_for_service("token-session", level);
}

pub fn init_logging_for_service(service_name: &str, level: &str) {
    let log_path = Paths::new().ok().map(|paths| paths.log_file());

    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        log_path,
        also_stderr: env_flag("TOKENKEEPER_LOG_STDERR"),
        redact_secrets: !env_flag("TOKENKEEPER_LOG_UNREDACTED"),
    });
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|raw| matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Parse a level name, accepting "warning" for WARN. Unknown names are INFO.
pub fn parse_level(level: &str) -> tracing::Level {
    let level = level.trim();
    if level.eq_ignore_ascii_case("warning") {
        return tracing::Level::WARN;
    }
    level.parse().unwrap_or(tracing::Level::INFO)
}
