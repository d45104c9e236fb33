//! Configuration, paths, errors and logging setup shared by the tokenkeeper crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    ConflictPolicy, Config, DEFAULT_BURST_WINDOW_MS, DEFAULT_LOG_LEVEL, DEFAULT_MAX_BURST,
    DEFAULT_REMOTE_PUBLISHABLE_KEY, DEFAULT_REMOTE_TABLE, DEFAULT_REMOTE_TIMEOUT_MS,
    DEFAULT_REMOTE_URL, DEFAULT_SETTLE_DELAY_MS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
