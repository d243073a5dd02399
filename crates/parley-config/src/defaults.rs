use std::time::Duration;

use crate::logging::LogFormat;

/// Port the server listens on when `--port` is not supplied.
pub const DEFAULT_PORT: u16 = 4000;

/// Listen on every interface unless told otherwise.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Directory that receives per-client transcripts.
pub const DEFAULT_LOG_DIR: &str = ".";

/// Idle window after which a silent connection is closed by the server.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default log filter expression used by the binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Function form of [`DEFAULT_LOG_FILTER`], used by `Config::default`.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default operator log format.
pub fn default_log_format() -> LogFormat {
    LogFormat::Compact
}
