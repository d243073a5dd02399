//! Configuration surface shared by the parley server binary and its tests.
//!
//! Everything is supplied on the command line. The only value the wire
//! protocol cares about is the listening port; the rest tune where
//! transcripts land, how long idle clients are tolerated, and how operator
//! telemetry is rendered.

mod defaults;
mod logging;

use std::ffi::OsString;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use thiserror::Error;

pub use defaults::{
    DEFAULT_HOST, DEFAULT_IDLE_TIMEOUT, DEFAULT_LOG_DIR, DEFAULT_LOG_FILTER, DEFAULT_PORT,
    default_log_filter, default_log_format,
};
pub use logging::LogFormat;

/// Resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(
    name = "parleyd",
    version,
    about = "Line-oriented TCP text server with per-client transcripts"
)]
pub struct Config {
    /// Port number to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Host or address to bind.
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    /// Directory receiving one transcript file per client address.
    #[arg(long, value_name = "DIR", default_value = DEFAULT_LOG_DIR)]
    log_dir: Utf8PathBuf,
    /// Seconds of silence tolerated before a client is disconnected.
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_IDLE_TIMEOUT.as_secs())]
    idle_timeout_secs: u64,
    /// Tracing filter expression for operator logs (for example `debug`).
    #[arg(long, default_value = DEFAULT_LOG_FILTER)]
    log_filter: String,
    /// Operator log format: `json` or `compact`.
    #[arg(long, default_value_t = default_log_format())]
    log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: DEFAULT_HOST.to_owned(),
            log_dir: Utf8PathBuf::from(DEFAULT_LOG_DIR),
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT.as_secs(),
            log_filter: default_log_filter().to_owned(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Parses the configuration from the process arguments.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_iter(std::env::args_os())
    }

    /// Parses the configuration from an explicit argument list. The first
    /// item is the program name, as with [`std::env::args_os`].
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config = Self::try_parse_from(args)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::ZeroIdleTimeout);
        }
        Ok(())
    }

    /// Port the listener binds.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Host or address the listener binds.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Directory holding per-client transcripts.
    #[must_use]
    pub fn log_dir(&self) -> &Utf8Path {
        &self.log_dir
    }

    /// Inactivity window enforced on every connection.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Operator log format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns a copy listening on `host:port`. Mostly useful to tests that
    /// need an ephemeral port.
    #[must_use]
    pub fn with_listen_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Returns a copy writing transcripts under `dir`.
    #[must_use]
    pub fn with_log_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }
}

/// Errors raised while loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Command-line parsing failed, or help/version output was requested.
    #[error(transparent)]
    Cli(#[from] clap::Error),
    /// An idle timeout of zero would disconnect every client immediately.
    #[error("idle timeout must be at least one second")]
    ZeroIdleTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clap_definition_is_consistent() {
        use clap::CommandFactory;
        Config::command().debug_assert();
    }

    #[test]
    fn default_matches_parsed_defaults() {
        let parsed = Config::load_from_iter(["parleyd"]).expect("defaults should parse");
        assert_eq!(parsed, Config::default());
    }
}
