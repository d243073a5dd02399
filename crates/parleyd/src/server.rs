//! Server bootstrap: telemetry, transcript directory, listener, shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use parley_config::Config;

use crate::SERVER_TARGET;
use crate::session::{DirectoryStore, SessionHandler, SessionSettings, TranscriptError};
use crate::shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};
use crate::telemetry::{self, TelemetryError};
use crate::transport::{ListenerError, ListenerHandle, SocketListener};

/// Errors that stop the server from starting or shutting down cleanly.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The transcript directory could not be prepared.
    #[error("failed to prepare transcript directory: {source}")]
    Transcripts {
        /// Underlying transcript error.
        #[source]
        source: TranscriptError,
    },
    /// Binding or running the listener failed.
    #[error("listener failure: {source}")]
    Listener {
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
    /// Waiting for a termination signal failed.
    #[error("failed to wait for shutdown: {source}")]
    Shutdown {
        /// Underlying signal error.
        #[source]
        source: ShutdownError,
    },
}

/// A listening server whose accept loop runs in the background.
pub struct RunningServer {
    local_addr: SocketAddr,
    listener: ListenerHandle,
}

impl RunningServer {
    /// Address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and waits for the accept loop to exit.
    /// Sessions already running finish on their own.
    pub fn stop(self) -> Result<(), ServerError> {
        self.listener.shutdown();
        self.listener
            .join()
            .map_err(|source| ServerError::Listener { source })
    }
}

/// Prepares the transcript directory, binds the listener, and starts
/// accepting connections. Telemetry is left to the caller.
pub fn start(config: &Config) -> Result<RunningServer, ServerError> {
    let store = DirectoryStore::prepare(config.log_dir())
        .map_err(|source| ServerError::Transcripts { source })?;
    let settings = SessionSettings {
        idle_timeout: config.idle_timeout(),
    };
    let handler = Arc::new(SessionHandler::new(settings, Arc::new(store)));

    let listener = SocketListener::bind(config.host(), config.port())
        .map_err(|source| ServerError::Listener { source })?;
    let local_addr = listener.local_addr();
    let listener = listener
        .start(handler)
        .map_err(|source| ServerError::Listener { source })?;

    info!(
        target: SERVER_TARGET,
        address = %local_addr,
        transcripts = %config.log_dir(),
        idle_timeout_secs = config.idle_timeout().as_secs(),
        "server listening"
    );
    Ok(RunningServer {
        local_addr,
        listener,
    })
}

/// Runs the server until a termination signal arrives.
pub fn run(config: &Config) -> Result<(), ServerError> {
    run_until(config, &SystemShutdownSignal)
}

/// Runs the server until `signal` reports that shutdown should proceed.
pub fn run_until(config: &Config, signal: &dyn ShutdownSignal) -> Result<(), ServerError> {
    telemetry::initialise(config).map_err(|source| ServerError::Telemetry { source })?;
    let server = start(config)?;
    let waited = signal
        .wait()
        .map_err(|source| ServerError::Shutdown { source });
    let stopped = server.stop();
    info!(target: SERVER_TARGET, "server stopped");
    waited.and(stopped)
}
