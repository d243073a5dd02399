//! Line-oriented TCP text server.
//!
//! Clients connect over TCP and exchange newline-delimited UTF-8 lines. A
//! small in-band language is understood:
//!
//! - `hello` and `bye` (any casing) greet and say goodbye, the latter closing
//!   the connection;
//! - `/time`, `/echo <text>`, and `/quit` are slash commands;
//! - a blank line prompts the client to say something;
//! - anything else is plain text, appended with a timestamp to a transcript
//!   file named after the client's address and echoed back.
//!
//! Lines longer than [`MAX_LINE_BYTES`] are refused, and a connection that
//! stays silent for the configured idle timeout is closed by the server.
//!
//! Each connection runs on its own thread; the inactivity watchdog runs on a
//! second one and closes the socket underneath the blocking read when it
//! expires.

mod server;
mod session;
mod shutdown;
mod telemetry;
mod transport;

pub use server::{RunningServer, ServerError, run, run_until, start};
pub use session::{MAX_LINE_BYTES, TranscriptError};
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};
pub use transport::ListenerError;

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

#[cfg(test)]
mod tests;
