//! Per-connection protocol sessions.
//!
//! A session owns one accepted connection. It frames the inbound bytes into
//! lines ([`reader`]), decides what each line means ([`protocol`]), appends
//! plain text to the client's transcript ([`transcript`]) and replies. An
//! inactivity [`watchdog`] runs beside the read loop and closes the socket
//! through a shared [`closer`] when the client goes quiet; the read loop sees
//! the closed socket and ends the session as a timeout.

mod closer;
mod connection;
mod protocol;
mod reader;
mod transcript;
mod watchdog;

pub(crate) use self::connection::{SessionHandler, SessionSettings};
pub use self::protocol::MAX_LINE_BYTES;
pub(crate) use self::transcript::DirectoryStore;
pub use self::transcript::TranscriptError;

#[cfg(test)]
pub(crate) use self::transcript::{ClientId, TranscriptSink, TranscriptStore};

const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");
