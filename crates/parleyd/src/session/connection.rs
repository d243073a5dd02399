//! One accepted connection, from transcript acquisition to teardown.

use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::transport::ConnectionHandler;

use super::SESSION_TARGET;
use super::closer::{CloseReason, ConnectionCloser};
use super::protocol::{Action, TOO_LONG_REPLY, classify_and_respond};
use super::reader::{Frame, LineReader};
use super::transcript::{ClientId, TranscriptError, TranscriptSink, TranscriptStore};
use super::watchdog::Watchdog;

/// Session-fatal failures. Every one of them ends in the same teardown.
#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error("failed to clone connection handle: {source}")]
    Handle {
        #[source]
        source: io::Error,
    },
    #[error("failed to start inactivity watchdog: {source}")]
    Watchdog {
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Transcript(#[from] TranscriptError),
    #[error("failed to read from client: {source}")]
    Read {
        #[source]
        source: io::Error,
    },
    #[error("failed to write reply: {source}")]
    Write {
        #[source]
        source: io::Error,
    },
}

/// How a session ended when nothing went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionOutcome {
    PeerClosed,
    ClientQuit,
    IdleTimeout,
}

/// Per-session tunables.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionSettings {
    pub(crate) idle_timeout: Duration,
}

struct Session {
    peer: SocketAddr,
    client: ClientId,
    writer: TcpStream,
    reader: LineReader<TcpStream>,
    closer: Arc<ConnectionCloser>,
    watchdog: Watchdog,
    transcript: Box<dyn TranscriptSink>,
}

impl Session {
    /// Connecting phase: acquires the transcript and arms the watchdog. The
    /// session is active once this returns and closed once `close` returns.
    fn open(
        stream: TcpStream,
        peer: SocketAddr,
        settings: SessionSettings,
        store: &dyn TranscriptStore,
    ) -> Result<Self, SessionError> {
        let client = ClientId::from_peer(peer);
        let transcript = store.open(&client)?;

        let read_half = stream
            .try_clone()
            .map_err(|source| SessionError::Handle { source })?;
        let close_half = stream
            .try_clone()
            .map_err(|source| SessionError::Handle { source })?;
        let closer = Arc::new(ConnectionCloser::new(close_half));

        let expiring = Arc::clone(&closer);
        let idle_timeout = settings.idle_timeout;
        let watchdog = Watchdog::start(format!("parleyd-idle-{peer}"), idle_timeout, move || {
            if expiring.close(CloseReason::IdleTimeout) {
                info!(
                    target: SESSION_TARGET,
                    peer = %peer,
                    timeout_secs = idle_timeout.as_secs_f64(),
                    "inactivity timeout reached"
                );
            }
        })
        .map_err(|source| SessionError::Watchdog { source })?;

        Ok(Self {
            peer,
            client,
            writer: stream,
            reader: LineReader::new(read_half),
            closer,
            watchdog,
            transcript,
        })
    }

    /// Serves the connection until it ends, then tears it down.
    fn run(mut self) -> Result<SessionOutcome, SessionError> {
        let result = self.serve();
        self.close();
        result
    }

    fn serve(&mut self) -> Result<SessionOutcome, SessionError> {
        loop {
            if self.closer.timed_out() {
                return Ok(SessionOutcome::IdleTimeout);
            }

            let frame = match self.reader.next_frame() {
                Ok(frame) => frame,
                Err(source) => return self.stream_failure(SessionError::Read { source }),
            };
            let now = OffsetDateTime::now_utc();
            let action = match frame {
                Frame::EndOfStream => return Ok(self.end_of_stream()),
                Frame::Oversized { seen } => {
                    self.watchdog.reset();
                    warn!(
                        target: SESSION_TARGET,
                        peer = %self.peer,
                        bytes = seen,
                        "rejecting oversized line"
                    );
                    Action::RejectTooLong
                }
                Frame::Line(raw) => {
                    self.watchdog.reset();
                    classify_and_respond(&raw, now)
                }
            };

            if let Some(outcome) = self.step(action, now)? {
                return Ok(outcome);
            }
        }
    }

    /// Applies one action. A broken stream after expiry still ends as a timeout.
    fn step(
        &mut self,
        action: Action,
        now: OffsetDateTime,
    ) -> Result<Option<SessionOutcome>, SessionError> {
        self.apply(action, now)
            .or_else(|error| self.stream_failure(error).map(Some))
    }

    fn apply(
        &mut self,
        action: Action,
        now: OffsetDateTime,
    ) -> Result<Option<SessionOutcome>, SessionError> {
        match action {
            Action::RejectTooLong => self.send(TOO_LONG_REPLY)?,
            Action::Reply(text) => self.send(&text)?,
            Action::ReplyAndClose(text) => {
                self.send(&text)?;
                return Ok(Some(SessionOutcome::ClientQuit));
            }
            Action::ReplyAndLog(text) => {
                self.transcript.append(now, &text)?;
                debug!(
                    target: SESSION_TARGET,
                    peer = %self.peer,
                    line = %text,
                    "received line"
                );
                self.send(&format!("{text}\n"))?;
            }
        }
        Ok(None)
    }

    fn send(&mut self, reply: &str) -> Result<(), SessionError> {
        self.writer
            .write_all(reply.as_bytes())
            .and_then(|()| self.writer.flush())
            .map_err(|source| SessionError::Write { source })
    }

    /// A broken stream after the watchdog fired is the timeout, not a fault.
    fn stream_failure(&self, error: SessionError) -> Result<SessionOutcome, SessionError> {
        match error {
            SessionError::Read { .. } | SessionError::Write { .. } if self.closer.timed_out() => {
                Ok(SessionOutcome::IdleTimeout)
            }
            other => Err(other),
        }
    }

    fn end_of_stream(&self) -> SessionOutcome {
        if self.closer.timed_out() {
            SessionOutcome::IdleTimeout
        } else {
            SessionOutcome::PeerClosed
        }
    }

    /// Releases the watchdog, the socket, and the transcript. Consuming
    /// `self` means this can only happen once.
    fn close(mut self) {
        debug!(target: SESSION_TARGET, client = %self.client, "session closing");
        self.watchdog.stop();
        self.closer.close(CloseReason::Teardown);
        debug!(target: SESSION_TARGET, client = %self.client, "session closed");
    }
}

/// Runs a [`Session`] for every accepted connection.
pub(crate) struct SessionHandler {
    settings: SessionSettings,
    store: Arc<dyn TranscriptStore>,
}

impl SessionHandler {
    pub(crate) fn new(settings: SessionSettings, store: Arc<dyn TranscriptStore>) -> Self {
        Self { settings, store }
    }
}

impl ConnectionHandler for SessionHandler {
    fn handle(&self, stream: TcpStream, peer: SocketAddr) {
        let session = match Session::open(stream, peer, self.settings, self.store.as_ref()) {
            Ok(session) => session,
            Err(error) => {
                warn!(
                    target: SESSION_TARGET,
                    peer = %peer,
                    error = %error,
                    "failed to open session"
                );
                return;
            }
        };
        info!(target: SESSION_TARGET, peer = %peer, "client connected");

        match session.run() {
            Ok(outcome) => info!(
                target: SESSION_TARGET,
                peer = %peer,
                outcome = ?outcome,
                "client disconnected"
            ),
            Err(error) => warn!(
                target: SESSION_TARGET,
                peer = %peer,
                error = %error,
                "client disconnected after error"
            ),
        }
    }
}
