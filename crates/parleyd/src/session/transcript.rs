//! Append-only per-client transcripts of plain-text lines.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::net::SocketAddr;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use time::OffsetDateTime;

use super::protocol::format_timestamp;

/// Errors raised while opening or writing a transcript.
#[derive(Debug, Error)]
pub enum TranscriptError {
    /// The transcript directory could not be created.
    #[error("failed to create transcript directory '{path}': {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The transcript file could not be opened for appending.
    #[error("failed to open transcript '{path}': {source}")]
    Open {
        /// Transcript file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Appending an entry failed.
    #[error("failed to append to transcript '{path}': {source}")]
    Append {
        /// Transcript file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Filesystem-safe identity of a client, derived from its peer address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ClientId(String);

impl ClientId {
    /// `127.0.0.1:5000` becomes `127.0.0.1_5000`; anything other than ASCII
    /// alphanumerics and dots becomes `_`.
    pub(crate) fn from_peer(peer: SocketAddr) -> Self {
        let sanitized = peer
            .to_string()
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '.' {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        Self(sanitized)
    }

    pub(crate) fn file_name(&self) -> String {
        format!("{}.log", self.0)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Destination for one client's plain-text lines.
pub(crate) trait TranscriptSink {
    /// Appends `[timestamp] message\n` as a single entry.
    fn append(&mut self, at: OffsetDateTime, message: &str) -> Result<(), TranscriptError>;
}

/// Opens transcript sinks by client identity.
pub(crate) trait TranscriptStore: Send + Sync + 'static {
    fn open(&self, client: &ClientId) -> Result<Box<dyn TranscriptSink>, TranscriptError>;
}

/// Stores transcripts as `<client>.log` files in one directory.
#[derive(Debug, Clone)]
pub(crate) struct DirectoryStore {
    dir: Utf8PathBuf,
}

impl DirectoryStore {
    /// Creates `dir` (and parents) if missing.
    pub(crate) fn prepare(dir: &Utf8Path) -> Result<Self, TranscriptError> {
        fs::create_dir_all(dir).map_err(|source| TranscriptError::CreateDirectory {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub(crate) fn path_for(&self, client: &ClientId) -> Utf8PathBuf {
        self.dir.join(client.file_name())
    }
}

impl TranscriptStore for DirectoryStore {
    fn open(&self, client: &ClientId) -> Result<Box<dyn TranscriptSink>, TranscriptError> {
        let path = self.path_for(client);
        let transcript = FileTranscript::open(path)?;
        Ok(Box::new(transcript))
    }
}

/// Transcript backed by a file opened in append mode.
#[derive(Debug)]
pub(crate) struct FileTranscript {
    path: Utf8PathBuf,
    file: File,
}

impl FileTranscript {
    pub(crate) fn open(path: Utf8PathBuf) -> Result<Self, TranscriptError> {
        let mut options = OpenOptions::new();
        options.append(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }
        match options.open(&path) {
            Ok(file) => Ok(Self { path, file }),
            Err(source) => Err(TranscriptError::Open { path, source }),
        }
    }
}

impl TranscriptSink for FileTranscript {
    fn append(&mut self, at: OffsetDateTime, message: &str) -> Result<(), TranscriptError> {
        let entry = format!("[{}] {message}\n", format_timestamp(at));
        self.file
            .write_all(entry.as_bytes())
            .and_then(|()| self.file.flush())
            .map_err(|source| TranscriptError::Append {
                path: self.path.clone(),
                source,
            })
    }
}
