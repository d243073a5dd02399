//! Shared harness for driving sessions over loopback TCP.

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use tempfile::TempDir;

use crate::session::{ClientId, DirectoryStore, SessionHandler, SessionSettings, TranscriptStore};
use crate::transport::ConnectionHandler;

const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Temporary transcript directory plus a handler writing into it.
pub(super) struct SessionWorld {
    _dir: TempDir,
    store: DirectoryStore,
    handler: Arc<SessionHandler>,
}

impl SessionWorld {
    pub(super) fn new(idle_timeout: Duration) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        let store = DirectoryStore::prepare(&path).expect("prepare store");
        let handler = Arc::new(SessionHandler::new(
            SessionSettings { idle_timeout },
            Arc::new(store.clone()),
        ));
        Self {
            _dir: dir,
            store,
            handler,
        }
    }

    pub(super) fn connect(&self) -> Client {
        Client::connect(Arc::clone(&self.handler))
    }

    /// Transcript contents for `client`, empty when nothing was written.
    pub(super) fn transcript(&self, client: &Client) -> String {
        let path = self.store.path_for(&ClientId::from_peer(client.local_addr()));
        match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => String::new(),
            Err(error) => panic!("failed to read transcript {path}: {error}"),
        }
    }
}

/// Builds a handler around an arbitrary store.
pub(super) fn handler_with_store(
    idle_timeout: Duration,
    store: impl TranscriptStore,
) -> Arc<SessionHandler> {
    Arc::new(SessionHandler::new(
        SessionSettings { idle_timeout },
        Arc::new(store),
    ))
}

/// Client end of a connection whose server end runs a session on a thread.
pub(super) struct Client {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
    server: Option<JoinHandle<()>>,
}

impl Client {
    pub(super) fn connect(handler: Arc<SessionHandler>) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind loopback");
        let addr = listener.local_addr().expect("listener addr");
        let writer = TcpStream::connect(addr).expect("connect client");
        let (stream, peer) = listener.accept().expect("accept client");
        let server = thread::spawn(move || handler.handle(stream, peer));

        writer
            .set_read_timeout(Some(CLIENT_READ_TIMEOUT))
            .expect("set read timeout");
        let reader = BufReader::new(writer.try_clone().expect("clone client stream"));
        Self {
            writer,
            reader,
            server: Some(server),
        }
    }

    pub(super) fn local_addr(&self) -> SocketAddr {
        self.writer.local_addr().expect("client local addr")
    }

    pub(super) fn send(&mut self, line: &str) {
        self.writer
            .write_all(line.as_bytes())
            .expect("write to server");
    }

    pub(super) fn try_send(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())
    }

    pub(super) fn send_bytes(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).expect("write to server");
    }

    pub(super) fn reply(&mut self) -> String {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).expect("read reply");
        assert_ne!(read, 0, "server closed before replying");
        line
    }

    /// Sends `line` and returns the single reply it produced.
    pub(super) fn exchange(&mut self, line: &str) -> String {
        self.send(line);
        self.reply()
    }

    /// True when the server has closed its end.
    pub(super) fn is_closed(&mut self) -> bool {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => true,
            Ok(_) => panic!("unexpected data after close: {line:?}"),
            Err(error) => matches!(
                error.kind(),
                io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
            ),
        }
    }

    /// Waits for the server-side session to return.
    pub(super) fn join_server(&mut self) {
        if let Some(server) = self.server.take() {
            let deadline = Instant::now() + CLIENT_READ_TIMEOUT;
            while !server.is_finished() {
                assert!(Instant::now() < deadline, "session did not finish");
                thread::sleep(Duration::from_millis(10));
            }
            server.join().expect("session thread panicked");
        }
    }
}
