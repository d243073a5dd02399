//! Idempotent, thread-safe close of a live connection.

use std::io;
use std::net::{Shutdown, TcpStream};
use std::sync::OnceLock;

use tracing::debug;

use super::SESSION_TARGET;

/// Who asked for the connection to close first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseReason {
    IdleTimeout,
    Teardown,
}

/// Something that can sever both directions of a connection.
pub(crate) trait Hangup: Send + Sync {
    fn hang_up(&self) -> io::Result<()>;
}

impl Hangup for TcpStream {
    fn hang_up(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

/// Cancellation token shared by the read loop and the watchdog.
///
/// The first [`close`](Self::close) records its reason and shuts the socket
/// down, which makes a blocking read on any clone of it return promptly.
/// Later calls are no-ops.
pub(crate) struct ConnectionCloser<H = TcpStream> {
    handle: H,
    reason: OnceLock<CloseReason>,
}

impl<H: Hangup> ConnectionCloser<H> {
    pub(crate) fn new(handle: H) -> Self {
        Self {
            handle,
            reason: OnceLock::new(),
        }
    }

    /// Returns `true` when this call performed the close.
    pub(crate) fn close(&self, reason: CloseReason) -> bool {
        if self.reason.set(reason).is_err() {
            return false;
        }
        if let Err(error) = self.handle.hang_up()
            && error.kind() != io::ErrorKind::NotConnected
        {
            debug!(
                target: SESSION_TARGET,
                error = %error,
                "connection shutdown reported an error"
            );
        }
        true
    }

    pub(crate) fn reason(&self) -> Option<CloseReason> {
        self.reason.get().copied()
    }

    pub(crate) fn timed_out(&self) -> bool {
        self.reason() == Some(CloseReason::IdleTimeout)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    #[derive(Default)]
    struct CountingHangup(AtomicUsize);

    impl Hangup for Arc<CountingHangup> {
        fn hang_up(&self) -> io::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn first_close_wins_and_hangs_up_once() {
        let counter = Arc::new(CountingHangup::default());
        let closer = ConnectionCloser::new(Arc::clone(&counter));

        assert!(closer.close(CloseReason::IdleTimeout));
        assert!(!closer.close(CloseReason::Teardown));
        assert_eq!(closer.reason(), Some(CloseReason::IdleTimeout));
        assert!(closer.timed_out());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn racing_closes_hang_up_once() {
        let counter = Arc::new(CountingHangup::default());
        let closer = Arc::new(ConnectionCloser::new(Arc::clone(&counter)));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let closer = Arc::clone(&closer);
                thread::spawn(move || closer.close(CloseReason::Teardown))
            })
            .collect();
        let winners = threads
            .into_iter()
            .map(|handle| handle.join().expect("join closer"))
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shutdown_unblocks_a_pending_read() {
        use std::io::Read;
        use std::net::TcpListener;

        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let addr = listener.local_addr().expect("addr");
        let _client = TcpStream::connect(addr).expect("connect");
        let (server, _) = listener.accept().expect("accept");
        let closer = ConnectionCloser::new(server.try_clone().expect("clone"));

        let reader = thread::spawn(move || {
            let mut server = server;
            let mut buf = [0_u8; 16];
            server.read(&mut buf)
        });
        thread::sleep(std::time::Duration::from_millis(50));
        assert!(closer.close(CloseReason::IdleTimeout));

        // Either a zero-length read or an error is acceptable; hanging is not.
        if let Ok(read) = reader.join().expect("join reader") {
            assert_eq!(read, 0, "read should observe the close");
        }
    }
}
