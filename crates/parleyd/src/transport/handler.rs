//! Connection handling seam between the listener and the session layer.

use std::net::{SocketAddr, TcpStream};

/// Handles accepted socket connections.
pub(crate) trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection until it closes. Runs on a dedicated
    /// thread; implementations should avoid panicking.
    fn handle(&self, stream: TcpStream, peer: SocketAddr);
}
