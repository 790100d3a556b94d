use conduit_primitives::PeerInfo;
use std::net::SocketAddr;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Per-connection metadata the host server attaches to the extensions of every request.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Address of the remote end of the connection.
    pub remote_addr: SocketAddr,
    /// Cancelled once the connection is gone or the server shuts down.
    pub cancel: CancellationToken,
}

impl ConnectionInfo {
    pub fn new(remote_addr: SocketAddr, cancel: CancellationToken) -> Self {
        Self {
            remote_addr,
            cancel,
        }
    }
}

/// Request-scoped context handed to a dispatcher.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Who sent the request.
    pub peer: PeerInfo,
    /// Verbose diagnostics were requested for this request.
    pub debug: bool,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(peer: PeerInfo, cancel: CancellationToken) -> Self {
        Self {
            peer,
            debug: false,
            cancel,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Whether the connection carrying this request is already gone.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the connection carrying this request goes away.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}
