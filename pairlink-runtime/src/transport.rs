//! Transport capability consumed by the manager: listen/accept, dial, and a
//! duplex byte channel once connected.

use std::fmt;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use pairlink_core::PeerIdentity;

use crate::error::TransportError;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a listening resource. `Unavailable` means the transport cannot work at all.
    async fn listen(&self) -> Result<Box<dyn Acceptor>, TransportError>;

    /// One dial attempt. Dropping the future abandons the attempt and releases
    /// whatever was partially opened.
    async fn dial(&self, address: &str) -> Result<Connection, TransportError>;
}

#[async_trait]
pub trait Acceptor: Send + Sync {
    /// Wait for one incoming connection. Fails with `Closed` once `close` was called.
    async fn accept(&self) -> Result<Connection, TransportError>;

    /// Idempotent.
    fn close(&self);
}

/// Duplex byte stream. One read and one write may be in flight at once.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Ok(0) is end of stream.
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `buf`.
    async fn write(&self, buf: &[u8]) -> io::Result<()>;

    /// Idempotent; in-flight read/write return an error promptly.
    fn close(&self);
}

/// A connected stream and who is on the other end.
#[derive(Clone)]
pub struct Connection {
    pub channel: Arc<dyn Channel>,
    pub peer: PeerIdentity,
}

impl Connection {
    pub fn new(channel: Arc<dyn Channel>, peer: PeerIdentity) -> Self {
        Self { channel, peer }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

pub(crate) fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "channel closed")
}
