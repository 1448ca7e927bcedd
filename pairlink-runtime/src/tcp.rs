//! TCP transport: listen on a fixed local address, dial `host:port` peers.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use pairlink_core::PeerIdentity;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::transport::{closed_error, Acceptor, Channel, Connection, Transport};

#[derive(Debug, Clone)]
pub struct TcpTransport {
    listen_addr: SocketAddr,
}

impl TcpTransport {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self { listen_addr }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn listen(&self) -> Result<Box<dyn Acceptor>, TransportError> {
        let listener = TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::PermissionDenied | io::ErrorKind::AddrNotAvailable => {
                    TransportError::Unavailable
                }
                _ => TransportError::Io(e),
            })?;
        tracing::debug!(addr = %self.listen_addr, "tcp listener bound");
        Ok(Box::new(TcpAcceptor {
            listener,
            closed: CancellationToken::new(),
        }))
    }

    async fn dial(&self, address: &str) -> Result<Connection, TransportError> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::ConnectionRefused => TransportError::Rejected(e.to_string()),
                io::ErrorKind::TimedOut => TransportError::TimedOut,
                _ => TransportError::Unreachable(format!("{}: {}", address, e)),
            })?;
        let peer = PeerIdentity::new(
            stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| address.to_string()),
        );
        Ok(Connection::new(Arc::new(TcpChannel::new(stream)), peer))
    }
}

struct TcpAcceptor {
    listener: TcpListener,
    closed: CancellationToken,
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    async fn accept(&self) -> Result<Connection, TransportError> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(TransportError::Closed),
            accepted = self.listener.accept() => {
                let (stream, addr) = accepted?;
                Ok(Connection::new(
                    Arc::new(TcpChannel::new(stream)),
                    PeerIdentity::new(addr.to_string()),
                ))
            }
        }
    }

    fn close(&self) {
        self.closed.cancel();
    }
}

/// Split TCP stream; each half behind its own lock so a read and a write can overlap.
pub struct TcpChannel {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    closed: CancellationToken,
}

impl TcpChannel {
    pub fn new(stream: TcpStream) -> Self {
        let _ = stream.set_nodelay(true);
        let (reader, writer) = stream.into_split();
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Channel for TcpChannel {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut reader = self.reader.lock().await;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(closed_error()),
            n = reader.read(buf) => n,
        }
    }

    async fn write(&self, buf: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(closed_error()),
            r = async {
                writer.write_all(buf).await?;
                writer.flush().await
            } => r,
        }
    }

    /// The socket itself is released (FIN sent) when the last handle drops.
    fn close(&self) {
        self.closed.cancel();
    }
}
