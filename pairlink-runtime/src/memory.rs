//! In-memory transport. The [`MemoryRemote`] side plays the other device: it
//! completes or fails dials, delivers incoming connections, and drives the far
//! end of each channel (send, EOF, read errors, write failures).

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use pairlink_core::PeerIdentity;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::transport::{closed_error, Acceptor, Channel, Connection, Transport};

const POLL_INTERVAL: Duration = Duration::from_millis(2);

struct Shared {
    unavailable: AtomicBool,
    acceptors: StdMutex<Vec<(CancellationToken, mpsc::UnboundedSender<Connection>)>>,
    dial_tx: mpsc::UnboundedSender<DialRequest>,
    dial_rx: Mutex<mpsc::UnboundedReceiver<DialRequest>>,
}

impl Shared {
    fn lock_acceptors(
        &self,
    ) -> std::sync::MutexGuard<'_, Vec<(CancellationToken, mpsc::UnboundedSender<Connection>)>> {
        self.acceptors
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

struct DialRequest {
    address: String,
    reply: oneshot::Sender<Result<Connection, TransportError>>,
}

/// Transport half handed to the manager.
#[derive(Clone)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

/// Control half kept by the test or demo.
#[derive(Clone)]
pub struct MemoryRemote {
    shared: Arc<Shared>,
}

impl MemoryTransport {
    pub fn with_remote() -> (MemoryTransport, MemoryRemote) {
        let (dial_tx, dial_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            unavailable: AtomicBool::new(false),
            acceptors: StdMutex::new(Vec::new()),
            dial_tx,
            dial_rx: Mutex::new(dial_rx),
        });
        (
            MemoryTransport {
                shared: shared.clone(),
            },
            MemoryRemote { shared },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn listen(&self) -> Result<Box<dyn Acceptor>, TransportError> {
        if self.shared.unavailable.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();
        self.shared.lock_acceptors().push((closed.clone(), tx));
        Ok(Box::new(MemoryAcceptor {
            incoming: Mutex::new(rx),
            closed,
        }))
    }

    async fn dial(&self, address: &str) -> Result<Connection, TransportError> {
        if self.shared.unavailable.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable);
        }
        let (reply, answer) = oneshot::channel();
        let request = DialRequest {
            address: address.to_string(),
            reply,
        };
        if self.shared.dial_tx.send(request).is_err() {
            return Err(TransportError::Unavailable);
        }
        answer.await.unwrap_or(Err(TransportError::Cancelled))
    }
}

impl MemoryRemote {
    /// Make every later listen/dial fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Whether some acceptor is currently open.
    pub fn is_listening(&self) -> bool {
        let mut acceptors = self.shared.lock_acceptors();
        acceptors.retain(|(closed, tx)| !closed.is_cancelled() && !tx.is_closed());
        !acceptors.is_empty()
    }

    /// Wait for an open acceptor and connect to it as `peer`.
    pub async fn connect_from(&self, peer: PeerIdentity) -> MemoryPeer {
        let (mut local, remote) = pair(peer);
        loop {
            {
                let mut acceptors = self.shared.lock_acceptors();
                acceptors.retain(|(closed, tx)| !closed.is_cancelled() && !tx.is_closed());
                if let Some((_, tx)) = acceptors.last() {
                    match tx.send(local) {
                        Ok(()) => return remote,
                        Err(mpsc::error::SendError(conn)) => local = conn,
                    }
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Wait for the next dial attempt.
    pub async fn next_dial(&self) -> Option<PendingDial> {
        let mut rx = self.shared.dial_rx.lock().await;
        rx.recv().await.map(|request| PendingDial { request })
    }
}

/// A dial attempt waiting for the remote side to answer.
pub struct PendingDial {
    request: DialRequest,
}

impl PendingDial {
    pub fn address(&self) -> &str {
        &self.request.address
    }

    /// Answer the dial; the returned peer drives the far end.
    pub fn accept(self, name: Option<&str>) -> MemoryPeer {
        let peer = match name {
            Some(name) => PeerIdentity::with_name(self.request.address.clone(), name),
            None => PeerIdentity::new(self.request.address.clone()),
        };
        let (local, remote) = pair(peer);
        let _ = self.request.reply.send(Ok(local));
        remote
    }

    pub fn fail(self, error: TransportError) {
        let _ = self.request.reply.send(Err(error));
    }
}

struct MemoryAcceptor {
    incoming: Mutex<mpsc::UnboundedReceiver<Connection>>,
    closed: CancellationToken,
}

#[async_trait]
impl Acceptor for MemoryAcceptor {
    async fn accept(&self) -> Result<Connection, TransportError> {
        let mut incoming = self.incoming.lock().await;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(TransportError::Closed),
            conn = incoming.recv() => conn.ok_or(TransportError::Closed),
        }
    }

    fn close(&self) {
        self.closed.cancel();
    }
}

enum Inbound {
    Data(Vec<u8>),
    Eof,
    Error(String),
}

struct Inbox {
    rx: mpsc::UnboundedReceiver<Inbound>,
    /// Bytes of a delivery larger than the caller's buffer.
    leftover: Vec<u8>,
}

struct MemoryChannel {
    inbox: Mutex<Inbox>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    fail_writes: Arc<AtomicBool>,
    closed: CancellationToken,
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inbox = self.inbox.lock().await;
        if !inbox.leftover.is_empty() {
            return Ok(take_into(&mut inbox.leftover, buf));
        }
        let next = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Err(closed_error()),
            next = inbox.rx.recv() => next,
        };
        match next {
            Some(Inbound::Data(mut data)) => {
                let n = take_into(&mut data, buf);
                inbox.leftover = data;
                Ok(n)
            }
            Some(Inbound::Eof) | None => Ok(0),
            Some(Inbound::Error(msg)) => Err(io::Error::new(io::ErrorKind::Other, msg)),
        }
    }

    async fn write(&self, buf: &[u8]) -> io::Result<()> {
        if self.closed.is_cancelled() {
            return Err(closed_error());
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
        }
        self.outbound
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
    }

    fn close(&self) {
        self.closed.cancel();
    }
}

/// Move up to `buf.len()` bytes from the front of `data` into `buf`.
fn take_into(data: &mut Vec<u8>, buf: &mut [u8]) -> usize {
    let n = data.len().min(buf.len());
    buf[..n].copy_from_slice(&data[..n]);
    data.drain(..n);
    n
}

/// Far end of an in-memory connection.
pub struct MemoryPeer {
    identity: PeerIdentity,
    to_local: mpsc::UnboundedSender<Inbound>,
    from_local: mpsc::UnboundedReceiver<Vec<u8>>,
    fail_writes: Arc<AtomicBool>,
    local_closed: CancellationToken,
}

impl MemoryPeer {
    pub fn identity(&self) -> &PeerIdentity {
        &self.identity
    }

    /// Deliver bytes to the local side's next read.
    pub fn send(&self, bytes: &[u8]) {
        let _ = self.to_local.send(Inbound::Data(bytes.to_vec()));
    }

    /// Close this end: the local read sees end of stream.
    pub fn close(&self) {
        let _ = self.to_local.send(Inbound::Eof);
    }

    /// Make the local side's next read fail.
    pub fn fail_read(&self, message: &str) {
        let _ = self.to_local.send(Inbound::Error(message.to_string()));
    }

    /// Make every later local write fail.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Next chunk the local side wrote; None once the channel is gone.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.from_local.recv().await
    }

    /// Whether the local side closed the channel.
    pub fn is_closed_locally(&self) -> bool {
        self.local_closed.is_cancelled()
    }

    /// Wait until the local side closes the channel.
    pub async fn closed_locally(&self) {
        self.local_closed.cancelled().await
    }
}

fn pair(identity: PeerIdentity) -> (Connection, MemoryPeer) {
    let (to_local, inbound_rx) = mpsc::unbounded_channel();
    let (outbound, from_local) = mpsc::unbounded_channel();
    let fail_writes = Arc::new(AtomicBool::new(false));
    let closed = CancellationToken::new();
    let channel = MemoryChannel {
        inbox: Mutex::new(Inbox {
            rx: inbound_rx,
            leftover: Vec::new(),
        }),
        outbound,
        fail_writes: fail_writes.clone(),
        closed: closed.clone(),
    };
    let remote = MemoryPeer {
        identity: identity.clone(),
        to_local,
        from_local,
        fail_writes,
        local_closed: closed,
    };
    (Connection::new(Arc::new(channel), identity), remote)
}
