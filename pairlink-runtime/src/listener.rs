//! Listener role: one accept, then hand the stream to the manager and stop.

use std::sync::Arc;
use std::time::Duration;

use crate::error::TransportError;
use crate::role::{RoleContext, RoleHandle, RoleReport};
use crate::transport::Transport;

pub(crate) fn spawn(transport: Arc<dyn Transport>, delay: Duration, ctx: RoleContext) -> RoleHandle {
    let task = tokio::spawn(run(transport, delay, ctx.clone()));
    RoleHandle::new(&ctx, task)
}

async fn run(transport: Arc<dyn Transport>, delay: Duration, ctx: RoleContext) {
    if !delay.is_zero() {
        tracing::debug!(generation = %ctx.generation, ?delay, "listener waiting before restart");
        tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    let acceptor = tokio::select! {
        _ = ctx.cancel.cancelled() => return,
        opened = transport.listen() => match opened {
            Ok(acceptor) => acceptor,
            Err(TransportError::Unavailable) => {
                ctx.report(RoleReport::TransportUnavailable);
                return;
            }
            Err(e) => {
                tracing::warn!(generation = %ctx.generation, error = %e, "listen failed");
                ctx.report(RoleReport::ListenFailed(e.to_failure()));
                return;
            }
        }
    };
    tracing::debug!(generation = %ctx.generation, "listening");

    // Cancellation closes the listening resource, which ends the accept.
    let accepted = tokio::select! {
        _ = ctx.cancel.cancelled() => {
            acceptor.close();
            Err(TransportError::Closed)
        }
        accepted = acceptor.accept() => accepted,
    };
    // Reporting may spawn the next listener synchronously; this one must be gone first.
    acceptor.close();
    drop(acceptor);

    match accepted {
        Ok(conn) if ctx.is_cancelled() => {
            tracing::trace!(peer = %conn.peer, "accepted after cancellation; closing");
            conn.channel.close();
        }
        Ok(conn) => ctx.report(RoleReport::Accepted(conn)),
        Err(_) if ctx.is_cancelled() => {}
        Err(TransportError::Unavailable) => ctx.report(RoleReport::TransportUnavailable),
        Err(e) => {
            tracing::warn!(generation = %ctx.generation, error = %e, "accept failed");
            ctx.report(RoleReport::ListenFailed(e.to_failure()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Weak;

    use async_trait::async_trait;
    use pairlink_core::{Generation, PeerIdentity, RoleKind};
    use tokio::sync::mpsc;

    use crate::memory::MemoryTransport;
    use crate::role::testing::{context, sink};
    use crate::role::ReportSink;
    use crate::transport::{Acceptor, Connection};

    /// Memory transport whose acceptors count themselves while alive.
    struct CountingTransport {
        inner: MemoryTransport,
        live: Arc<AtomicUsize>,
        fail_accept: bool,
    }

    struct CountedAcceptor {
        inner: Box<dyn Acceptor>,
        live: Arc<AtomicUsize>,
        fail_accept: bool,
    }

    impl Drop for CountedAcceptor {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn listen(&self) -> Result<Box<dyn Acceptor>, TransportError> {
            let inner = self.inner.listen().await?;
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountedAcceptor {
                inner,
                live: self.live.clone(),
                fail_accept: self.fail_accept,
            }))
        }

        async fn dial(&self, address: &str) -> Result<Connection, TransportError> {
            self.inner.dial(address).await
        }
    }

    #[async_trait]
    impl Acceptor for CountedAcceptor {
        async fn accept(&self) -> Result<Connection, TransportError> {
            if self.fail_accept {
                return Err(TransportError::Io(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    "address in use",
                )));
            }
            self.inner.accept().await
        }

        fn close(&self) {
            self.inner.close();
        }
    }

    /// Notes how many acceptors were alive when each report arrived.
    struct LiveSink {
        live: Arc<AtomicUsize>,
        tx: mpsc::UnboundedSender<(usize, RoleReport)>,
    }

    impl ReportSink for LiveSink {
        fn on_role_result(&self, _role: RoleKind, _generation: Generation, report: RoleReport) {
            let _ = self.tx.send((self.live.load(Ordering::SeqCst), report));
        }
    }

    fn counting(
        fail_accept: bool,
    ) -> (
        Arc<CountingTransport>,
        crate::memory::MemoryRemote,
        Arc<LiveSink>,
        mpsc::UnboundedReceiver<(usize, RoleReport)>,
    ) {
        let (inner, remote) = MemoryTransport::with_remote();
        let live = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(LiveSink {
            live: live.clone(),
            tx,
        });
        let transport = Arc::new(CountingTransport {
            inner,
            live,
            fail_accept,
        });
        (transport, remote, sink, rx)
    }

    fn live_context(sink: &Arc<LiveSink>) -> RoleContext {
        let weak: Weak<LiveSink> = Arc::downgrade(sink);
        let weak: Weak<dyn ReportSink> = weak;
        RoleContext::new(RoleKind::Listener, Generation::default().bump(), weak)
    }

    #[tokio::test]
    async fn reports_one_accepted_connection() {
        let (transport, remote) = MemoryTransport::with_remote();
        let (sink, mut reports) = sink();
        let ctx = context(RoleKind::Listener, &sink);
        let handle = spawn(Arc::new(transport), Duration::ZERO, ctx);

        remote.connect_from(PeerIdentity::new("AA:BB")).await;
        let (role, _, report) = reports.recv().await.unwrap();
        assert_eq!(role, RoleKind::Listener);
        match report {
            RoleReport::Accepted(conn) => assert_eq!(conn.peer.address(), "AA:BB"),
            other => panic!("unexpected report {:?}", other),
        }
        handle.cancel().await.unwrap();
        assert!(!remote.is_listening());
    }

    #[tokio::test]
    async fn requested_cancel_is_silent() {
        let (transport, remote) = MemoryTransport::with_remote();
        let (sink, mut reports) = sink();
        let handle = spawn(
            Arc::new(transport),
            Duration::ZERO,
            context(RoleKind::Listener, &sink),
        );
        while !remote.is_listening() {
            tokio::task::yield_now().await;
        }
        handle.cancel().await.unwrap();
        assert!(!remote.is_listening());
        assert!(reports.try_recv().is_err());
    }

    #[tokio::test]
    async fn unavailable_transport_is_reported() {
        let (transport, remote) = MemoryTransport::with_remote();
        remote.set_unavailable(true);
        let (sink, mut reports) = sink();
        spawn(
            Arc::new(transport),
            Duration::ZERO,
            context(RoleKind::Listener, &sink),
        );
        let (_, _, report) = reports.recv().await.unwrap();
        assert!(matches!(report, RoleReport::TransportUnavailable));
    }

    #[tokio::test]
    async fn cancel_during_restart_delay() {
        let (transport, remote) = MemoryTransport::with_remote();
        let (sink, mut reports) = sink();
        let handle = spawn(
            Arc::new(transport),
            Duration::from_secs(60),
            context(RoleKind::Listener, &sink),
        );
        tokio::time::timeout(Duration::from_secs(5), handle.cancel())
            .await
            .unwrap()
            .unwrap();
        assert!(!remote.is_listening());
        assert!(reports.try_recv().is_err());
    }

    #[tokio::test]
    async fn acceptor_is_released_before_failure_is_reported() {
        let (transport, _remote, sink, mut reports) = counting(true);
        spawn(transport, Duration::ZERO, live_context(&sink));

        let (live, report) = reports.recv().await.unwrap();
        assert!(matches!(report, RoleReport::ListenFailed(_)));
        assert_eq!(live, 0);
    }

    #[tokio::test]
    async fn acceptor_is_released_before_accept_is_reported() {
        let (transport, remote, sink, mut reports) = counting(false);
        spawn(transport, Duration::ZERO, live_context(&sink));

        let _peer = remote.connect_from(PeerIdentity::new("AA:BB")).await;
        let (live, report) = reports.recv().await.unwrap();
        assert!(matches!(report, RoleReport::Accepted(_)));
        assert_eq!(live, 0);
    }
}
