//! Session role: owns the live stream. A read loop and a single queued writer
//! run as separate tasks; either one failing ends the whole session.

use std::sync::Arc;

use pairlink_core::LossReason;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::role::{RoleContext, RoleHandle, RoleReport};
use crate::transport::{Channel, Connection};

/// Live session as held by the manager.
pub(crate) struct SessionHandle {
    reader: RoleHandle,
    writer: JoinHandle<()>,
    channel: Arc<dyn Channel>,
    outbox: mpsc::UnboundedSender<Vec<u8>>,
}

impl SessionHandle {
    pub(crate) fn generation(&self) -> pairlink_core::Generation {
        self.reader.generation
    }

    /// Queue bytes behind any write already in flight. Never waits for I/O.
    pub(crate) fn enqueue(&self, bytes: Vec<u8>) -> Result<(), Vec<u8>> {
        self.outbox.send(bytes).map_err(|e| e.0)
    }

    /// Close the stream and stop both loops. Returns the tasks to await.
    pub(crate) fn cancel(self) -> Vec<JoinHandle<()>> {
        let reader = self.reader.cancel();
        self.channel.close();
        drop(self.outbox);
        vec![reader, self.writer]
    }
}

pub(crate) fn spawn(conn: Connection, read_buffer_size: usize, ctx: RoleContext) -> SessionHandle {
    let (outbox, queued) = mpsc::unbounded_channel();
    let channel = conn.channel;
    let reader = tokio::spawn(read_loop(channel.clone(), read_buffer_size, ctx.clone()));
    let writer = tokio::spawn(write_loop(channel.clone(), queued, ctx.clone()));
    SessionHandle {
        reader: RoleHandle::new(&ctx, reader),
        writer,
        channel,
        outbox,
    }
}

async fn read_loop(channel: Arc<dyn Channel>, buffer_size: usize, ctx: RoleContext) {
    let mut buf = vec![0u8; buffer_size.max(1)];
    loop {
        let read = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            read = channel.read(&mut buf) => read,
        };
        // A close we asked for surfaces here as an error or EOF; only report the ones we didn't.
        if ctx.is_cancelled() {
            break;
        }
        match read {
            Ok(0) => {
                tracing::info!(generation = %ctx.generation, "peer closed the session");
                ctx.report(RoleReport::Lost(LossReason::PeerClosed));
                break;
            }
            Ok(n) => ctx.report(RoleReport::Received(buf[..n].to_vec())),
            Err(e) => {
                tracing::warn!(generation = %ctx.generation, error = %e, "session read failed");
                ctx.report(RoleReport::Lost(LossReason::IoError(e.to_string())));
                break;
            }
        }
    }
    channel.close();
}

async fn write_loop(
    channel: Arc<dyn Channel>,
    mut queued: mpsc::UnboundedReceiver<Vec<u8>>,
    ctx: RoleContext,
) {
    loop {
        let bytes = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            next = queued.recv() => match next {
                Some(bytes) => bytes,
                None => break,
            },
        };
        match channel.write(&bytes).await {
            Ok(()) => ctx.report(RoleReport::Sent(bytes)),
            Err(_) if ctx.is_cancelled() => break,
            Err(e) => {
                // A failed write invalidates the whole session.
                tracing::warn!(generation = %ctx.generation, error = %e, "session write failed");
                ctx.report(RoleReport::Lost(LossReason::IoError(e.to_string())));
                channel.close();
                break;
            }
        }
    }
}
