//! Event channel: one-directional, ordered delivery from the manager to its owner.

use pairlink_core::Event;
use tokio::sync::mpsc;

/// Manager side. Sending never blocks, so it is safe under the manager lock.
#[derive(Debug, Clone)]
pub(crate) struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    pub(crate) fn emit(&self, event: Event) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event stream dropped; discarding event");
        }
    }
}

/// Owner side. Events arrive in the order the manager produced them.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventStream {
    /// Next event; None once the manager is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Next already-queued event, without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Everything queued right now.
    pub fn drain(&mut self) -> Vec<Event> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

pub(crate) fn channel() -> (EventSender, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventStream { rx })
}
