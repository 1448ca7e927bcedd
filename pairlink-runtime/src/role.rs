//! Plumbing shared by the three roles: how they report back, and the handle
//! the manager keeps to cancel them.

use std::sync::Weak;

use pairlink_core::{ConnectFailure, Generation, LossReason, RoleKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::transport::Connection;

/// What a role hands back to the manager.
#[derive(Debug)]
pub(crate) enum RoleReport {
    Accepted(Connection),
    Dialed(Connection),
    DialFailed(ConnectFailure),
    ListenFailed(ConnectFailure),
    Received(Vec<u8>),
    Sent(Vec<u8>),
    Lost(LossReason),
    TransportUnavailable,
}

/// The manager's single entry point for role outcomes.
pub(crate) trait ReportSink: Send + Sync {
    fn on_role_result(&self, role: RoleKind, generation: Generation, report: RoleReport);
}

/// Identity and cancellation signal a role carries while it runs.
#[derive(Clone)]
pub(crate) struct RoleContext {
    pub(crate) role: RoleKind,
    pub(crate) generation: Generation,
    pub(crate) cancel: CancellationToken,
    sink: Weak<dyn ReportSink>,
}

impl RoleContext {
    pub(crate) fn new(role: RoleKind, generation: Generation, sink: Weak<dyn ReportSink>) -> Self {
        Self {
            role,
            generation,
            cancel: CancellationToken::new(),
            sink,
        }
    }

    /// True once the manager asked this role to stop.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Hand a result to the manager. Dropped silently if the manager is gone.
    pub(crate) fn report(&self, report: RoleReport) {
        match self.sink.upgrade() {
            Some(sink) => sink.on_role_result(self.role, self.generation, report),
            None => tracing::trace!(role = %self.role, generation = %self.generation, "manager gone; dropping report"),
        }
    }
}

/// Running role as seen by the manager.
pub(crate) struct RoleHandle {
    pub(crate) generation: Generation,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RoleHandle {
    pub(crate) fn new(ctx: &RoleContext, task: JoinHandle<()>) -> Self {
        Self {
            generation: ctx.generation,
            cancel: ctx.cancel.clone(),
            task,
        }
    }

    /// Signal the role to stop. Idempotent; returns the task so the caller may await it.
    pub(crate) fn cancel(self) -> JoinHandle<()> {
        self.cancel.cancel();
        self.task
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording sink for exercising a role without a manager.

    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;

    pub(crate) struct RecordingSink {
        tx: mpsc::UnboundedSender<(RoleKind, Generation, RoleReport)>,
    }

    impl ReportSink for RecordingSink {
        fn on_role_result(&self, role: RoleKind, generation: Generation, report: RoleReport) {
            let _ = self.tx.send((role, generation, report));
        }
    }

    pub(crate) fn sink() -> (
        Arc<RecordingSink>,
        mpsc::UnboundedReceiver<(RoleKind, Generation, RoleReport)>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(RecordingSink { tx }), rx)
    }

    pub(crate) fn context(role: RoleKind, sink: &Arc<RecordingSink>) -> RoleContext {
        let weak: Weak<RecordingSink> = Arc::downgrade(sink);
        let weak: Weak<dyn ReportSink> = weak;
        RoleContext::new(role, Generation::default().bump(), weak)
    }
}
