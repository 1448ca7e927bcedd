//! Initiator role: a single dial attempt to one address.

use std::sync::Arc;
use std::time::Duration;

use pairlink_core::ConnectFailure;

use crate::error::TransportError;
use crate::role::{RoleContext, RoleHandle, RoleReport};
use crate::transport::Transport;

pub(crate) fn spawn(
    transport: Arc<dyn Transport>,
    address: String,
    timeout: Option<Duration>,
    ctx: RoleContext,
) -> RoleHandle {
    let task = tokio::spawn(run(transport, address, timeout, ctx.clone()));
    RoleHandle::new(&ctx, task)
}

async fn run(
    transport: Arc<dyn Transport>,
    address: String,
    timeout: Option<Duration>,
    ctx: RoleContext,
) {
    tracing::debug!(generation = %ctx.generation, %address, "dialing");
    let attempt = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, transport.dial(&address))
                .await
                .unwrap_or(Err(TransportError::TimedOut)),
            None => transport.dial(&address).await,
        }
    };
    // Dropping the attempt on cancellation releases anything it had opened.
    let outcome = tokio::select! {
        _ = ctx.cancel.cancelled() => Err(TransportError::Cancelled),
        outcome = attempt => outcome,
    };

    match outcome {
        Ok(conn) if ctx.is_cancelled() => {
            tracing::trace!(peer = %conn.peer, "dial completed after cancellation; closing");
            conn.channel.close();
            ctx.report(RoleReport::DialFailed(ConnectFailure::Cancelled));
        }
        Ok(conn) => ctx.report(RoleReport::Dialed(conn)),
        Err(TransportError::Unavailable) => ctx.report(RoleReport::TransportUnavailable),
        Err(e) => {
            if !ctx.is_cancelled() {
                tracing::warn!(generation = %ctx.generation, %address, error = %e, "dial failed");
            }
            ctx.report(RoleReport::DialFailed(e.to_failure()));
        }
    }
}
