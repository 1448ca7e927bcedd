//! Errors: the synchronous owner-facing ones, and what a transport can report.

use pairlink_core::{ConnectFailure, TransitionError};

/// Returned synchronously from owner calls. Runtime faults arrive as events instead.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("not connected")]
    NotConnected,
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Error reported by a transport's listen, accept or dial.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No capability at all (hardware absent or disabled).
    #[error("transport unavailable")]
    Unavailable,
    #[error("address unreachable: {0}")]
    Unreachable(String),
    #[error("connection rejected: {0}")]
    Rejected(String),
    #[error("timed out")]
    TimedOut,
    #[error("cancelled")]
    Cancelled,
    /// The resource was closed while the call was in flight.
    #[error("closed")]
    Closed,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    pub fn to_failure(&self) -> ConnectFailure {
        match self {
            TransportError::Unreachable(_) => ConnectFailure::AddressUnreachable,
            TransportError::Rejected(_) => ConnectFailure::Rejected,
            TransportError::TimedOut => ConnectFailure::Timeout,
            TransportError::Cancelled => ConnectFailure::Cancelled,
            other => ConnectFailure::Io(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_onto_failure_taxonomy() {
        assert_eq!(
            TransportError::Unreachable("X".into()).to_failure(),
            ConnectFailure::AddressUnreachable
        );
        assert_eq!(
            TransportError::Rejected("busy".into()).to_failure(),
            ConnectFailure::Rejected
        );
        assert_eq!(TransportError::TimedOut.to_failure(), ConnectFailure::Timeout);
        assert_eq!(TransportError::Cancelled.to_failure(), ConnectFailure::Cancelled);
        assert_eq!(
            TransportError::Closed.to_failure(),
            ConnectFailure::Io("closed".into())
        );
    }
}
