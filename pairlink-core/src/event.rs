//! Events delivered to the owner, and the failure taxonomy they carry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::peer::PeerIdentity;
use crate::state::ConnectionState;

/// Why a connection attempt (dial, or a genuine listener error) failed.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum ConnectFailure {
    AddressUnreachable,
    Rejected,
    Timeout,
    /// Dial was cancelled before it completed.
    Cancelled,
    /// Any other transport error, with its message.
    Io(String),
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectFailure::AddressUnreachable => f.write_str("address unreachable"),
            ConnectFailure::Rejected => f.write_str("rejected by peer"),
            ConnectFailure::Timeout => f.write_str("timed out"),
            ConnectFailure::Cancelled => f.write_str("cancelled"),
            ConnectFailure::Io(msg) => write!(f, "i/o error: {}", msg),
        }
    }
}

/// Why a live session ended without being asked to.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum LossReason {
    /// Peer closed its end (EOF on read).
    PeerClosed,
    /// Read or write failed.
    IoError(String),
}

impl fmt::Display for LossReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossReason::PeerClosed => f.write_str("peer closed"),
            LossReason::IoError(msg) => write!(f, "i/o error: {}", msg),
        }
    }
}

/// Owner-facing notification. Immutable once constructed.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Event {
    StateChanged {
        old: ConnectionState,
        new: ConnectionState,
    },
    Connected {
        peer: PeerIdentity,
    },
    ConnectFailed {
        reason: ConnectFailure,
    },
    ConnectionLost {
        reason: LossReason,
    },
    DataReceived {
        bytes: Vec<u8>,
    },
    /// Acknowledges a completed write.
    DataSent {
        bytes: Vec<u8>,
    },
    /// Transport has no capability at all (e.g. radio disabled). Not retried.
    TransportUnavailable,
}

impl Event {
    pub fn state_changed(old: ConnectionState, new: ConnectionState) -> Self {
        Event::StateChanged { old, new }
    }
}
