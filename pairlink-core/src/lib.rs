//! Pairlink single-peer connection state machine.
//! Host-driven: no I/O; host feeds role outcomes in and performs the returned actions.

pub mod event;
pub mod machine;
pub mod peer;
pub mod policy;
pub mod role;
pub mod state;

pub use event::{ConnectFailure, Event, LossReason};
pub use machine::{Action, Input, Machine, TransitionError};
pub use peer::PeerIdentity;
pub use policy::RestartPolicy;
pub use role::{Generation, RoleKind};
pub use state::ConnectionState;
