//! Pairlink runtime: a single-peer connection manager running listener,
//! initiator and session roles as tokio tasks over a pluggable transport.
//! Results reach the owner only through the ordered [`EventStream`].

pub mod config;
pub mod error;
pub mod events;
mod initiator;
mod listener;
pub mod manager;
pub mod memory;
mod role;
mod session;
pub mod tcp;
pub mod transport;

pub use config::ManagerConfig;
pub use error::{ManagerError, TransportError};
pub use events::EventStream;
pub use manager::{ActiveRoles, ConnectionManager};
pub use transport::{Acceptor, Channel, Connection, Transport};

pub use pairlink_core::{
    ConnectFailure, ConnectionState, Event, LossReason, PeerIdentity, RestartPolicy,
};
