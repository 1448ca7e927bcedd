//! Peer identity: transport address plus an optional display name.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Immutable identity of the remote end. Produced by the transport on accept/dial.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PeerIdentity {
    address: String,
    name: Option<String>,
}

impl PeerIdentity {
    /// Identity with an address only; the name may be learned later.
    pub fn new(address: impl Into<String>) -> Self {
        PeerIdentity {
            address: address.into(),
            name: None,
        }
    }

    pub fn with_name(address: impl Into<String>, name: impl Into<String>) -> Self {
        PeerIdentity {
            address: address.into(),
            name: Some(name.into()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name if known, otherwise the address.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => f.write_str(&self.address),
        }
    }
}
