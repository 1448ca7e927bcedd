//! Role kinds and the generation tag used to discard results from superseded roles.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum RoleKind {
    Listener,
    Initiator,
    Session,
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoleKind::Listener => "listener",
            RoleKind::Initiator => "initiator",
            RoleKind::Session => "session",
        })
    }
}

/// Monotonically increasing tag, one per spawned role instance.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Serialize, Deserialize)]
pub struct Generation(u64);

impl Generation {
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Advance in place and return the new value.
    pub fn bump(&mut self) -> Generation {
        self.0 = self.0.saturating_add(1);
        *self
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}
