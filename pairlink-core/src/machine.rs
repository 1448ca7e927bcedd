//! The connection state machine. One function of (state, input) decides every
//! transition; the host performs the returned actions in order.

use std::time::Duration;

use crate::event::{ConnectFailure, Event, LossReason};
use crate::peer::PeerIdentity;
use crate::policy::RestartPolicy;
use crate::role::RoleKind;
use crate::state::ConnectionState;

/// Stimulus fed to the machine: an owner call or a role outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Start,
    Dial { address: String },
    Stop,
    AcceptSucceeded { peer: PeerIdentity },
    DialSucceeded { peer: PeerIdentity },
    DialFailed { reason: ConnectFailure },
    /// Listener hit a genuine transport error (not a requested cancellation).
    ListenFailed { reason: ConnectFailure },
    Received { bytes: Vec<u8> },
    Sent { bytes: Vec<u8> },
    SessionLost { reason: LossReason },
    TransportUnavailable,
}

impl Input {
    pub fn name(&self) -> &'static str {
        match self {
            Input::Start => "start",
            Input::Dial { .. } => "dial",
            Input::Stop => "stop",
            Input::AcceptSucceeded { .. } => "accept-succeeded",
            Input::DialSucceeded { .. } => "dial-succeeded",
            Input::DialFailed { .. } => "dial-failed",
            Input::ListenFailed { .. } => "listen-failed",
            Input::Received { .. } => "received",
            Input::Sent { .. } => "sent",
            Input::SessionLost { .. } => "session-lost",
            Input::TransportUnavailable => "transport-unavailable",
        }
    }
}

/// Effect the host must perform. Cancels come first, then spawns, then emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CancelListener,
    CancelInitiator,
    CancelSession,
    SpawnListener { delay: Duration },
    SpawnInitiator { address: String },
    /// Start a session on the stream carried by the accept/dial result.
    SpawnSession,
    Emit(Event),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("{input} is not valid while {state}")]
    Rejected {
        state: ConnectionState,
        input: &'static str,
    },
    #[error("peer address must not be empty")]
    EmptyAddress,
}

/// Single-peer connection state machine.
#[derive(Debug, Clone)]
pub struct Machine {
    state: ConnectionState,
    peer: Option<PeerIdentity>,
    policy: RestartPolicy,
    /// Consecutive auto-restarts since the last connect or owner call.
    restarts: u32,
    /// Consecutive listener failures within that run of restarts.
    listen_failures: u32,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(RestartPolicy::default())
    }
}

impl Machine {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            state: ConnectionState::Idle,
            peer: None,
            policy,
            restarts: 0,
            listen_failures: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connected peer; None outside Connected.
    pub fn peer(&self) -> Option<&PeerIdentity> {
        self.peer.as_ref()
    }

    pub fn policy(&self) -> &RestartPolicy {
        &self.policy
    }

    pub fn consecutive_restarts(&self) -> u32 {
        self.restarts
    }

    pub fn consecutive_listener_failures(&self) -> u32 {
        self.listen_failures
    }

    /// The role that must be alive in the current state.
    pub fn active_role(&self) -> Option<RoleKind> {
        role_for(self.state)
    }

    /// Apply one input. On error the machine is unchanged.
    pub fn step(&mut self, input: Input) -> Result<Vec<Action>, TransitionError> {
        use ConnectionState::*;

        let old = self.state;
        let mut events = Vec::new();
        let (next, spawn) = match (old, input) {
            (Idle, Input::Start) => {
                self.reset_restarts();
                (
                    Listening,
                    Some(Action::SpawnListener {
                        delay: Duration::ZERO,
                    }),
                )
            }
            (Listening, Input::Start) | (Idle, Input::Stop) => return Ok(Vec::new()),
            (_, Input::Dial { address }) => {
                if address.trim().is_empty() {
                    return Err(TransitionError::EmptyAddress);
                }
                self.reset_restarts();
                (Connecting, Some(Action::SpawnInitiator { address }))
            }
            (_, Input::Stop) => {
                self.reset_restarts();
                (Idle, None)
            }
            (Listening, Input::AcceptSucceeded { peer })
            | (Connecting, Input::DialSucceeded { peer }) => {
                self.reset_restarts();
                events.push(Event::Connected { peer: peer.clone() });
                self.peer = Some(peer);
                (Connected, Some(Action::SpawnSession))
            }
            (Connecting, Input::DialFailed { reason }) => {
                events.push(Event::ConnectFailed { reason });
                self.restart(Duration::ZERO)
            }
            (Listening, Input::ListenFailed { reason }) => {
                events.push(Event::ConnectFailed { reason });
                self.listen_failures = self.listen_failures.saturating_add(1);
                if self.policy.allows_listener(self.listen_failures) {
                    let floor = self.policy.listener_delay_for(self.listen_failures);
                    self.restart(floor)
                } else {
                    self.reset_restarts();
                    (Idle, None)
                }
            }
            (Connected, Input::Received { bytes }) => {
                return Ok(vec![Action::Emit(Event::DataReceived { bytes })])
            }
            (Connected, Input::Sent { bytes }) => {
                return Ok(vec![Action::Emit(Event::DataSent { bytes })])
            }
            (Connected, Input::SessionLost { reason }) => {
                events.push(Event::ConnectionLost { reason });
                self.restart(Duration::ZERO)
            }
            (_, Input::TransportUnavailable) => {
                self.reset_restarts();
                events.push(Event::TransportUnavailable);
                (Idle, None)
            }
            (state, input) => {
                return Err(TransitionError::Rejected {
                    state,
                    input: input.name(),
                })
            }
        };

        let mut actions = Vec::with_capacity(events.len() + 3);
        // Leaving a state, or re-entering it with a fresh role, ends the role that owned it.
        if next != old || spawn.is_some() {
            if let Some(role) = role_for(old) {
                actions.push(cancel_action(role));
            }
        }
        if next != Connected {
            self.peer = None;
        }
        self.state = next;
        actions.extend(spawn);
        actions.extend(events.into_iter().map(Action::Emit));
        if next != old {
            actions.push(Action::Emit(Event::state_changed(old, next)));
        }
        Ok(actions)
    }

    /// Decide where an auto-restart lands: Listening after at least `floor`, or
    /// Idle once the policy gives up.
    fn restart(&mut self, floor: Duration) -> (ConnectionState, Option<Action>) {
        self.restarts = self.restarts.saturating_add(1);
        if self.policy.allows(self.restarts) {
            let delay = self.policy.delay_for(self.restarts).max(floor);
            (
                ConnectionState::Listening,
                Some(Action::SpawnListener { delay }),
            )
        } else {
            self.reset_restarts();
            (ConnectionState::Idle, None)
        }
    }

    fn reset_restarts(&mut self) {
        self.restarts = 0;
        self.listen_failures = 0;
    }
}

fn role_for(state: ConnectionState) -> Option<RoleKind> {
    match state {
        ConnectionState::Idle => None,
        ConnectionState::Listening => Some(RoleKind::Listener),
        ConnectionState::Connecting => Some(RoleKind::Initiator),
        ConnectionState::Connected => Some(RoleKind::Session),
    }
}

fn cancel_action(role: RoleKind) -> Action {
    match role {
        RoleKind::Listener => Action::CancelListener,
        RoleKind::Initiator => Action::CancelInitiator,
        RoleKind::Session => Action::CancelSession,
    }
}
