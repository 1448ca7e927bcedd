//! The connection manager. Owner calls and role results both go through
//! [`Machine::step`] under one lock, so a transition and its events are atomic
//! with respect to every other transition.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use pairlink_core::{
    Action, ConnectionState, Event, Generation, Input, Machine, PeerIdentity, RoleKind,
    TransitionError,
};
use tokio::task::JoinHandle;

use crate::config::ManagerConfig;
use crate::error::ManagerError;
use crate::events::{self, EventSender, EventStream};
use crate::role::{ReportSink, RoleContext, RoleHandle, RoleReport};
use crate::session::{self, SessionHandle};
use crate::transport::{Connection, Transport};
use crate::{initiator, listener};

/// Which role handles are currently held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveRoles {
    pub listener: bool,
    pub initiator: bool,
    pub session: bool,
}

impl ActiveRoles {
    pub fn count(&self) -> usize {
        [self.listener, self.initiator, self.session]
            .iter()
            .filter(|alive| **alive)
            .count()
    }
}

/// Single-peer connection manager. At most one role is alive at a time.
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    this: Weak<Inner>,
    transport: Arc<dyn Transport>,
    config: ManagerConfig,
    events: EventSender,
    /// Serializes owner operations, including the wait for retired roles.
    control: tokio::sync::Mutex<()>,
    shared: Mutex<Shared>,
}

struct Shared {
    machine: Machine,
    generation: Generation,
    listener: Option<RoleHandle>,
    initiator: Option<RoleHandle>,
    session: Option<SessionHandle>,
}

impl Shared {
    fn live_generation(&self, role: RoleKind) -> Option<Generation> {
        match role {
            RoleKind::Listener => self.listener.as_ref().map(|h| h.generation),
            RoleKind::Initiator => self.initiator.as_ref().map(|h| h.generation),
            RoleKind::Session => self.session.as_ref().map(SessionHandle::generation),
        }
    }

    fn cancel(&mut self, role: RoleKind) -> Vec<JoinHandle<()>> {
        match role {
            RoleKind::Listener => self.listener.take().map(RoleHandle::cancel).into_iter().collect(),
            RoleKind::Initiator => self.initiator.take().map(RoleHandle::cancel).into_iter().collect(),
            RoleKind::Session => self.session.take().map(SessionHandle::cancel).unwrap_or_default(),
        }
    }

    fn cancel_all(&mut self) -> Vec<JoinHandle<()>> {
        let mut tasks = self.cancel(RoleKind::Listener);
        tasks.extend(self.cancel(RoleKind::Initiator));
        tasks.extend(self.cancel(RoleKind::Session));
        tasks
    }
}

/// Outcome of applying one step's actions: tasks just cancelled, and spawns still to perform.
#[derive(Default)]
struct Applied {
    retired: Vec<JoinHandle<()>>,
    spawns: Vec<Action>,
}

impl ConnectionManager {
    /// Build an Idle manager. Nothing runs until [`start`](Self::start) or [`dial`](Self::dial).
    pub fn new<T: Transport>(transport: T, config: ManagerConfig) -> (Self, EventStream) {
        let (events, stream) = events::channel();
        let inner = Arc::new_cyclic(|this| Inner {
            this: this.clone(),
            transport: Arc::new(transport),
            shared: Mutex::new(Shared {
                machine: Machine::new(config.restart.clone()),
                generation: Generation::default(),
                listener: None,
                initiator: None,
                session: None,
            }),
            config,
            events,
            control: tokio::sync::Mutex::new(()),
        });
        (Self { inner }, stream)
    }

    /// Begin waiting for an inbound peer. No-op while already Listening.
    pub async fn start(&self) -> Result<(), ManagerError> {
        self.inner.drive(Input::Start).await
    }

    /// Connect out to `address`, replacing whatever is running.
    pub async fn dial(&self, address: &str) -> Result<(), ManagerError> {
        self.inner
            .drive(Input::Dial {
                address: address.to_string(),
            })
            .await
    }

    /// Cancel every role and go Idle. Idempotent.
    pub async fn stop(&self) {
        if let Err(error) = self.inner.drive(Input::Stop).await {
            tracing::error!(%error, "stop rejected");
        }
    }

    /// Queue bytes on the live session. Completion arrives as `DataSent` or `ConnectionLost`.
    pub fn send(&self, bytes: impl Into<Vec<u8>>) -> Result<(), ManagerError> {
        let shared = self.inner.lock();
        if shared.machine.state() != ConnectionState::Connected {
            return Err(ManagerError::NotConnected);
        }
        let session = shared.session.as_ref().ok_or(ManagerError::NotConnected)?;
        session
            .enqueue(bytes.into())
            .map_err(|_| ManagerError::NotConnected)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().machine.state()
    }

    /// Peer of the live session, if Connected.
    pub fn connected_peer(&self) -> Option<PeerIdentity> {
        self.inner.lock().machine.peer().cloned()
    }

    pub fn is_running(&self) -> bool {
        self.state() != ConnectionState::Idle
    }

    pub fn active_roles(&self) -> ActiveRoles {
        let shared = self.inner.lock();
        ActiveRoles {
            listener: shared.listener.is_some(),
            initiator: shared.initiator.is_some(),
            session: shared.session.is_some(),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let tasks = self.inner.lock().cancel_all();
        if !tasks.is_empty() {
            tracing::debug!(roles = tasks.len(), "manager dropped; roles cancelled");
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Owner path: step, wait for superseded roles to finish, then spawn.
    async fn drive(&self, input: Input) -> Result<(), ManagerError> {
        let _control = self.control.lock().await;
        let applied = {
            let mut shared = self.lock();
            let actions = self.step(&mut shared, input)?;
            self.apply(&mut shared, actions)
        };
        self.retire(applied.retired).await;
        if !applied.spawns.is_empty() {
            let mut shared = self.lock();
            let mut no_connection = None;
            for spawn in applied.spawns {
                self.spawn(&mut shared, spawn, &mut no_connection);
            }
        }
        Ok(())
    }

    fn step(&self, shared: &mut Shared, input: Input) -> Result<Vec<Action>, TransitionError> {
        let old = shared.machine.state();
        let name = input.name();
        let actions = shared.machine.step(input)?;
        let new = shared.machine.state();
        if old != new {
            tracing::debug!(%old, %new, input = name, generation = %shared.generation, "transition");
        }
        Ok(actions)
    }

    /// Perform cancels and emits in order; collect spawns for the caller.
    fn apply(&self, shared: &mut Shared, actions: Vec<Action>) -> Applied {
        let mut applied = Applied::default();
        for action in actions {
            match action {
                Action::CancelListener => applied.retired.extend(shared.cancel(RoleKind::Listener)),
                Action::CancelInitiator => applied.retired.extend(shared.cancel(RoleKind::Initiator)),
                Action::CancelSession => applied.retired.extend(shared.cancel(RoleKind::Session)),
                Action::Emit(event) => {
                    log_event(&event);
                    self.events.emit(event);
                }
                spawn => applied.spawns.push(spawn),
            }
        }
        applied
    }

    fn spawn(&self, shared: &mut Shared, action: Action, conn: &mut Option<Connection>) {
        match action {
            Action::SpawnListener { delay } => {
                let ctx = self.context(RoleKind::Listener, shared);
                shared.listener = Some(listener::spawn(self.transport.clone(), delay, ctx));
            }
            Action::SpawnInitiator { address } => {
                let ctx = self.context(RoleKind::Initiator, shared);
                shared.initiator = Some(initiator::spawn(
                    self.transport.clone(),
                    address,
                    self.config.dial_timeout(),
                    ctx,
                ));
            }
            Action::SpawnSession => match conn.take() {
                Some(conn) => {
                    let ctx = self.context(RoleKind::Session, shared);
                    shared.session = Some(session::spawn(conn, self.config.read_buffer_size, ctx));
                }
                None => tracing::error!("session requested without a connection"),
            },
            other => tracing::error!(?other, "not a spawn action"),
        }
    }

    fn context(&self, role: RoleKind, shared: &mut Shared) -> RoleContext {
        let generation = shared.generation.bump();
        tracing::debug!(%role, %generation, "spawning role");
        let sink: Weak<dyn ReportSink> = self.this.clone();
        RoleContext::new(role, generation, sink)
    }

    async fn retire(&self, tasks: Vec<JoinHandle<()>>) {
        let grace = self.config.shutdown_grace();
        for task in tasks {
            match tokio::time::timeout(grace, task).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => tracing::warn!(%error, "role task ended abnormally"),
                Err(_) => tracing::warn!(?grace, "role still running after shutdown grace; detaching"),
            }
        }
    }
}

impl ReportSink for Inner {
    fn on_role_result(&self, role: RoleKind, generation: Generation, report: RoleReport) {
        let mut shared = self.lock();
        if shared.live_generation(role) != Some(generation) {
            tracing::trace!(%role, %generation, "discarding stale role result");
            if let RoleReport::Accepted(conn) | RoleReport::Dialed(conn) = report {
                conn.channel.close();
            }
            return;
        }

        let (input, mut conn) = into_input(report);
        match self.step(&mut shared, input) {
            Ok(actions) => {
                // Retired tasks here are the reporter itself or already signalled; they finish detached.
                let applied = self.apply(&mut shared, actions);
                for spawn in applied.spawns {
                    self.spawn(&mut shared, spawn, &mut conn);
                }
            }
            Err(error) => tracing::warn!(%role, %generation, %error, "role result rejected"),
        }
        if let Some(unused) = conn {
            unused.channel.close();
        }
    }
}

fn into_input(report: RoleReport) -> (Input, Option<Connection>) {
    match report {
        RoleReport::Accepted(conn) => (
            Input::AcceptSucceeded {
                peer: conn.peer.clone(),
            },
            Some(conn),
        ),
        RoleReport::Dialed(conn) => (
            Input::DialSucceeded {
                peer: conn.peer.clone(),
            },
            Some(conn),
        ),
        RoleReport::DialFailed(reason) => (Input::DialFailed { reason }, None),
        RoleReport::ListenFailed(reason) => (Input::ListenFailed { reason }, None),
        RoleReport::Received(bytes) => (Input::Received { bytes }, None),
        RoleReport::Sent(bytes) => (Input::Sent { bytes }, None),
        RoleReport::Lost(reason) => (Input::SessionLost { reason }, None),
        RoleReport::TransportUnavailable => (Input::TransportUnavailable, None),
    }
}

fn log_event(event: &Event) {
    match event {
        Event::Connected { peer } => tracing::info!(%peer, "connected"),
        Event::ConnectionLost { reason } => tracing::info!(%reason, "connection lost"),
        Event::TransportUnavailable => tracing::warn!("transport unavailable; manager idle"),
        _ => {}
    }
}
