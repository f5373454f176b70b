//! The connection registry and broadcast fan-out.
//!
//! Every membership change and every broadcast runs under one lock, so a
//! broadcast always sees a consistent snapshot of who is connected and a
//! removal is never observed half-done.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use parley_core::{Event, HubError, SessionId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a session may ask of the hub it belongs to.
///
/// Sessions hold this as `Arc<dyn Hub>`; they never see the registry itself.
pub trait Hub: Send + Sync {
    /// Add a session. Fails if the id is already present or the hub is shut down.
    fn register(&self, member: Member) -> Result<(), HubError>;

    /// Remove a session and close it. A no-op for an id that is not registered.
    fn unregister(&self, id: &SessionId);

    /// Queue `event` for every registered session, the sender included.
    fn broadcast(&self, event: Event);
}

/// The hub's handle on one session: where to queue its events and how to close it.
pub struct Member {
    id: SessionId,
    username: String,
    egress: mpsc::UnboundedSender<Arc<Event>>,
    closer: CancellationToken,
}

impl Member {
    pub fn new(
        id: SessionId,
        username: impl Into<String>,
        egress: mpsc::UnboundedSender<Arc<Event>>,
        closer: CancellationToken,
    ) -> Self {
        Self {
            id,
            username: username.into(),
            egress,
            closer,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Queue an event. Never blocks; `false` means the session stopped draining.
    fn deliver(&self, event: Arc<Event>) -> bool {
        self.egress.send(event).is_ok()
    }

    /// Drop the queue's only producer and signal the session to stop reading.
    fn close(self) {
        self.closer.cancel();
    }
}

#[derive(Default)]
struct Registry {
    members: HashMap<SessionId, Member>,
    closed: bool,
}

/// The single process-wide chat room.
///
/// Egress queues are unbounded: a slow reader grows its own queue rather than
/// holding up the broadcast for everyone else.
#[derive(Default)]
pub struct ChatHub {
    registry: Mutex<Registry>,
    messages_broadcast: AtomicU64,
}

impl ChatHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered sessions.
    pub fn connection_count(&self) -> usize {
        self.registry.lock().members.len()
    }

    /// Usernames of registered sessions, sorted. One entry per session.
    pub fn usernames(&self) -> Vec<String> {
        let registry = self.registry.lock();
        let mut names: Vec<String> = registry
            .members
            .values()
            .map(|m| m.username.clone())
            .collect();
        names.sort();
        names
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.registry.lock().members.contains_key(id)
    }

    /// Total broadcasts processed since startup.
    pub fn messages_broadcast(&self) -> u64 {
        self.messages_broadcast.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.registry.lock().closed
    }

    /// Refuse new sessions and disconnect every current one.
    ///
    /// Returns how many sessions were disconnected. Calling it again returns 0.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<Member> = {
            let mut registry = self.registry.lock();
            registry.closed = true;
            registry.members.drain().map(|(_, m)| m).collect()
        };
        let count = drained.len();
        for member in drained {
            member.close();
        }
        info!(disconnected = count, "hub shut down");
        count
    }
}

impl Hub for ChatHub {
    fn register(&self, member: Member) -> Result<(), HubError> {
        let mut registry = self.registry.lock();
        if registry.closed {
            debug!(session_id = %member.id, "register refused, hub is shut down");
            return Err(HubError::Closed);
        }
        if registry.members.contains_key(&member.id) {
            warn!(session_id = %member.id, "session registered twice, ignoring");
            return Err(HubError::AlreadyRegistered(member.id.clone()));
        }
        debug!(
            session_id = %member.id,
            user = %member.username,
            total = registry.members.len() + 1,
            "session registered"
        );
        let _ = registry.members.insert(member.id.clone(), member);
        Ok(())
    }

    fn unregister(&self, id: &SessionId) {
        let removed = {
            let mut registry = self.registry.lock();
            let removed = registry.members.remove(id);
            if removed.is_some() {
                debug!(session_id = %id, remaining = registry.members.len(), "session unregistered");
            }
            removed
        };
        if let Some(member) = removed {
            member.close();
        }
    }

    fn broadcast(&self, event: Event) {
        let event = Arc::new(event);
        let dead: Vec<Member> = {
            let mut registry = self.registry.lock();
            let gone: Vec<SessionId> = registry
                .members
                .values()
                .filter(|m| !m.deliver(Arc::clone(&event)))
                .map(|m| m.id.clone())
                .collect();
            let _ = self.messages_broadcast.fetch_add(1, Ordering::Relaxed);
            debug!(
                from = %event.from,
                event_id = %event.id,
                recipients = registry.members.len() - gone.len(),
                "broadcast"
            );
            gone.iter()
                .filter_map(|id| registry.members.remove(id))
                .collect()
        };
        for member in dead {
            debug!(session_id = %member.id, "dropping session whose queue is gone");
            member.close();
        }
    }
}
