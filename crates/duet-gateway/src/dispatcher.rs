use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, mpsc};
use uuid::Uuid;

use duet_types::events::ServerEvent;
use duet_types::models::{RoomName, SessionId};

use crate::registry::{Admission, RoomRegistry};

/// Outcome of a join resolved atomically against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Admitted. `peer` is the other member of the new room; `vacated` is the
    /// member left behind in the previous room, if any.
    Joined {
        peer: Option<SessionId>,
        vacated: Option<SessionId>,
    },
    /// Room at capacity. Nothing changed.
    Full { occupants: Vec<SessionId> },
}

/// Manages all connected sessions and room membership.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Per-session outbound queues: session_id -> sender.
    /// One queue per session keeps relay order equal to processing order.
    sessions: RwLock<HashMap<SessionId, mpsc::UnboundedSender<ServerEvent>>>,

    /// Single writer for membership. Every join/leave/relay takes this once, so
    /// an admission can never interleave with a removal on the same room.
    /// Lock order: `rooms`, then `sessions`.
    rooms: Mutex<RoomRegistry>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                sessions: RwLock::new(HashMap::new()),
                rooms: Mutex::new(RoomRegistry::new()),
            }),
        }
    }

    /// Register a new session. Returns (session_id, receiver for its events).
    pub async fn register_session(&self) -> (SessionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let session_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.sessions.write().await.insert(session_id, tx);
        (session_id, rx)
    }

    /// Drop a session's outbound queue. The receiver sees the channel close.
    pub async fn unregister_session(&self, session_id: SessionId) {
        self.inner.sessions.write().await.remove(&session_id);
    }

    /// Admit `session_id` to `room` and, only if admitted, leave `previous`.
    ///
    /// Both steps and every resulting notice (RoomJoined/RoomFull to the
    /// requester, NewConnection to the peer, UserDisconnected to whoever was
    /// left behind, IntrusionAttempt to the occupants) happen under one
    /// registry lock. Room notices carry no room name, so each session's
    /// queue must see them in the same order as the membership changes.
    pub async fn join(
        &self,
        session_id: SessionId,
        room: &RoomName,
        previous: Option<&RoomName>,
    ) -> JoinOutcome {
        let mut rooms = self.inner.rooms.lock().await;

        let outcome = match rooms.admit(room, session_id) {
            Admission::Rejected { occupants } => JoinOutcome::Full { occupants },
            Admission::Accepted { peer, .. } => {
                let vacated = previous
                    .filter(|prev| *prev != room)
                    .and_then(|prev| rooms.remove(prev, session_id).remaining);
                JoinOutcome::Joined { peer, vacated }
            }
        };

        let sessions = self.inner.sessions.read().await;
        match &outcome {
            JoinOutcome::Full { occupants } => {
                notify(&sessions, session_id, ServerEvent::RoomFull);
                for occupant in occupants {
                    notify(&sessions, *occupant, ServerEvent::IntrusionAttempt);
                }
            }
            JoinOutcome::Joined { peer, vacated } => {
                if let Some(left_behind) = vacated {
                    notify(&sessions, *left_behind, ServerEvent::UserDisconnected);
                }
                notify(&sessions, session_id, ServerEvent::RoomJoined { room: room.clone() });
                if let Some(peer) = peer {
                    notify(&sessions, *peer, ServerEvent::NewConnection);
                }
            }
        }

        outcome
    }

    /// Leave `room` and tell the member left behind, if any, before the
    /// registry is released. Returns that member.
    pub async fn leave(&self, session_id: SessionId, room: &RoomName) -> Option<SessionId> {
        let mut rooms = self.inner.rooms.lock().await;
        let remaining = rooms.remove(room, session_id).remaining;
        if let Some(remaining) = remaining {
            let sessions = self.inner.sessions.read().await;
            notify(&sessions, remaining, ServerEvent::UserDisconnected);
        }
        remaining
    }

    /// Forward `event` to the other member of `room`. The lookup and the send
    /// share one registry lock, so a peer that has already moved on never
    /// receives it. Returns the recipient, or `None` if the event was dropped.
    pub async fn relay(
        &self,
        session_id: SessionId,
        room: &RoomName,
        event: ServerEvent,
    ) -> Option<SessionId> {
        let rooms = self.inner.rooms.lock().await;
        if !rooms.members(room).contains(&session_id) {
            return None;
        }
        let peer = rooms.peer_of(room, session_id)?;
        let sessions = self.inner.sessions.read().await;
        notify(&sessions, peer, event);
        Some(peer)
    }

    /// Members of `room` in join order.
    pub async fn room_members(&self, room: &RoomName) -> Vec<SessionId> {
        self.inner.rooms.lock().await.members(room).to_vec()
    }

    pub async fn room_count(&self) -> usize {
        self.inner.rooms.lock().await.room_count()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }
}

/// Queue `event` for one session. Silently ignored if it is gone.
fn notify(
    sessions: &HashMap<SessionId, mpsc::UnboundedSender<ServerEvent>>,
    session_id: SessionId,
    event: ServerEvent,
) {
    if let Some(tx) = sessions.get(&session_id) {
        let _ = tx.send(event);
    }
}
