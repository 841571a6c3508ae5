use tracing::{debug, info, trace};

use duet_types::events::{ClientCommand, ServerEvent};
use duet_types::models::{RoomName, SessionId};

use crate::dispatcher::{Dispatcher, JoinOutcome};

/// Where a session stands with respect to rooms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, not in any room.
    Idle,
    /// A join is being resolved. A rejection restores `previous`.
    Joining {
        room: RoomName,
        previous: Option<RoomName>,
    },
    Joined(RoomName),
    /// Transport torn down. Terminal.
    Disconnected,
}

/// Per-connection state machine: joins, room switches, opaque relays and
/// disconnect cleanup. Never inspects key material or ciphertext.
pub struct SessionCoordinator {
    session_id: SessionId,
    state: SessionState,
    dispatcher: Dispatcher,
}

impl SessionCoordinator {
    pub fn new(session_id: SessionId, dispatcher: Dispatcher) -> Self {
        Self {
            session_id,
            state: SessionState::Idle,
            dispatcher,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Room the session currently occupies.
    pub fn room(&self) -> Option<&RoomName> {
        match &self.state {
            SessionState::Joined(room) => Some(room),
            _ => None,
        }
    }

    pub async fn handle_command(&mut self, cmd: ClientCommand) {
        if self.state == SessionState::Disconnected {
            return;
        }

        match cmd {
            ClientCommand::Join { room } => self.join(room).await,
            ClientCommand::PublicKey { key } => {
                self.relay(ServerEvent::PublicKey { key }).await;
            }
            ClientCommand::Message(message) => {
                trace!(
                    "session {} relaying message ({} bytes)",
                    self.session_id,
                    message.text.len()
                );
                self.relay(ServerEvent::Message(message)).await;
            }
        }
    }

    /// Notices for every party are queued by the dispatcher under the
    /// registry lock; this only tracks our own state.
    async fn join(&mut self, room: RoomName) {
        let previous = self.room().cloned();
        self.state = SessionState::Joining {
            room: room.clone(),
            previous: previous.clone(),
        };

        // Re-joining the current room re-admits in place: the requester gets
        // RoomJoined again and the peer NewConnection, so the key exchange
        // reruns on both sides.
        match self
            .dispatcher
            .join(self.session_id, &room, previous.as_ref())
            .await
        {
            JoinOutcome::Full { .. } => {
                info!("session {} turned away from full room {}", self.session_id, room);
                self.state = match previous {
                    Some(prev) => SessionState::Joined(prev),
                    None => SessionState::Idle,
                };
            }
            JoinOutcome::Joined { .. } if previous.as_ref() == Some(&room) => {
                debug!("session {} re-joined room {}", self.session_id, room);
                self.state = SessionState::Joined(room);
            }
            JoinOutcome::Joined { .. } => {
                if let Some(prev) = &previous {
                    info!("session {} left room {}", self.session_id, prev);
                }
                info!("session {} joined room {}", self.session_id, room);
                self.state = SessionState::Joined(room);
            }
        }
    }

    /// Forward an event verbatim to the other member of the current room.
    async fn relay(&self, event: ServerEvent) {
        let kind = event.kind();
        let Some(room) = self.room() else {
            debug!("session {} sent {} outside a room, dropping", self.session_id, kind);
            return;
        };

        if self
            .dispatcher
            .relay(self.session_id, room, event)
            .await
            .is_none()
        {
            debug!(
                "session {} sent {} with no peer in room {}, dropping",
                self.session_id, kind, room
            );
        }
    }

    /// Transport teardown. Leaves whatever room the session is tied to (the
    /// dispatcher tells the member left behind) and drops the outbound queue.
    pub async fn disconnect(&mut self) {
        let state = std::mem::replace(&mut self.state, SessionState::Disconnected);

        let rooms: Vec<RoomName> = match state {
            SessionState::Joined(room) => vec![room],
            SessionState::Joining { room, previous } => {
                std::iter::once(room).chain(previous).collect()
            }
            SessionState::Idle | SessionState::Disconnected => Vec::new(),
        };

        for room in &rooms {
            self.dispatcher.leave(self.session_id, room).await;
            info!("session {} removed from room {}", self.session_id, room);
        }

        self.dispatcher.unregister_session(self.session_id).await;
    }
}
