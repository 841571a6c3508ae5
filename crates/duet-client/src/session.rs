use tracing::{debug, info, warn};

use duet_types::events::{ClientCommand, ServerEvent};
use duet_types::models::RoomName;

use crate::key_exchange::{KeyExchange, PeerKeyUpdate};
use crate::offload::{OffloadChannel, OffloadError};
use crate::pipeline::{Incoming, MessagePipeline, Outgoing};
use crate::policy::JoinPolicy;
use crate::transcript::{Author, MessageStatus, Notice, Transcript, UNREADABLE};

/// Where the client stands with respect to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport.
    Disconnected,
    /// Connected, in no room.
    Idle,
    /// Waiting for the relay to answer a join. `previous` is the room the
    /// relay still has us in until it accepts.
    Joining {
        room: RoomName,
        previous: Option<RoomName>,
    },
    Joined(RoomName),
}

/// Client side of a duet session, independent of the transport.
///
/// Feed it server events and user drafts; it returns the commands to put on
/// the wire and records what the user should see in its transcript.
pub struct ClientSession {
    state: ConnectionState,
    exchange: KeyExchange,
    pipeline: MessagePipeline,
    policy: JoinPolicy,
    transcript: Transcript,
    /// Room to (re)join on connect: the last room joined or requested.
    home_room: RoomName,
}

impl ClientSession {
    /// Generate the keypair and prepare a session that will join `room`
    /// once connected.
    pub async fn start(
        offload: OffloadChannel,
        policy: JoinPolicy,
        room: RoomName,
    ) -> Result<Self, OffloadError> {
        let exchange = KeyExchange::start(&offload).await?;
        info!("generated keypair");
        Ok(Self {
            state: ConnectionState::Disconnected,
            exchange,
            pipeline: MessagePipeline::new(offload),
            policy,
            transcript: Transcript::new(),
            home_room: room,
        })
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn public_key(&self) -> &str {
        self.exchange.local_key()
    }

    pub fn peer_key(&self) -> Option<&str> {
        self.exchange.peer_key()
    }

    pub fn room(&self) -> Option<&RoomName> {
        match &self.state {
            ConnectionState::Joined(room) => Some(room),
            _ => None,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }

    /// The transport is up. Returns the join for the home room.
    pub fn connected(&mut self) -> ClientCommand {
        self.state = ConnectionState::Idle;
        self.join(self.home_room.clone())
    }

    /// The transport dropped. Room and pairing are gone with it; the keypair
    /// and home room survive for the reconnect.
    pub fn transport_lost(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        self.state = ConnectionState::Disconnected;
        self.exchange.reset();
        self.transcript.push_notice(Notice::ConnectionLost);
    }

    /// Ask the relay for `room`.
    pub fn join(&mut self, room: RoomName) -> ClientCommand {
        let previous = match &self.state {
            ConnectionState::Joined(current) => Some(current.clone()),
            ConnectionState::Joining { previous, .. } => previous.clone(),
            ConnectionState::Idle | ConnectionState::Disconnected => None,
        };
        self.home_room = room.clone();
        self.state = ConnectionState::Joining {
            room: room.clone(),
            previous,
        };
        ClientCommand::Join { room }
    }

    /// Apply one server event. Returns the commands it triggers.
    pub async fn handle_event(&mut self, event: ServerEvent) -> Vec<ClientCommand> {
        match event {
            ServerEvent::RoomJoined { room } => {
                info!("joined room {}", room);
                self.policy.on_joined();
                self.exchange.reset();
                self.home_room = room.clone();
                self.state = ConnectionState::Joined(room.clone());
                self.transcript.push_notice(Notice::Joined(room));
                vec![self.exchange.announce()]
            }

            ServerEvent::RoomFull => self.room_full(),

            ServerEvent::NewConnection => {
                // A new pairing: whatever key we held belongs to someone else.
                self.exchange.reset();
                self.transcript.push_notice(Notice::PeerArrived);
                vec![self.exchange.announce()]
            }

            ServerEvent::IntrusionAttempt => {
                warn!("someone tried to join our room");
                self.transcript.push_notice(Notice::IntrusionAttempt);
                Vec::new()
            }

            ServerEvent::UserDisconnected => {
                self.exchange.reset();
                self.transcript.push_notice(Notice::PeerLeft);
                Vec::new()
            }

            ServerEvent::PublicKey { key } => {
                match self.exchange.accept_peer_key(key) {
                    PeerKeyUpdate::Stored | PeerKeyUpdate::Replaced => {
                        self.transcript.push_notice(Notice::PeerKeyReceived);
                    }
                    PeerKeyUpdate::Unchanged | PeerKeyUpdate::Echo => {}
                }
                Vec::new()
            }

            ServerEvent::Message(message) => {
                match self.pipeline.open(message, &self.exchange).await {
                    Incoming::Decrypted { sender, text } => {
                        self.transcript
                            .push_message(Author::Peer(sender), text, MessageStatus::Received);
                    }
                    Incoming::Failed { sender, error } => {
                        warn!("could not decrypt message: {}", error);
                        self.transcript.push_message(
                            Author::Peer(sender),
                            UNREADABLE,
                            MessageStatus::DecryptFailed,
                        );
                    }
                    Incoming::Dropped(_) => {}
                }
                Vec::new()
            }
        }
    }

    fn room_full(&mut self) -> Vec<ClientCommand> {
        let ConnectionState::Joining { room, previous } = &self.state else {
            debug!("unexpected RoomFull in state {:?}", self.state);
            return Vec::new();
        };
        info!("room {} is full", room);
        let previous = previous.clone();

        match self.policy.on_rejected() {
            Some(fallback) => {
                self.transcript.push_notice(Notice::RoomFull {
                    retrying: Some(fallback.clone()),
                });
                self.home_room = fallback.clone();
                self.state = ConnectionState::Joining {
                    room: fallback.clone(),
                    previous,
                };
                vec![ClientCommand::Join { room: fallback }]
            }
            None => {
                self.transcript
                    .push_notice(Notice::RoomFull { retrying: None });
                self.state = match previous {
                    Some(room) => {
                        self.home_room = room.clone();
                        ConnectionState::Joined(room)
                    }
                    None => ConnectionState::Idle,
                };
                Vec::new()
            }
        }
    }

    /// Send a draft. Returns the command to transmit, if any; the draft is
    /// always recorded in the transcript.
    pub async fn send(&mut self, draft: &str) -> Option<ClientCommand> {
        let draft = draft.trim();
        if draft.is_empty() {
            return None;
        }

        match self.pipeline.seal(draft, &self.exchange).await {
            Ok(Outgoing::Transmit(message)) => {
                self.transcript
                    .push_message(Author::Me, draft, MessageStatus::Sent);
                Some(ClientCommand::Message(message))
            }
            Ok(Outgoing::LocalOnly) => {
                self.transcript
                    .push_message(Author::Me, draft, MessageStatus::LocalOnly);
                None
            }
            Err(e) => {
                warn!("could not encrypt message: {}", e);
                self.transcript
                    .push_message(Author::Me, draft, MessageStatus::SendFailed);
                None
            }
        }
    }
}
