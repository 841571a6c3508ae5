use serde::{Deserialize, Serialize};

use crate::models::{RoomName, WireMessage};

/// Events sent FROM server TO client over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    /// Admission to the requested room succeeded
    RoomJoined { room: RoomName },

    /// Admission rejected, the room already holds two sessions
    RoomFull,

    /// A peer joined your room
    NewConnection,

    /// A third party tried to join your room and was turned away
    IntrusionAttempt,

    /// Your peer left the room or dropped its connection
    UserDisconnected,

    /// Peer's public key, relayed verbatim
    PublicKey { key: String },

    /// Encrypted chat message, relayed verbatim
    Message(WireMessage),
}

impl ServerEvent {
    /// Short name for log lines. Never includes key material or ciphertext.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RoomJoined { .. } => "RoomJoined",
            Self::RoomFull => "RoomFull",
            Self::NewConnection => "NewConnection",
            Self::IntrusionAttempt => "IntrusionAttempt",
            Self::UserDisconnected => "UserDisconnected",
            Self::PublicKey { .. } => "PublicKey",
            Self::Message(_) => "Message",
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientCommand {
    /// Request admission to a room (switches room if already in one)
    Join { room: RoomName },

    /// Publish our public key to the other room member
    PublicKey { key: String },

    /// Send an encrypted message to the other room member
    Message(WireMessage),
}
