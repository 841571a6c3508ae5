use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// One transport connection. Minted by the gateway when a socket is accepted.
pub type SessionId = Uuid;

/// Longest room name accepted at the transport boundary.
pub const MAX_ROOM_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomNameError {
    #[error("room name is empty")]
    Empty,
    #[error("room name is longer than {MAX_ROOM_NAME_LEN} characters")]
    TooLong,
    #[error("room name contains control characters")]
    ControlCharacter,
}

/// Client-chosen room name. Validated on construction and on deserialization,
/// so coordination code never sees an empty or oversized name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomName(String);

impl RoomName {
    pub fn new(name: impl Into<String>) -> Result<Self, RoomNameError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(RoomNameError::Empty);
        }
        if trimmed.chars().count() > MAX_ROOM_NAME_LEN {
            return Err(RoomNameError::TooLong);
        }
        if trimmed.chars().any(char::is_control) {
            return Err(RoomNameError::ControlCharacter);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomName {
    type Error = RoomNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Numeric names are always valid; used for generated fallback rooms.
impl From<u32> for RoomName {
    fn from(number: u32) -> Self {
        Self(number.to_string())
    }
}

impl From<RoomName> for String {
    fn from(room: RoomName) -> Self {
        room.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A chat message as it travels over the relay.
/// `text` is ciphertext sealed to `recipient`; the relay never sees plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub text: String,
    /// Sender's public key, used as a coarse identity token.
    pub sender: String,
    /// Public key the text was sealed to.
    pub recipient: String,
}
