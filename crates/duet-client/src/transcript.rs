use std::fmt;

use duet_types::models::RoomName;

/// Placeholder shown instead of a message that could not be decrypted.
pub const UNREADABLE: &str = "[message could not be decrypted]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Author {
    Me,
    /// Identified by the peer's public key.
    Peer(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    /// Sealed and handed to the relay.
    Sent,
    /// Shown locally only; there was no peer key to seal it to.
    LocalOnly,
    /// Encryption failed; nothing was transmitted.
    SendFailed,
    /// Decrypted from the peer.
    Received,
    /// Addressed to us but could not be decrypted.
    DecryptFailed,
}

/// Room and pairing events worth showing to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Joined(RoomName),
    RoomFull { retrying: Option<RoomName> },
    PeerArrived,
    PeerKeyReceived,
    PeerLeft,
    IntrusionAttempt,
    ConnectionLost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEntry {
    Message {
        author: Author,
        text: String,
        status: MessageStatus,
    },
    Notice(Notice),
}

/// Everything the user has seen, in order.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    rendered: usize,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_message(&mut self, author: Author, text: impl Into<String>, status: MessageStatus) {
        self.entries.push(TranscriptEntry::Message {
            author,
            text: text.into(),
            status,
        });
    }

    pub fn push_notice(&mut self, notice: Notice) {
        self.entries.push(TranscriptEntry::Notice(notice));
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Entries added since the last call.
    pub fn take_new(&mut self) -> &[TranscriptEntry] {
        let start = self.rendered;
        self.rendered = self.entries.len();
        &self.entries[start..]
    }

    /// Message texts only, in order. Notices are skipped.
    pub fn messages(&self) -> impl Iterator<Item = (&Author, &str, MessageStatus)> {
        self.entries.iter().filter_map(|entry| match entry {
            TranscriptEntry::Message {
                author,
                text,
                status,
            } => Some((author, text.as_str(), *status)),
            TranscriptEntry::Notice(_) => None,
        })
    }
}

/// First characters of a key, enough to tell peers apart on screen.
fn fingerprint(key: &str) -> &str {
    let end = key
        .char_indices()
        .nth(8)
        .map_or(key.len(), |(idx, _)| idx);
    &key[..end]
}

impl fmt::Display for TranscriptEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message {
                author,
                text,
                status,
            } => {
                let who = match author {
                    Author::Me => "me".to_string(),
                    Author::Peer(key) => format!("peer:{}", fingerprint(key)),
                };
                let suffix = match status {
                    MessageStatus::LocalOnly => " (not sent: no peer yet)",
                    MessageStatus::SendFailed => " (not sent: encryption failed)",
                    MessageStatus::Sent | MessageStatus::Received | MessageStatus::DecryptFailed => "",
                };
                write!(f, "<{who}> {text}{suffix}")
            }
            Self::Notice(notice) => match notice {
                Notice::Joined(room) => write!(f, "* joined room {room}"),
                Notice::RoomFull {
                    retrying: Some(room),
                } => write!(f, "* room is full, trying room {room}"),
                Notice::RoomFull { retrying: None } => {
                    write!(f, "* room is full, pick another with /join <room>")
                }
                Notice::PeerArrived => write!(f, "* someone joined the room"),
                Notice::PeerKeyReceived => write!(f, "* key exchange complete, messages are end-to-end encrypted"),
                Notice::PeerLeft => write!(f, "* your peer left"),
                Notice::IntrusionAttempt => write!(f, "* someone tried to join this room"),
                Notice::ConnectionLost => write!(f, "* connection lost, reconnecting"),
            },
        }
    }
}
