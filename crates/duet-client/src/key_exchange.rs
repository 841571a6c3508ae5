use tracing::debug;

use duet_types::events::ClientCommand;

use crate::offload::{OffloadChannel, OffloadError};

/// What accepting a `PublicKey` event did to the peer key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerKeyUpdate {
    /// No peer key was held; now one is.
    Stored,
    /// A different key was held and has been overwritten.
    Replaced,
    /// The same key was already held. No side effects.
    Unchanged,
    /// The key is our own, echoed back. Ignored.
    Echo,
}

/// Local public key plus the peer key for the current pairing.
///
/// The local key is fixed for the client's lifetime. The peer key is cleared
/// whenever the pairing changes and filled again by the next `PublicKey`.
#[derive(Debug, Clone)]
pub struct KeyExchange {
    local: String,
    peer: Option<String>,
}

impl KeyExchange {
    /// Generate the client's keypair on the crypto worker.
    pub async fn start(offload: &OffloadChannel) -> Result<Self, OffloadError> {
        let local = offload.generate_keypair().await?;
        Ok(Self::new(local))
    }

    pub fn new(local: String) -> Self {
        Self { local, peer: None }
    }

    pub fn local_key(&self) -> &str {
        &self.local
    }

    pub fn peer_key(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    /// Our key, ready to send. Sent on every room entry and peer arrival;
    /// repeats are harmless since the peer just stores the same value again.
    pub fn announce(&self) -> ClientCommand {
        ClientCommand::PublicKey {
            key: self.local.clone(),
        }
    }

    pub fn accept_peer_key(&mut self, key: String) -> PeerKeyUpdate {
        if key == self.local {
            debug!("ignoring echo of our own public key");
            return PeerKeyUpdate::Echo;
        }

        match self.peer.replace(key) {
            None => PeerKeyUpdate::Stored,
            Some(old) if Some(&old) == self.peer.as_ref() => PeerKeyUpdate::Unchanged,
            Some(_) => PeerKeyUpdate::Replaced,
        }
    }

    /// Forget the peer. Returns whether a key was held.
    pub fn reset(&mut self) -> bool {
        self.peer.take().is_some()
    }
}
