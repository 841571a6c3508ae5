use tracing::debug;

use duet_types::models::WireMessage;

use crate::key_exchange::KeyExchange;
use crate::offload::{OffloadChannel, OffloadError};

/// What to do with an outgoing draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Sealed to the peer; put it on the wire.
    Transmit(WireMessage),
    /// No peer key yet. Show it locally, send nothing.
    LocalOnly,
}

/// Why an incoming message was discarded without decryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Addressed to a different public key.
    RecipientMismatch,
    /// No key exchange has completed for the current pairing.
    Unpaired,
    /// Sent by someone other than the current peer.
    UnknownSender,
}

/// What became of an incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Dropped(DropReason),
    Decrypted { sender: String, text: String },
    Failed { sender: String, error: OffloadError },
}

/// Encrypt-before-send and decrypt-before-display, both on the crypto worker.
#[derive(Clone)]
pub struct MessagePipeline {
    offload: OffloadChannel,
}

impl MessagePipeline {
    pub fn new(offload: OffloadChannel) -> Self {
        Self { offload }
    }

    /// Seal `draft` to the current peer, or fall back to local-only.
    pub async fn seal(&self, draft: &str, exchange: &KeyExchange) -> Result<Outgoing, OffloadError> {
        let Some(peer) = exchange.peer_key() else {
            return Ok(Outgoing::LocalOnly);
        };

        let ciphertext = self.offload.encrypt(draft, peer).await?;
        Ok(Outgoing::Transmit(WireMessage {
            text: ciphertext,
            sender: exchange.local_key().to_string(),
            recipient: peer.to_string(),
        }))
    }

    /// Decrypt `message` if it is addressed to us by our current peer.
    /// Anything else is dropped before it reaches the crypto worker.
    pub async fn open(&self, message: WireMessage, exchange: &KeyExchange) -> Incoming {
        let reason = if message.recipient != exchange.local_key() {
            Some(DropReason::RecipientMismatch)
        } else {
            match exchange.peer_key() {
                None => Some(DropReason::Unpaired),
                Some(peer) if peer != message.sender => Some(DropReason::UnknownSender),
                Some(_) => None,
            }
        };
        if let Some(reason) = reason {
            debug!("dropping incoming message: {:?}", reason);
            return Incoming::Dropped(reason);
        }

        match self.offload.decrypt(&message.text).await {
            Ok(text) => Incoming::Decrypted {
                sender: message.sender,
                text,
            },
            Err(error) => Incoming::Failed {
                sender: message.sender,
                error,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use duet_crypto::SealedBoxEngine;

    use super::*;

    struct Peer {
        pipeline: MessagePipeline,
        exchange: KeyExchange,
    }

    async fn peer() -> Peer {
        let offload = OffloadChannel::spawn(SealedBoxEngine::new()).unwrap();
        let exchange = KeyExchange::start(&offload).await.unwrap();
        Peer {
            pipeline: MessagePipeline::new(offload),
            exchange,
        }
    }

    async fn paired() -> (Peer, Peer) {
        let mut x = peer().await;
        let mut y = peer().await;
        x.exchange.accept_peer_key(y.exchange.local_key().to_string());
        y.exchange.accept_peer_key(x.exchange.local_key().to_string());
        (x, y)
    }

    #[tokio::test]
    async fn unpaired_draft_stays_local() {
        let x = peer().await;
        assert_eq!(
            x.pipeline.seal("hello?", &x.exchange).await.unwrap(),
            Outgoing::LocalOnly
        );
    }

    #[tokio::test]
    async fn sealed_message_opens_on_the_other_side() {
        let (x, y) = paired().await;

        let Outgoing::Transmit(wire) = x.pipeline.seal("hi", &x.exchange).await.unwrap() else {
            panic!("expected a transmittable message");
        };
        assert_ne!(wire.text, "hi");
        assert_eq!(wire.sender, x.exchange.local_key());
        assert_eq!(wire.recipient, y.exchange.local_key());

        assert_eq!(
            y.pipeline.open(wire, &y.exchange).await,
            Incoming::Decrypted {
                sender: x.exchange.local_key().to_string(),
                text: "hi".into(),
            }
        );
    }

    #[tokio::test]
    async fn message_for_someone_else_is_dropped() {
        let (x, y) = paired().await;
        let Outgoing::Transmit(mut wire) = x.pipeline.seal("hi", &x.exchange).await.unwrap() else {
            panic!("expected a transmittable message");
        };
        wire.recipient = "someone-else".into();

        assert_eq!(
            y.pipeline.open(wire, &y.exchange).await,
            Incoming::Dropped(DropReason::RecipientMismatch)
        );
    }

    #[tokio::test]
    async fn message_after_peer_reset_is_dropped() {
        let (x, mut y) = paired().await;
        let Outgoing::Transmit(wire) = x.pipeline.seal("late", &x.exchange).await.unwrap() else {
            panic!("expected a transmittable message");
        };
        y.exchange.reset();

        assert_eq!(
            y.pipeline.open(wire, &y.exchange).await,
            Incoming::Dropped(DropReason::Unpaired)
        );
    }

    #[tokio::test]
    async fn message_from_stale_peer_is_dropped() {
        let (x, mut y) = paired().await;
        let Outgoing::Transmit(wire) = x.pipeline.seal("old", &x.exchange).await.unwrap() else {
            panic!("expected a transmittable message");
        };
        y.exchange.accept_peer_key("new-peer".into());

        assert_eq!(
            y.pipeline.open(wire, &y.exchange).await,
            Incoming::Dropped(DropReason::UnknownSender)
        );
    }

    #[tokio::test]
    async fn corrupted_ciphertext_fails_without_leaking_it() {
        let (x, y) = paired().await;
        let wire = WireMessage {
            text: "Zm9vYmFy".into(),
            sender: x.exchange.local_key().to_string(),
            recipient: y.exchange.local_key().to_string(),
        };

        match y.pipeline.open(wire, &y.exchange).await {
            Incoming::Failed { sender, error } => {
                assert_eq!(sender, x.exchange.local_key());
                assert!(matches!(error, OffloadError::Crypto(_)));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_peer_key_surfaces_typed_error() {
        let mut x = peer().await;
        x.exchange.accept_peer_key("garbage".into());

        assert!(matches!(
            x.pipeline.seal("hi", &x.exchange).await,
            Err(OffloadError::Crypto(_))
        ));
    }
}
