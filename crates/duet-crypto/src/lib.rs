/// Duet Crypto Library
///
/// Public-key encryption for the two-party relay. Each client holds one
/// X25519 keypair for its lifetime; every message is sealed to the peer's
/// public key with an ephemeral X25519 agreement, HKDF-SHA256 and AES-256-GCM.
///
/// The coordination code only sees the `CryptoEngine` call contract
/// (generate / encrypt / decrypt over opaque base64 strings), so the
/// primitive can be swapped without touching the protocol.

pub mod encrypt;
pub mod engine;
pub mod error;
pub mod keys;

pub use engine::{CryptoEngine, SealedBoxEngine};
pub use error::{CryptoError, CryptoResult};
