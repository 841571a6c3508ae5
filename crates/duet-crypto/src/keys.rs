use aes_gcm::aead::OsRng;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{CryptoError, CryptoResult};

pub const PUBLIC_KEY_LEN: usize = 32;

/// A client's long-lived keypair. The secret half never leaves this struct.
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh X25519 keypair from the OS RNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

/// Encode a public key to base64 for the wire.
pub fn public_key_to_base64(key: &PublicKey) -> String {
    BASE64.encode(key.as_bytes())
}

/// Decode a base64 public key received from a peer.
pub fn public_key_from_base64(encoded: &str) -> CryptoResult<PublicKey> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
    let bytes: [u8; PUBLIC_KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
        CryptoError::MalformedKey(format!(
            "expected {} bytes, got {}",
            PUBLIC_KEY_LEN,
            b.len()
        ))
    })?;
    Ok(PublicKey::from(bytes))
}
