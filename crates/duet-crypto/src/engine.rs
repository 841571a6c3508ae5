use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::encrypt::{open, seal};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{KeyPair, public_key_from_base64, public_key_to_base64};

/// The public-key encryption capability consumed by the client.
///
/// Keys and ciphertexts cross this boundary as opaque strings. The engine
/// owns the private key; no method returns it.
pub trait CryptoEngine: Send + 'static {
    /// Generate the keypair and return the encoded public half.
    /// Calling again returns the same public key; the keypair lives as long
    /// as the engine.
    fn generate_keypair(&mut self) -> CryptoResult<String>;

    /// Encrypt `plaintext` to an encoded public key.
    fn encrypt(&self, plaintext: &str, recipient_public: &str) -> CryptoResult<String>;

    /// Decrypt a ciphertext addressed to this engine's public key.
    fn decrypt(&self, ciphertext: &str) -> CryptoResult<String>;
}

/// X25519 sealed-box engine. Ciphertexts are base64 of the `encrypt::seal` format.
#[derive(Default)]
pub struct SealedBoxEngine {
    keypair: Option<KeyPair>,
}

impl SealedBoxEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CryptoEngine for SealedBoxEngine {
    fn generate_keypair(&mut self) -> CryptoResult<String> {
        let pair = self.keypair.get_or_insert_with(KeyPair::generate);
        Ok(public_key_to_base64(pair.public()))
    }

    fn encrypt(&self, plaintext: &str, recipient_public: &str) -> CryptoResult<String> {
        let recipient = public_key_from_base64(recipient_public)?;
        let sealed = seal(&recipient, plaintext.as_bytes())?;
        Ok(BASE64.encode(sealed))
    }

    fn decrypt(&self, ciphertext: &str) -> CryptoResult<String> {
        let pair = self.keypair.as_ref().ok_or(CryptoError::NoKeypair)?;
        let sealed = BASE64
            .decode(ciphertext)
            .map_err(|e| CryptoError::MalformedCiphertext(e.to_string()))?;
        let plaintext = open(pair.secret(), &sealed)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
    }
}
