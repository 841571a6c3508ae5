use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::error::{CryptoError, CryptoResult};
use crate::keys::PUBLIC_KEY_LEN;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const HKDF_INFO: &[u8] = b"duet-sealed-box-v1";

/// Smallest valid sealed box: an empty plaintext still carries the header and tag.
pub const MIN_SEALED_LEN: usize = PUBLIC_KEY_LEN + NONCE_LEN + TAG_LEN;

/// Seal `plaintext` so only the holder of `recipient`'s secret can open it.
///
/// Format:
/// ```text
/// [ephemeral_public(32)] [nonce(12)] [aes_gcm_ciphertext + tag(16)]
/// ```
pub fn seal(recipient: &PublicKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral);

    let shared = ephemeral.diffie_hellman(recipient);
    if !shared.was_contributory() {
        return Err(CryptoError::MalformedKey("low-order public key".into()));
    }
    let key = derive_key(shared.as_bytes(), &ephemeral_public, recipient)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| CryptoError::Encrypt)?;

    let mut sealed = Vec::with_capacity(PUBLIC_KEY_LEN + NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(ephemeral_public.as_bytes());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a sealed box addressed to `secret`'s public key.
pub fn open(secret: &StaticSecret, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
    if sealed.len() < MIN_SEALED_LEN {
        return Err(CryptoError::MalformedCiphertext(format!(
            "{} bytes is shorter than the {} byte minimum",
            sealed.len(),
            MIN_SEALED_LEN
        )));
    }

    let (header, ciphertext) = sealed.split_at(PUBLIC_KEY_LEN + NONCE_LEN);
    let mut ephemeral_bytes = [0u8; PUBLIC_KEY_LEN];
    ephemeral_bytes.copy_from_slice(&header[..PUBLIC_KEY_LEN]);
    let ephemeral_public = PublicKey::from(ephemeral_bytes);
    let nonce = Nonce::from_slice(&header[PUBLIC_KEY_LEN..]);

    let shared = secret.diffie_hellman(&ephemeral_public);
    if !shared.was_contributory() {
        return Err(CryptoError::MalformedCiphertext("low-order ephemeral key".into()));
    }
    let own_public = PublicKey::from(secret);
    let key = derive_key(shared.as_bytes(), &ephemeral_public, &own_public)?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::Decrypt)
}

/// HKDF-SHA256 over the agreement output, salted with both public halves.
fn derive_key(
    shared: &[u8],
    ephemeral_public: &PublicKey,
    recipient: &PublicKey,
) -> CryptoResult<[u8; 32]> {
    let mut salt = [0u8; PUBLIC_KEY_LEN * 2];
    salt[..PUBLIC_KEY_LEN].copy_from_slice(ephemeral_public.as_bytes());
    salt[PUBLIC_KEY_LEN..].copy_from_slice(recipient.as_bytes());

    let hk = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut key = [0u8; 32];
    hk.expand(HKDF_INFO, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}
