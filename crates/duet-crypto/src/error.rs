use thiserror::Error;

/// Failures of a single crypto operation. None of these are fatal to a
/// session; callers scope them to the message that triggered them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("malformed public key: {0}")]
    MalformedKey(String),

    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("no keypair has been generated yet")]
    NoKeypair,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed")]
    Decrypt,

    #[error("decrypted text is not valid UTF-8")]
    InvalidUtf8,
}

pub type CryptoResult<T> = Result<T, CryptoError>;
