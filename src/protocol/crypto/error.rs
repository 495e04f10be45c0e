use thiserror::Error;

/// Errors from the crypto primitives
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A key or IV had the wrong length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Required length
        expected: usize,
        /// Provided length
        actual: usize,
    },

    /// Public key bytes did not form a valid curve point
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Signature bytes were malformed or verification failed
    #[error("invalid signature")]
    InvalidSignature,

    /// AEAD encryption failed
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// AEAD decryption / authentication failed
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// SRP protocol failure
    #[error("SRP error: {0}")]
    SrpError(String),
}
