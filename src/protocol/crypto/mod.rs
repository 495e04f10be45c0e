//! Cryptographic primitives for pairing and session key agreement

mod aes;
mod ed25519;
mod error;
mod srp;
mod x25519;

pub use self::aes::{Aes128Ctr, Aes128Gcm};
pub use self::ed25519::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
pub use self::error::CryptoError;
pub use self::srp::{SessionKey, SrpClient, SrpServer, SrpVerifier, create_salted_verifier};
pub use self::x25519::{X25519KeyPair, X25519PublicKey, X25519SharedSecret};

/// Lengths of cryptographic values on the wire
pub mod lengths {
    /// Ed25519 public key length
    pub const ED25519_PUBLIC_KEY: usize = 32;
    /// Ed25519 signature length
    pub const ED25519_SIGNATURE: usize = 64;
    /// X25519 public key length
    pub const X25519_PUBLIC_KEY: usize = 32;
    /// X25519 shared secret length
    pub const X25519_SHARED_SECRET: usize = 32;
    /// AES-128 key length
    pub const AES_128_KEY: usize = 16;
    /// AES block / CTR IV / GCM IV length used by the pairing exchanges
    pub const AES_128_BLOCK: usize = 16;
    /// GCM authentication tag length
    pub const GCM_TAG: usize = 16;
    /// SRP salt length
    pub const SRP_SALT: usize = 16;
    /// SRP server private key length
    pub const SRP_PRIVATE_KEY: usize = 32;
    /// SRP session key length (SHA-512 output)
    pub const SRP_SESSION_KEY: usize = 64;
}
