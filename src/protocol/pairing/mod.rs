//! Device pairing
//!
//! Two flows reach the `Finished` state: pair-setup (one-time trust
//! bootstrap over SRP-6a, exchanging long-term Ed25519 keys under
//! AES-GCM) and pair-verify (per-session X25519 agreement authenticated
//! by those long-term keys). [`digest`] adds RFC 2617 password
//! authentication for receivers configured with an access password.

pub mod digest;
mod identity;
mod session;

pub use identity::PairingIdentity;
pub use session::{PairingSession, PairingStatus, random_pin};

use thiserror::Error;

/// Errors from the pairing state machine
///
/// `BadState`, `BadPeerKey` and `SrpProofMismatch` surface as HTTP-level
/// failures; `GcmAuthFailure` and `SignatureMismatch` tear the connection
/// down.
#[derive(Debug, Error)]
pub enum PairingError {
    /// Operation not valid in the session's current status
    #[error("pairing operation invalid in current state")]
    BadState,

    /// Peer-supplied key material was malformed
    #[error("malformed peer key")]
    BadPeerKey,

    /// SRP client proof did not match (wrong PIN); answered with HTTP 470
    #[error("SRP proof mismatch")]
    SrpProofMismatch,

    /// GCM authentication of the encrypted key exchange failed
    #[error("GCM authentication failure")]
    GcmAuthFailure,

    /// Ed25519 signature verification failed in pair-verify
    #[error("signature mismatch")]
    SignatureMismatch,

    /// Client device id exceeds the SRP username limit
    #[error("username too long")]
    UsernameTooLong,
}
