//! Error types

/// Main error type for receiver operations.
///
/// Mirrors how failures surface on the wire: protocol errors become
/// HTTP 400, authentication errors 401/470, unsupported features 421 or
/// 501, transport errors tear the connection down, and fatal errors abort
/// initialisation (they never occur at steady state).
#[derive(Debug, thiserror::Error)]
pub enum AirCastError {
    /// Malformed request or unexpected plist shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Pairing or digest authentication failed.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The sender asked for something this receiver does not implement.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Socket-level failure; the connection is torn down.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Unrecoverable initialisation failure (unreadable key file, no
    /// entropy source).
    #[error("fatal: {0}")]
    Fatal(String),
}
