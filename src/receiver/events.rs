//! Receiver lifecycle events

use std::net::SocketAddr;

/// Events emitted by the receiver
///
/// Embedders subscribe to these to drive UI (the pairing PIN display in
/// particular) and lifecycle hooks.
#[derive(Debug, Clone)]
pub enum ReceiverEvent {
    /// The server is accepting connections
    Started {
        /// Device name
        name: String,
        /// Bound port
        port: u16,
    },

    /// The server stopped
    Stopped,

    /// A sender connected
    ClientConnected {
        /// Peer address
        address: SocketAddr,
    },

    /// A sender disconnected
    ClientDisconnected {
        /// Peer address
        address: SocketAddr,
    },

    /// A pairing PIN should be shown to the user
    PairingPinRequested {
        /// Four-digit PIN
        pin: String,
    },

    /// The renderer was told to start playing
    PlaybackStarted {
        /// Loopback playlist URL handed to the renderer
        uri: String,
    },
}
