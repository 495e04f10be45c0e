//! Connection table
//!
//! Each TCP connection gets a stable id and a kind. All connections
//! start as control connections; a `POST /reverse` upgrade turns one
//! into the reverse (PTTH) channel, and a loopback playlist GET marks
//! one as belonging to the local media player.

use std::collections::HashMap;

use tokio::sync::mpsc;

/// Stable opaque handle for one TCP connection
pub(crate) type ConnectionId = u64;

/// What a connection is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionKind {
    /// Sender control channel (requests in, responses out)
    Control,
    /// Upgraded reverse-HTTP channel (server-originated requests out)
    Reverse,
    /// Local media player fetching cached playlists
    HlsLoopback,
}

/// Registry of live connections and their kinds
pub(crate) struct ConnectionTable {
    next_id: ConnectionId,
    kinds: HashMap<ConnectionId, ConnectionKind>,
}

impl ConnectionTable {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 1,
            kinds: HashMap::new(),
        }
    }

    /// Register a new connection as a control connection
    pub(crate) fn register(&mut self) -> ConnectionId {
        let id = self.next_id;
        self.next_id += 1;
        self.kinds.insert(id, ConnectionKind::Control);
        id
    }

    pub(crate) fn unregister(&mut self, id: ConnectionId) {
        self.kinds.remove(&id);
    }

    pub(crate) fn kind(&self, id: ConnectionId) -> Option<ConnectionKind> {
        self.kinds.get(&id).copied()
    }

    pub(crate) fn set_kind(&mut self, id: ConnectionId, kind: ConnectionKind) {
        if let Some(entry) = self.kinds.get_mut(&id) {
            *entry = kind;
        }
    }

    /// How many live connections have this kind; backs the
    /// exactly-one-PTTH invariant
    pub(crate) fn count_kind(&self, kind: ConnectionKind) -> usize {
        self.kinds.values().filter(|k| **k == kind).count()
    }
}

/// Writer handle for the upgraded reverse channel
pub(crate) struct ReverseChannel {
    /// Connection the channel lives on
    pub(crate) connection: ConnectionId,
    /// Sink feeding the connection's socket writer
    pub(crate) sender: mpsc::UnboundedSender<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_kinds() {
        let mut table = ConnectionTable::new();

        let a = table.register();
        let b = table.register();
        assert_ne!(a, b);
        assert_eq!(table.kind(a), Some(ConnectionKind::Control));
        assert_eq!(table.count_kind(ConnectionKind::Control), 2);

        table.set_kind(a, ConnectionKind::Reverse);
        assert_eq!(table.count_kind(ConnectionKind::Reverse), 1);
        assert_eq!(table.count_kind(ConnectionKind::Control), 1);

        table.unregister(a);
        assert_eq!(table.count_kind(ConnectionKind::Reverse), 0);
        assert_eq!(table.kind(a), None);
    }
}
