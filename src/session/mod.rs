//! Playback session registry
//!
//! Each HLS playback (one video) gets a [`PlaybackSession`] holding its
//! playlist cache and fetch progress. Sessions live in a small fixed
//! array of slots: a `/play` for a known UUID reuses its slot, short
//! sessions (advertisements) are purged before each new allocation, and
//! when every slot is taken the slot after the current one is evicted.

use std::collections::{HashSet, VecDeque};

use crate::hls::PlaylistStore;

/// Number of playback session slots
pub const MAX_PLAYBACK_SESSIONS: usize = 4;

/// Sessions shorter than this (seconds) are treated as ads and purged on
/// each new `/play`
pub const MIN_STORED_SECONDS: f32 = 300.0;

/// State of one HLS playback
pub struct PlaybackSession {
    /// Session id the sender attaches to every control request
    pub apple_session_id: String,
    /// UUID identifying this playback across `/play` requests
    pub playback_uuid: String,
    /// Where the renderer should start, in seconds
    pub start_position_seconds: f32,
    /// Sender-origin prefix of playlist URIs (up to `/master.m3u8`)
    pub uri_prefix: String,
    /// Loopback prefix rewritten playlists point at
    pub local_uri_prefix: String,
    /// Preferred audio language code from `selectedMediaArray`
    pub language_code: Option<String>,
    /// Display name paired with the language code
    pub language_name: Option<String>,
    /// Cached playlists served to the local player
    pub store: PlaylistStore,
    /// `renderer.play` has been issued for this session
    pub playback_started: bool,

    pending: VecDeque<String>,
    requested: HashSet<String>,
    outstanding: usize,
    next_request_id: i64,
}

impl PlaybackSession {
    /// Create a fresh session bound to the loopback HTTP port
    #[must_use]
    pub fn new(playback_uuid: &str, apple_session_id: &str, http_port: u16) -> Self {
        Self {
            apple_session_id: apple_session_id.to_string(),
            playback_uuid: playback_uuid.to_string(),
            start_position_seconds: 0.0,
            uri_prefix: String::new(),
            local_uri_prefix: format!("http://localhost:{http_port}"),
            language_code: None,
            language_name: None,
            store: PlaylistStore::new(),
            playback_started: false,
            pending: VecDeque::new(),
            requested: HashSet::new(),
            outstanding: 0,
            next_request_id: 0,
        }
    }

    /// Queue a child playlist URI for fetching, once per URI
    pub fn push_pending(&mut self, uri: String) {
        if self.requested.insert(uri.clone()) {
            self.pending.push_back(uri);
        }
    }

    /// Take every queued URI for dispatch
    pub fn drain_pending(&mut self) -> Vec<String> {
        self.pending.drain(..).collect()
    }

    /// Record `n` FCUP requests put on the wire
    pub fn note_requested(&mut self, n: usize) {
        self.outstanding += n;
    }

    /// Record one FCUP response; returns the number still in flight
    pub fn note_response(&mut self) -> usize {
        self.outstanding = self.outstanding.saturating_sub(1);
        self.outstanding
    }

    /// FCUP requests awaiting their `/action` reply
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Monotone FCUP request id
    pub fn next_request_id(&mut self) -> i64 {
        self.next_request_id += 1;
        self.next_request_id
    }

    /// Longest stored media playlist duration, the session's effective
    /// length for eviction purposes
    #[must_use]
    pub fn duration(&self) -> f32 {
        self.store.max_duration()
    }

    /// Loopback URL of the rewritten master playlist
    #[must_use]
    pub fn local_master_uri(&self) -> String {
        format!("{}/master.m3u8", self.local_uri_prefix)
    }
}

/// Fixed-size registry of playback sessions
pub struct SessionRegistry {
    slots: Vec<Option<PlaybackSession>>,
    current: usize,
}

impl SessionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_PLAYBACK_SESSIONS).map(|_| None).collect(),
            current: 0,
        }
    }

    /// Number of live sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Whether no sessions are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slot index of the session with this playback UUID
    #[must_use]
    pub fn find_by_uuid(&self, uuid: &str) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|session| session.playback_uuid == uuid)
        })
    }

    /// The most recently activated session
    #[must_use]
    pub fn current(&self) -> Option<&PlaybackSession> {
        self.slots[self.current].as_ref()
    }

    /// Mutable access to the most recently activated session
    pub fn current_mut(&mut self) -> Option<&mut PlaybackSession> {
        self.slots[self.current].as_mut()
    }

    /// Mutable access by slot index
    pub fn session_mut(&mut self, index: usize) -> Option<&mut PlaybackSession> {
        self.slots.get_mut(index)?.as_mut()
    }

    /// Find or create the slot for `uuid` and make it current.
    ///
    /// Returns `(index, reused)`. A known UUID is reused (its
    /// `apple_session_id` refreshed). Otherwise short sessions are
    /// purged, a free slot is claimed (evicting `(current+1) mod N` when
    /// none is free), and after the insert one slot is again cleared if
    /// the registry filled up, so space stays available.
    pub fn allocate_for(
        &mut self,
        uuid: &str,
        apple_session_id: &str,
        http_port: u16,
    ) -> (usize, bool) {
        if let Some(index) = self.find_by_uuid(uuid) {
            self.current = index;
            if let Some(session) = self.slots[index].as_mut() {
                session.apple_session_id = apple_session_id.to_string();
            }
            return (index, true);
        }

        self.purge_short();

        let index = match self.slots.iter().position(Option::is_none) {
            Some(free) => free,
            None => {
                let victim = (self.current + 1) % MAX_PLAYBACK_SESSIONS;
                self.evict(victim);
                victim
            }
        };

        self.slots[index] = Some(PlaybackSession::new(uuid, apple_session_id, http_port));
        self.current = index;

        if self.len() == MAX_PLAYBACK_SESSIONS {
            let victim = (index + 1) % MAX_PLAYBACK_SESSIONS;
            self.evict(victim);
        }

        (index, false)
    }

    /// Drop sessions whose stored media is shorter than
    /// [`MIN_STORED_SECONDS`] (advertisements)
    pub fn purge_short(&mut self) {
        for slot in &mut self.slots {
            let short = slot
                .as_ref()
                .is_some_and(|session| session.duration() < MIN_STORED_SECONDS);
            if short {
                if let Some(session) = slot.take() {
                    tracing::info!(
                        uuid = %session.playback_uuid,
                        duration = session.duration(),
                        "purging short playback session"
                    );
                }
            }
        }
    }

    /// Drop half-built sessions (fetch still pending, never played);
    /// called when their control connection goes away
    pub fn purge_unstarted(&mut self) {
        for slot in &mut self.slots {
            let unstarted = slot
                .as_ref()
                .is_some_and(|session| !session.playback_started);
            if unstarted {
                if let Some(session) = slot.take() {
                    tracing::debug!(
                        uuid = %session.playback_uuid,
                        "dropping half-built playback session"
                    );
                }
            }
        }
    }

    fn evict(&mut self, index: usize) {
        if let Some(session) = self.slots[index].take() {
            tracing::info!(
                uuid = %session.playback_uuid,
                duration = session.duration(),
                "evicting playback session"
            );
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_long(session: &mut PlaybackSession) {
        // A stored media playlist longer than the ad threshold keeps the
        // session alive across purges
        session
            .store
            .insert_media("/video.m3u8", "#EXTM3U\n".to_string(), 100, 600.0);
    }

    #[test]
    fn test_allocate_and_reuse() {
        let mut registry = SessionRegistry::new();

        let (index, reused) = registry.allocate_for("uuid-a", "sess-1", 7000);
        assert!(!reused);
        make_long(registry.session_mut(index).unwrap());

        let (again, reused) = registry.allocate_for("uuid-a", "sess-2", 7000);
        assert!(reused);
        assert_eq!(index, again);
        assert_eq!(
            registry.current().unwrap().apple_session_id,
            "sess-2".to_string()
        );
    }

    #[test]
    fn test_eviction_bound() {
        let mut registry = SessionRegistry::new();

        for i in 0..10 {
            let uuid = format!("uuid-{i}");
            let (index, reused) = registry.allocate_for(&uuid, "sess", 7000);
            assert!(!reused);
            make_long(registry.session_mut(index).unwrap());
            assert!(registry.len() <= MAX_PLAYBACK_SESSIONS);
        }

        // The most recent session is always present
        assert!(registry.find_by_uuid("uuid-9").is_some());
        assert_eq!(registry.current().unwrap().playback_uuid, "uuid-9");
    }

    #[test]
    fn test_short_sessions_purged() {
        let mut registry = SessionRegistry::new();

        let (short_index, _) = registry.allocate_for("uuid-ad", "sess", 7000);
        registry
            .session_mut(short_index)
            .unwrap()
            .store
            .insert_media("/ad.m3u8", "#EXTM3U\n".to_string(), 5, 15.0);

        let _ = registry.allocate_for("uuid-movie", "sess", 7000);
        assert!(registry.find_by_uuid("uuid-ad").is_none());
        assert!(registry.find_by_uuid("uuid-movie").is_some());
    }

    #[test]
    fn test_pending_queue_dedup() {
        let mut session = PlaybackSession::new("uuid", "sess", 7000);

        session.push_pending("mlhls://localhost/x/sub.m3u8".to_string());
        session.push_pending("mlhls://localhost/x/en.m3u8".to_string());
        session.push_pending("mlhls://localhost/x/sub.m3u8".to_string());

        assert_eq!(
            session.drain_pending(),
            vec![
                "mlhls://localhost/x/sub.m3u8".to_string(),
                "mlhls://localhost/x/en.m3u8".to_string(),
            ]
        );
        assert!(session.drain_pending().is_empty());
    }

    #[test]
    fn test_outstanding_counter() {
        let mut session = PlaybackSession::new("uuid", "sess", 7000);
        assert_eq!(session.outstanding(), 0);

        session.note_requested(2);
        assert_eq!(session.outstanding(), 2);
        assert_eq!(session.note_response(), 1);
        assert_eq!(session.note_response(), 0);
        // Late duplicates never underflow
        assert_eq!(session.note_response(), 0);
    }

    #[test]
    fn test_request_ids_monotone() {
        let mut session = PlaybackSession::new("uuid", "sess", 7000);
        assert_eq!(session.next_request_id(), 1);
        assert_eq!(session.next_request_id(), 2);
        assert_eq!(session.next_request_id(), 3);
    }

    #[test]
    fn test_purge_unstarted() {
        let mut registry = SessionRegistry::new();

        let (a, _) = registry.allocate_for("uuid-a", "sess", 7000);
        make_long(registry.session_mut(a).unwrap());
        registry.session_mut(a).unwrap().playback_started = true;

        let _ = registry.allocate_for("uuid-b", "sess", 7000);

        registry.purge_unstarted();
        assert!(registry.find_by_uuid("uuid-a").is_some());
        assert!(registry.find_by_uuid("uuid-b").is_none());
    }
}
