use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A cached media playlist with the fingerprint used for duplicate
/// suppression
#[derive(Debug, Clone)]
pub struct MediaEntry {
    /// Playlist text exactly as received
    pub text: String,
    /// Number of media segments
    pub chunks: usize,
    /// Total duration in seconds
    pub duration: f32,
}

/// Per-session `path → playlist` cache
///
/// Written by the control-connection dispatcher, read concurrently by
/// the renderer's loopback connections; hence the reader-writer lock.
/// Cloning shares the underlying map.
#[derive(Clone)]
pub struct PlaylistStore {
    inner: Arc<RwLock<StoreInner>>,
}

#[derive(Default)]
struct StoreInner {
    master: Option<String>,
    media: HashMap<String, MediaEntry>,
}

impl PlaylistStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
        }
    }

    /// Store the rewritten master playlist
    pub fn set_master(&self, text: String) {
        self.inner.write().expect("store lock").master = Some(text);
    }

    /// The rewritten master playlist, if received
    #[must_use]
    pub fn master(&self) -> Option<String> {
        self.inner.read().expect("store lock").master.clone()
    }

    /// Insert a media playlist under `path`.
    ///
    /// Returns `false` without replacing when an entry with the same
    /// path, chunk count and duration already exists (senders re-send
    /// playlists; identical ones are not worth storing twice).
    pub fn insert_media(&self, path: &str, text: String, chunks: usize, duration: f32) -> bool {
        let mut inner = self.inner.write().expect("store lock");

        if let Some(existing) = inner.media.get(path) {
            if existing.chunks == chunks && (existing.duration - duration).abs() < f32::EPSILON {
                return false;
            }
        }

        inner.media.insert(
            path.to_string(),
            MediaEntry {
                text,
                chunks,
                duration,
            },
        );
        true
    }

    /// Look up a stored media playlist by path
    #[must_use]
    pub fn media(&self, path: &str) -> Option<MediaEntry> {
        self.inner.read().expect("store lock").media.get(path).cloned()
    }

    /// Look up any stored playlist (master or media) by path, returning
    /// the exact stored text
    #[must_use]
    pub fn query(&self, path: &str) -> Option<String> {
        let inner = self.inner.read().expect("store lock");
        if path == super::MASTER_PATH {
            return inner.master.clone();
        }
        inner.media.get(path).map(|entry| entry.text.clone())
    }

    /// Number of stored media playlists
    #[must_use]
    pub fn media_count(&self) -> usize {
        self.inner.read().expect("store lock").media.len()
    }

    /// Longest stored media playlist duration
    #[must_use]
    pub fn max_duration(&self) -> f32 {
        self.inner
            .read()
            .expect("store lock")
            .media
            .values()
            .map(|entry| entry.duration)
            .fold(0.0, f32::max)
    }
}

impl Default for PlaylistStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_query_exact_bytes() {
        let store = PlaylistStore::new();
        let text = "#EXTM3U\n#EXTINF:6.0,\nseg0.ts\n".to_string();

        assert!(store.insert_media("/video.m3u8", text.clone(), 1, 6.0));
        assert_eq!(store.query("/video.m3u8"), Some(text));
    }

    #[test]
    fn test_duplicate_suppression() {
        let store = PlaylistStore::new();
        let text = "#EXTM3U\n".to_string();

        assert!(store.insert_media("/video.m3u8", text.clone(), 10, 60.0));
        assert!(!store.insert_media("/video.m3u8", text, 10, 60.0));
        assert_eq!(store.media_count(), 1);
    }

    #[test]
    fn test_changed_playlist_replaces() {
        let store = PlaylistStore::new();

        assert!(store.insert_media("/live.m3u8", "#EXTM3U\nv1".into(), 10, 60.0));
        assert!(store.insert_media("/live.m3u8", "#EXTM3U\nv2".into(), 12, 72.0));
        assert_eq!(store.query("/live.m3u8"), Some("#EXTM3U\nv2".to_string()));
    }

    #[test]
    fn test_master_path_query() {
        let store = PlaylistStore::new();
        assert_eq!(store.query("/master.m3u8"), None);

        store.set_master("#EXTM3U\nsub.m3u8\n".into());
        assert_eq!(
            store.query("/master.m3u8"),
            Some("#EXTM3U\nsub.m3u8\n".to_string())
        );
    }

    #[test]
    fn test_max_duration() {
        let store = PlaylistStore::new();
        assert_eq!(store.max_duration(), 0.0);

        store.insert_media("/a.m3u8", String::new(), 5, 30.0);
        store.insert_media("/b.m3u8", String::new(), 100, 600.0);
        assert!((store.max_duration() - 600.0).abs() < f32::EPSILON);
    }
}
