//! Media renderer contract
//!
//! The receiver never touches media itself; it hands the rewritten
//! playlist URL to a renderer and forwards transport commands. The
//! renderer only ever calls back by filling in the [`PlaybackInfo`]
//! passed to [`VideoRenderer::acquire_playback_info`].

/// A half-open time range in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    /// Range start
    pub start: f64,
    /// Range length
    pub duration: f64,
}

/// Playback state reported back to the sender via `/playback-info`
///
/// `duration == -1.0` signals that playback finished; `position == -1.0`
/// signals that no information is available yet.
#[derive(Debug, Clone)]
pub struct PlaybackInfo {
    /// Total media duration in seconds
    pub duration: f64,
    /// Current position in seconds
    pub position: f64,
    /// Playback rate (0.0 paused, 1.0 playing)
    pub rate: f32,
    /// Player is ready to start
    pub ready_to_play: bool,
    /// Playback buffer ran dry
    pub playback_buffer_empty: bool,
    /// Playback buffer is full
    pub playback_buffer_full: bool,
    /// Player expects to keep up without stalling
    pub playback_likely_to_keep_up: bool,
    /// Buffered ranges
    pub loaded_time_ranges: Vec<TimeRange>,
    /// Seekable ranges
    pub seekable_time_ranges: Vec<TimeRange>,
}

impl Default for PlaybackInfo {
    fn default() -> Self {
        Self {
            duration: 0.0,
            position: 0.0,
            rate: 0.0,
            ready_to_play: true,
            playback_buffer_empty: false,
            playback_buffer_full: true,
            playback_likely_to_keep_up: true,
            loaded_time_ranges: Vec::new(),
            seekable_time_ranges: Vec::new(),
        }
    }
}

/// Narrow interface to the media backend
pub trait VideoRenderer: Send + Sync {
    /// Begin playback of `uri` at `start_position` seconds
    fn play(&self, uri: &str, start_position: f32);

    /// Seek to an absolute position in seconds
    fn scrub(&self, position: f32);

    /// Change the playback rate
    fn rate(&self, rate: f32);

    /// Stop playback
    fn stop(&self);

    /// Reset the pipeline; `hard` tears the sink down completely
    fn reset(&self, hard: bool);

    /// Fill `info` with the current playback state
    fn acquire_playback_info(&self, info: &mut PlaybackInfo);
}

/// Renderer that does nothing; useful for tests and headless setups
pub struct NullRenderer;

impl VideoRenderer for NullRenderer {
    fn play(&self, uri: &str, start_position: f32) {
        tracing::debug!("null renderer: play {uri} @ {start_position}");
    }

    fn scrub(&self, _position: f32) {}

    fn rate(&self, _rate: f32) {}

    fn stop(&self) {}

    fn reset(&self, _hard: bool) {}

    fn acquire_playback_info(&self, info: &mut PlaybackInfo) {
        info.duration = 0.0;
        info.position = 0.0;
        info.rate = 0.0;
    }
}
