//! Shared types for the playback controller.

use crate::defaults;
use std::time::Duration;

/// Identifies one playback session; stale platform events carry an old id.
pub type SessionId = u64;

/// Playback state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No session.
    Idle,
    /// Chunks accumulating, nothing audible yet.
    Buffering,
    Playing,
    Paused,
    /// Reached the end of a finalized stream.
    Completed,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Buffering => "buffering",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Where the renderer's audio comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// Fragments appended to an incremental decode sink.
    Incremental,
    /// Whole concatenated stream decoded at once.
    Blob,
}

/// Snapshot for the status line.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    /// Stream still arriving; independent of whether sound is playing.
    pub buffering: bool,
    /// Position in logical seconds.
    pub elapsed_secs: f64,
    /// Known only once the stream is finalized and fully decoded.
    pub duration_secs: Option<f64>,
    pub speed: f64,
    pub can_rewind: bool,
    pub can_download: bool,
    pub buffered_chunks: usize,
    pub mode: Option<SourceMode>,
}

/// Notifications drained by the owner of the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    StateChanged(PlaybackState),
    /// Periodic position update while playing.
    Progress(PlaybackStatus),
    /// No more chunks will arrive for the session.
    StreamFinalized,
    /// Speed changed and should be persisted.
    SpeedChanged(f64),
    /// Incremental decoding was abandoned for whole-blob playback.
    FellBack { reason: String },
    /// A user-visible failure that needs dismissing.
    Error(String),
    /// A session was torn down by `stop()`.
    PlaybackStopped,
}

/// Tuning for [`PlaybackController`](super::PlaybackController).
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackConfig {
    /// Chunks buffered before audible playback starts.
    pub buffer_threshold: usize,
    /// Bound on the incremental sink handshake.
    pub sink_ready_timeout: Duration,
    /// Interval of the position updates while playing.
    pub position_poll: Duration,
    pub min_speed: f64,
    pub max_speed: f64,
    pub speed_step: f64,
    pub rewind_secs: f64,
    /// Keep pitch constant when the speed changes.
    pub preserve_pitch: bool,
    /// Try the incremental sink before whole-blob playback.
    pub incremental: bool,
    pub initial_speed: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            buffer_threshold: defaults::BUFFER_THRESHOLD,
            sink_ready_timeout: Duration::from_millis(defaults::SINK_READY_TIMEOUT_MS),
            position_poll: Duration::from_millis(defaults::POSITION_POLL_MS),
            min_speed: defaults::MIN_SPEED,
            max_speed: defaults::MAX_SPEED,
            speed_step: defaults::SPEED_STEP,
            rewind_secs: defaults::REWIND_SECS,
            preserve_pitch: true,
            incremental: true,
            initial_speed: defaults::PLAYBACK_SPEED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_defaults() {
        let config = PlaybackConfig::default();
        assert_eq!(config.buffer_threshold, 4);
        assert_eq!(config.sink_ready_timeout, Duration::from_secs(2));
        assert_eq!(config.min_speed, 0.2);
        assert_eq!(config.max_speed, 3.0);
        assert_eq!(config.rewind_secs, 5.0);
        assert!(config.preserve_pitch);
        assert!(config.incremental);
    }

    #[test]
    fn state_display() {
        assert_eq!(PlaybackState::Buffering.to_string(), "buffering");
        assert_eq!(PlaybackState::Completed.to_string(), "completed");
    }
}
