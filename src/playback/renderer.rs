//! Render element abstraction: plays a [`PcmTimeline`] on an output device.
//!
//! Positions are logical seconds into the timeline, independent of speed.

use super::timeline::PcmTimeline;
use super::types::SessionId;
use crate::error::{Result, TtsError};
use std::sync::{Arc, Mutex};

/// What the renderer reports asynchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderEventKind {
    /// Reached the end of a complete timeline.
    Ended,
    /// Caught up with the decoded audio while more is expected.
    Starved,
}

/// Renderer notification tagged with the session it was attached for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderEvent {
    pub session: SessionId,
    pub kind: RenderEventKind,
}

/// Audio output driven by the playback controller.
pub trait Renderer: Send {
    /// Use `timeline` as the source for `session`, replacing any previous one.
    fn attach(&mut self, session: SessionId, timeline: Arc<PcmTimeline>) -> Result<()>;

    /// Change tempo. Takes effect at the current position without a jump.
    fn set_speed(&mut self, speed: f64, preserve_pitch: bool);

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    /// Move to `secs` of logical time, clamped to the timeline.
    fn seek(&mut self, secs: f64);

    /// Current position in logical seconds.
    fn position(&self) -> f64;

    /// Stop output and drop the timeline.
    fn detach(&mut self);
}

/// Call recorded by [`MockRenderer`].
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    Attach(SessionId),
    SetSpeed { speed: f64, preserve_pitch: bool },
    Play,
    Pause,
    Seek(f64),
    Detach,
}

#[derive(Debug, Default)]
struct MockRendererState {
    calls: Vec<RenderCall>,
    position: f64,
    playing: bool,
    timeline: Option<Arc<PcmTimeline>>,
}

/// Renderer that records calls; clones share state so tests keep a handle.
#[derive(Debug, Clone, Default)]
pub struct MockRenderer {
    state: Arc<Mutex<MockRendererState>>,
    fail_play: bool,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `play` fail with an output error.
    pub fn with_play_failure(mut self) -> Self {
        self.fail_play = true;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockRendererState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.lock().calls.clone()
    }

    pub fn play_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, RenderCall::Play))
            .count()
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    /// Simulate the output advancing to `secs`.
    pub fn set_position(&self, secs: f64) {
        self.lock().position = secs;
    }

    pub fn timeline(&self) -> Option<Arc<PcmTimeline>> {
        self.lock().timeline.clone()
    }
}

impl Renderer for MockRenderer {
    fn attach(&mut self, session: SessionId, timeline: Arc<PcmTimeline>) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RenderCall::Attach(session));
        state.timeline = Some(timeline);
        state.position = 0.0;
        Ok(())
    }

    fn set_speed(&mut self, speed: f64, preserve_pitch: bool) {
        self.lock().calls.push(RenderCall::SetSpeed {
            speed,
            preserve_pitch,
        });
    }

    fn play(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RenderCall::Play);
        if self.fail_play {
            return Err(TtsError::AudioOutput {
                message: "mock play failure".to_string(),
            });
        }
        state.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        let mut state = self.lock();
        state.calls.push(RenderCall::Pause);
        state.playing = false;
    }

    fn seek(&mut self, secs: f64) {
        let mut state = self.lock();
        state.calls.push(RenderCall::Seek(secs));
        let end = state
            .timeline
            .as_ref()
            .map(|t| t.duration_secs())
            .unwrap_or(0.0);
        state.position = secs.clamp(0.0, end);
    }

    fn position(&self) -> f64 {
        self.lock().position
    }

    fn detach(&mut self) {
        let mut state = self.lock();
        state.calls.push(RenderCall::Detach);
        state.timeline = None;
        state.playing = false;
        state.position = 0.0;
    }
}
