//! Playback state machine for one streamed utterance at a time.
//!
//! The controller is driven entirely by calls from its owner: chunks from the
//! speech stream, user commands, sink and renderer events, and a periodic
//! [`tick`](PlaybackController::tick). It never blocks and never spawns; the
//! platform pieces behind [`SinkProbe`], [`Renderer`] and [`BlobDecoder`] do
//! their work elsewhere and report back through events tagged with the
//! session or sink they belong to.
//!
//! Audible playback starts once, when enough chunks are buffered, either from
//! an incremental sink or, when that is unavailable, from a whole-blob decode
//! that is re-run and appended to whenever the renderer starves and when the
//! stream is finalized.

use super::decoder::BlobDecoder;
use super::renderer::{RenderEvent, RenderEventKind, Renderer};
use super::ticker::PositionTicker;
use super::timeline::PcmTimeline;
use super::types::{
    ControllerEvent, PlaybackConfig, PlaybackState, PlaybackStatus, SessionId, SourceMode,
};
use crate::clock::{Clock, SystemClock};
use crate::defaults;
use crate::download::AudioDownload;
use crate::error::TtsError;
use crate::stream::{
    ChunkStore, Consumer, FeederPhase, FeederSignal, IncrementalMediaFeeder, SinkCapability,
    SinkEvent, SinkId, SinkProbe,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

enum Source {
    Incremental(IncrementalMediaFeeder),
    Blob,
}

impl Source {
    fn mode(&self) -> SourceMode {
        match self {
            Source::Incremental(_) => SourceMode::Incremental,
            Source::Blob => SourceMode::Blob,
        }
    }
}

/// Everything owned by one utterance.
struct PlaybackSession {
    id: SessionId,
    store: ChunkStore,
    state: PlaybackState,
    source: Source,
    opened_at: Instant,
    timeline: Option<Arc<PcmTimeline>>,
    started: bool,
    paused_at: f64,
    decode_error_reported: bool,
    /// Blob renderer ran dry and waits for the next re-decode.
    starved: bool,
}

impl PlaybackSession {
    fn duration(&self) -> Option<f64> {
        let timeline = self.timeline.as_ref()?;
        (self.store.is_finalized() && timeline.is_complete()).then(|| timeline.duration_secs())
    }
}

pub struct PlaybackController {
    config: PlaybackConfig,
    probe: Box<dyn SinkProbe>,
    renderer: Box<dyn Renderer>,
    decoder: Box<dyn BlobDecoder>,
    clock: Arc<dyn Clock>,
    session: Option<PlaybackSession>,
    retired: Vec<IncrementalMediaFeeder>,
    next_session: SessionId,
    next_sink: SinkId,
    speed: f64,
    ticker: PositionTicker,
    events: Vec<ControllerEvent>,
}

impl PlaybackController {
    pub fn new(
        config: PlaybackConfig,
        probe: Box<dyn SinkProbe>,
        renderer: Box<dyn Renderer>,
        decoder: Box<dyn BlobDecoder>,
    ) -> Self {
        let speed = clamp_speed(config.initial_speed, &config).unwrap_or(defaults::PLAYBACK_SPEED);
        let ticker = PositionTicker::new(config.position_poll);
        Self {
            config,
            probe,
            renderer,
            decoder,
            clock: Arc::new(SystemClock),
            session: None,
            retired: Vec::new(),
            next_session: 0,
            next_sink: 0,
            speed,
            ticker,
            events: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn state(&self) -> PlaybackState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(PlaybackState::Idle)
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn buffered_chunks(&self) -> usize {
        self.session.as_ref().map(|s| s.store.len()).unwrap_or(0)
    }

    pub fn is_finalized(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.store.is_finalized())
    }

    pub fn source_mode(&self) -> Option<SourceMode> {
        self.session.as_ref().map(|s| s.source.mode())
    }

    /// Feeders whose teardown waits for a handshake to settle.
    pub fn retired_sinks(&self) -> usize {
        self.retired.len()
    }

    /// Take the events produced since the last call.
    pub fn drain_events(&mut self) -> Vec<ControllerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Replace any current session with a fresh one in `Buffering`.
    ///
    /// The previous session is torn down without a `PlaybackStopped` event:
    /// superseding is not a user stop.
    pub fn begin_session(&mut self) -> SessionId {
        self.teardown_session();

        self.next_session += 1;
        let id = self.next_session;
        let source = if self.config.incremental {
            self.probe_sink()
        } else {
            Source::Blob
        };
        let mode = source.mode();

        self.session = Some(PlaybackSession {
            id,
            store: ChunkStore::new(),
            state: PlaybackState::Buffering,
            source,
            opened_at: self.clock.now(),
            timeline: None,
            started: false,
            paused_at: 0.0,
            decode_error_reported: false,
            starved: false,
        });
        info!(session = id, ?mode, "playback session started");
        self.events
            .push(ControllerEvent::StateChanged(PlaybackState::Buffering));
        id
    }

    fn probe_sink(&mut self) -> Source {
        self.next_sink += 1;
        match self.probe.probe(defaults::AUDIO_MIME, self.next_sink) {
            SinkCapability::Supported(sink) => {
                let mut feeder = IncrementalMediaFeeder::new(sink);
                match feeder.open() {
                    FeederSignal::Failed(reason) => {
                        debug!("incremental sink failed to open: {}", reason);
                        self.retire(feeder);
                        Source::Blob
                    }
                    _ => Source::Incremental(feeder),
                }
            }
            SinkCapability::Unsupported { reason } => {
                debug!("incremental sink unsupported: {}", reason);
                Source::Blob
            }
        }
    }

    fn retire(&mut self, mut feeder: IncrementalMediaFeeder) {
        if !feeder.reset() {
            self.retired.push(feeder);
        }
    }

    /// Store one received fragment; `is_last` finalizes the stream.
    ///
    /// Chunks arriving with no session (after a stop) are dropped.
    pub fn add_chunk(&mut self, bytes: &[u8], is_last: bool) {
        let Some(session) = self.session.as_mut() else {
            debug!(bytes = bytes.len(), "chunk without session dropped");
            return;
        };

        if !bytes.is_empty() {
            if let Err(e) = session.store.append(bytes.to_vec()) {
                warn!("chunk rejected: {}", e);
                return;
            }
            let resume = session.started && session.starved && !is_last;
            let signal = match &mut session.source {
                Source::Incremental(feeder) => feeder.on_chunk_added(&mut session.store),
                Source::Blob => FeederSignal::Idle,
            };
            if let FeederSignal::Failed(reason) = signal {
                self.fall_back(reason);
            } else if resume && self.source_mode() == Some(SourceMode::Blob) {
                self.refresh_blob();
            }
        }

        if is_last {
            self.finalize();
        }
        self.maybe_start();
    }

    /// No more chunks will arrive for the current session.
    pub fn finalize(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.store.is_finalized() {
            return;
        }
        session.store.finalize();
        debug!(
            session = session.id,
            chunks = session.store.len(),
            bytes = session.store.total_bytes(),
            "stream finalized"
        );

        let signal = match &mut session.source {
            Source::Incremental(feeder) => feeder.finalize(&mut session.store),
            Source::Blob => FeederSignal::Idle,
        };
        let refresh = session.started && matches!(session.source, Source::Blob);
        self.events.push(ControllerEvent::StreamFinalized);

        if let FeederSignal::Failed(reason) = signal {
            self.fall_back(reason);
        } else if refresh {
            self.refresh_blob();
        }
        self.maybe_start();
    }

    /// Abandon the incremental sink for whole-blob playback.
    fn fall_back(&mut self, reason: String) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Source::Incremental(feeder) = std::mem::replace(&mut session.source, Source::Blob)
        else {
            return;
        };
        let started = session.started;
        info!(session = session.id, "falling back to whole-blob playback: {}", reason);

        self.retire(feeder);
        self.events.push(ControllerEvent::FellBack { reason });
        if started {
            self.refresh_blob();
        }
    }

    fn maybe_start(&mut self) {
        let threshold = self.config.buffer_threshold.max(1);
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.started || session.state != PlaybackState::Buffering {
            return;
        }
        let count = session.store.len();
        let finalized = session.store.is_finalized();
        if finalized && count == 0 {
            let error = TtsError::Decode {
                message: "no audio received".to_string(),
            };
            self.report_decode_failure(error.user_message());
            return;
        }
        if count < threshold && !(finalized && count > 0) {
            return;
        }

        let timeline = match &session.source {
            Source::Incremental(feeder) => {
                if !feeder.is_playable() {
                    return;
                }
                feeder.timeline()
            }
            Source::Blob => match self.decoder.decode(&session.store.concat()) {
                Ok(decoded) => {
                    let timeline = PcmTimeline::new(decoded.sample_rate);
                    timeline.push(&decoded.samples);
                    if finalized {
                        timeline.finish();
                    }
                    session.store.mark_all_consumed(Consumer::Blob);
                    Arc::new(timeline)
                }
                Err(e) => {
                    if finalized {
                        self.report_decode_failure(e.to_string());
                    } else {
                        debug!(chunks = count, "prefix not decodable yet: {}", e);
                    }
                    return;
                }
            },
        };
        self.start_playback(timeline);
    }

    fn start_playback(&mut self, timeline: Arc<PcmTimeline>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let id = session.id;
        session.timeline = Some(Arc::clone(&timeline));

        let started = match self.renderer.attach(id, timeline) {
            Ok(()) => {
                // Tempo must be in place before the first sample is rendered.
                self.renderer.set_speed(self.speed, self.config.preserve_pitch);
                self.renderer.play()
            }
            Err(e) => Err(e),
        };
        if let Err(e) = started {
            warn!("could not start playback: {}", e);
            self.events.push(ControllerEvent::Error(e.user_message()));
            return;
        }

        session.started = true;
        info!(session = id, chunks = session.store.len(), "playback started");
        self.set_state(PlaybackState::Playing);
    }

    /// Re-decode the whole stream and append what the timeline lacks.
    fn refresh_blob(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(timeline) = session.timeline.clone() else {
            return;
        };
        let finalized = session.store.is_finalized();

        match self.decoder.decode(&session.store.concat()) {
            Ok(decoded) => {
                let added = timeline.extend_to(&decoded.samples);
                session.store.mark_all_consumed(Consumer::Blob);
                if added > 0 {
                    session.starved = false;
                }
                debug!(session = session.id, added, "timeline extended");
            }
            Err(e) if finalized => {
                self.report_decode_failure(e.to_string());
            }
            Err(e) => debug!("re-decode failed, retrying later: {}", e),
        }
        if finalized {
            timeline.finish();
        }
    }

    fn report_decode_failure(&mut self, message: String) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.decode_error_reported {
            return;
        }
        session.decode_error_reported = true;
        warn!(session = session.id, "decode failed: {}", message);
        self.events.push(ControllerEvent::Error(message));
    }

    fn set_state(&mut self, state: PlaybackState) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.state == state {
            return;
        }
        debug!(session = session.id, from = %session.state, to = %state, "state change");
        session.state = state;
        if state == PlaybackState::Playing {
            self.ticker.start(self.clock.now());
        } else {
            self.ticker.stop();
        }
        self.events.push(ControllerEvent::StateChanged(state));
    }

    /// Route an incremental sink event to its feeder, live or retired.
    pub fn handle_sink_event(&mut self, event: SinkEvent) {
        let target = event.sink();

        if let Some(session) = self.session.as_mut()
            && let Source::Incremental(feeder) = &mut session.source
            && feeder.id() == target
        {
            match feeder.handle_event(&event, &mut session.store) {
                FeederSignal::Failed(reason) => self.fall_back(reason),
                FeederSignal::Ready | FeederSignal::Idle | FeederSignal::TornDown => {}
            }
            self.maybe_start();
            return;
        }

        if let Some(index) = self.retired.iter().position(|f| f.id() == target)
            && self.retired[index].handle_retired_event(&event)
        {
            debug!(sink = target, "retired sink released");
            self.retired.remove(index);
        }
    }

    /// Handle an end or starvation report from the renderer.
    pub fn handle_render_event(&mut self, event: RenderEvent) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if event.session != session.id {
            debug!(session = event.session, "stale render event ignored");
            return;
        }
        let finalized = session.store.is_finalized();
        let blob = matches!(session.source, Source::Blob);

        match event.kind {
            RenderEventKind::Ended if finalized && session.state == PlaybackState::Playing => {
                info!(session = session.id, "playback complete");
                self.set_state(PlaybackState::Completed);
            }
            RenderEventKind::Ended | RenderEventKind::Starved => {
                if blob && !finalized {
                    session.starved = true;
                    self.refresh_blob();
                }
            }
        }
    }

    /// Periodic poll: bounds the sink handshake and emits position updates.
    pub fn tick(&mut self) {
        let now = self.clock.now();

        let timed_out = self.session.as_ref().is_some_and(|s| {
            !s.started
                && matches!(&s.source, Source::Incremental(f) if f.phase() == FeederPhase::Opening)
                && now.duration_since(s.opened_at) >= self.config.sink_ready_timeout
        });
        if timed_out {
            self.fall_back(format!(
                "sink not ready after {} ms",
                self.config.sink_ready_timeout.as_millis()
            ));
            self.maybe_start();
        }

        if self.ticker.due(now) {
            let status = self.status();
            self.events.push(ControllerEvent::Progress(status));
        }
    }

    /// Playing pauses; Paused resumes from the snapshot; Completed replays.
    pub fn toggle_play_pause(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.state {
            PlaybackState::Playing => {
                self.renderer.pause();
                session.paused_at = self.renderer.position();
                self.set_state(PlaybackState::Paused);
            }
            PlaybackState::Paused => {
                self.renderer.seek(session.paused_at);
                self.resume();
            }
            PlaybackState::Completed => {
                self.renderer.seek(0.0);
                self.resume();
            }
            PlaybackState::Idle | PlaybackState::Buffering => {}
        }
    }

    fn resume(&mut self) {
        match self.renderer.play() {
            Ok(()) => self.set_state(PlaybackState::Playing),
            Err(e) => {
                warn!("could not resume playback: {}", e);
                self.events.push(ControllerEvent::Error(e.user_message()));
            }
        }
    }

    /// Rewind allowed: audio exists and the stream is finalized.
    pub fn can_rewind(&self) -> bool {
        self.session.as_ref().is_some_and(|s| {
            s.started
                && s.store.is_finalized()
                && matches!(
                    s.state,
                    PlaybackState::Playing | PlaybackState::Paused | PlaybackState::Completed
                )
        })
    }

    /// Move back by the rewind step of logical time. From `Completed`, lands
    /// one step before the end and pauses. Returns whether it moved.
    pub fn rewind(&mut self) -> bool {
        if !self.can_rewind() {
            return false;
        }
        let step = self.config.rewind_secs;
        let Some(session) = self.session.as_mut() else {
            return false;
        };

        match session.state {
            PlaybackState::Completed => {
                let end = session.duration().unwrap_or_else(|| self.renderer.position());
                let target = (end - step).max(0.0);
                self.renderer.seek(target);
                session.paused_at = target;
                self.set_state(PlaybackState::Paused);
            }
            PlaybackState::Playing => {
                let target = (self.renderer.position() - step).max(0.0);
                self.renderer.seek(target);
            }
            PlaybackState::Paused => {
                let target = (session.paused_at - step).max(0.0);
                self.renderer.seek(target);
                session.paused_at = target;
            }
            PlaybackState::Idle | PlaybackState::Buffering => return false,
        }
        true
    }

    /// Clamp and apply a playback speed. Returns the stored speed.
    ///
    /// NaN requests are ignored.
    pub fn set_speed(&mut self, requested: f64) -> f64 {
        let Some(speed) = clamp_speed(requested, &self.config) else {
            return self.speed;
        };
        if speed == self.speed {
            return speed;
        }
        self.speed = speed;
        if self.session.as_ref().is_some_and(|s| s.started) {
            self.renderer.set_speed(speed, self.config.preserve_pitch);
        }
        debug!(speed, "speed changed");
        self.events.push(ControllerEvent::SpeedChanged(speed));
        speed
    }

    pub fn speed_up(&mut self) -> f64 {
        self.set_speed(snap(self.speed + self.config.speed_step, self.config.speed_step))
    }

    pub fn slow_down(&mut self) -> f64 {
        self.set_speed(snap(self.speed - self.config.speed_step, self.config.speed_step))
    }

    /// The complete stream for saving; `None` until finalized.
    pub fn download(&self) -> Option<AudioDownload> {
        let session = self.session.as_ref()?;
        if !session.store.is_finalized() || session.store.is_empty() {
            return None;
        }
        Some(AudioDownload::new(session.store.concat(), chrono::Utc::now()))
    }

    /// Tear down the session and return to `Idle`. Safe from any state.
    pub fn stop(&mut self) {
        let Some(id) = self.session_id() else {
            return;
        };
        self.teardown_session();
        info!(session = id, "playback stopped");
        self.events
            .push(ControllerEvent::StateChanged(PlaybackState::Idle));
        self.events.push(ControllerEvent::PlaybackStopped);
    }

    fn teardown_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.ticker.stop();
        self.renderer.detach();
        if let Source::Incremental(feeder) = session.source {
            self.retire(feeder);
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        let Some(session) = self.session.as_ref() else {
            return PlaybackStatus {
                state: PlaybackState::Idle,
                buffering: false,
                elapsed_secs: 0.0,
                duration_secs: None,
                speed: self.speed,
                can_rewind: false,
                can_download: false,
                buffered_chunks: 0,
                mode: None,
            };
        };

        let duration = session.duration();
        let elapsed = match session.state {
            PlaybackState::Playing => self.renderer.position(),
            PlaybackState::Paused => session.paused_at,
            PlaybackState::Completed => duration.unwrap_or_else(|| self.renderer.position()),
            PlaybackState::Idle | PlaybackState::Buffering => 0.0,
        };

        PlaybackStatus {
            state: session.state,
            buffering: !session.store.is_finalized(),
            elapsed_secs: elapsed,
            duration_secs: duration,
            speed: self.speed,
            can_rewind: self.can_rewind(),
            can_download: session.store.is_finalized() && !session.store.is_empty(),
            buffered_chunks: session.store.len(),
            mode: Some(session.source.mode()),
        }
    }
}

fn clamp_speed(requested: f64, config: &PlaybackConfig) -> Option<f64> {
    if requested.is_nan() {
        return None;
    }
    Some(requested.clamp(config.min_speed, config.max_speed))
}

/// Round to the nearest multiple of `step`, then to two decimals.
fn snap(value: f64, step: f64) -> f64 {
    let stepped = if step > 0.0 {
        (value / step).round() * step
    } else {
        value
    };
    (stepped * 100.0).round() / 100.0
}
