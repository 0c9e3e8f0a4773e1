//! Speak command entry point.
//!
//! Wires the speech service, the playback controller and the terminal:
//! stream events → controller, sink/render events → controller, stdin
//! lines → controls, controller events → status line and notices.

use crate::download::AudioDownload;
use crate::notice::{Notice, NoticeBoard};
use crate::output;
use crate::playback::{ControllerEvent, PlaybackController, PlaybackState, RenderEvent};
use crate::service::{StreamId, TtsService};
use crate::settings::{Settings, SettingsPatch};
use crate::stream::SinkEvent;
use crate::tts::StreamEvent;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One line typed while audio plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKey {
    TogglePlay,
    Rewind,
    Faster,
    Slower,
    Download,
    Dismiss,
    Quit,
}

impl ControlKey {
    /// Parse a stdin line. An empty line (bare Enter) toggles play/pause.
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Some(ControlKey::TogglePlay);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "p" | "space" => Some(ControlKey::TogglePlay),
            "r" => Some(ControlKey::Rewind),
            "+" | "=" => Some(ControlKey::Faster),
            "-" | "_" => Some(ControlKey::Slower),
            "d" => Some(ControlKey::Download),
            "x" => Some(ControlKey::Dismiss),
            "q" => Some(ControlKey::Quit),
            _ => None,
        }
    }
}

/// Whether the event loop keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

#[derive(Debug, Clone)]
pub struct SpeakOptions {
    /// Controls on stdin; when false the run ends on completion.
    pub interactive: bool,
    pub quiet: bool,
    /// Save the audio as soon as the stream is finalized.
    pub save: bool,
    pub download_dir: PathBuf,
}

/// Glue between one speech service and one playback controller.
pub struct Player {
    service: TtsService,
    controller: PlaybackController,
    notices: NoticeBoard,
    options: SpeakOptions,
    failure: Option<String>,
}

impl Player {
    pub fn new(service: TtsService, controller: PlaybackController, options: SpeakOptions) -> Self {
        Self {
            service,
            controller,
            notices: NoticeBoard::default(),
            options,
            failure: None,
        }
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn service(&self) -> &TtsService {
        &self.service
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    /// Error that ended a non-interactive run.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Request speech for `text` and open a playback session for it.
    ///
    /// Returns `Ok(false)` when there is nothing to speak.
    pub fn start(&mut self, text: &str, settings: Settings) -> crate::error::Result<bool> {
        let Some(stream) = self.service.start_session(text, Some(settings))? else {
            return Ok(false);
        };
        let session = self.controller.begin_session();
        debug!(stream, session, "session opened");
        self.drain();
        Ok(true)
    }

    pub fn on_stream_event(&mut self, id: StreamId, event: StreamEvent) -> Flow {
        if self.service.current_stream() != Some(id) {
            debug!(stream = id, "stale stream event ignored");
            return Flow::Continue;
        }
        match event {
            StreamEvent::Chunk { bytes, is_last } => {
                self.controller.add_chunk(&bytes, is_last);
                if is_last {
                    self.service.finish(id);
                }
            }
            StreamEvent::Error(message) => {
                warn!(stream = id, "speech stream failed: {}", message);
                self.service.finish(id);
                self.controller.stop();
                self.fail(message);
            }
        }
        self.drain()
    }

    pub fn on_sink_event(&mut self, event: SinkEvent) -> Flow {
        self.controller.handle_sink_event(event);
        self.drain()
    }

    pub fn on_render_event(&mut self, event: RenderEvent) -> Flow {
        self.controller.handle_render_event(event);
        self.drain()
    }

    pub fn on_tick(&mut self) -> Flow {
        self.controller.tick();
        self.notices.expire(Instant::now());
        self.drain()
    }

    pub fn on_key(&mut self, key: ControlKey) -> Flow {
        match key {
            ControlKey::TogglePlay => self.controller.toggle_play_pause(),
            ControlKey::Rewind => {
                if !self.controller.rewind() {
                    self.notify(Notice::info(
                        "Rewind is available once the audio has fully arrived",
                        Instant::now(),
                    ));
                }
            }
            ControlKey::Faster => {
                self.controller.speed_up();
            }
            ControlKey::Slower => {
                self.controller.slow_down();
            }
            ControlKey::Download => match self.controller.download() {
                Some(download) => self.save(&download),
                None => self.notify(Notice::info(
                    "Audio is still streaming; try again when it completes",
                    Instant::now(),
                )),
            },
            ControlKey::Dismiss => {
                if self.notices.dismiss() {
                    self.redraw();
                }
            }
            ControlKey::Quit => {
                self.shutdown();
                return Flow::Exit;
            }
        }
        self.drain()
    }

    /// Stop the stream and playback. Safe to call more than once.
    pub fn shutdown(&mut self) {
        self.service.stop();
        self.controller.stop();
        self.drain();
        if !self.options.quiet {
            output::clear_line();
        }
    }

    fn drain(&mut self) -> Flow {
        let mut flow = Flow::Continue;
        for event in self.controller.drain_events() {
            if self.handle_controller_event(event) == Flow::Exit {
                flow = Flow::Exit;
            }
        }
        if self.failure.is_some() && !self.options.interactive {
            flow = Flow::Exit;
        }
        flow
    }

    fn handle_controller_event(&mut self, event: ControllerEvent) -> Flow {
        match event {
            ControllerEvent::StateChanged(state) => {
                self.redraw();
                if state == PlaybackState::Completed {
                    info!("playback complete");
                    if !self.options.interactive {
                        return Flow::Exit;
                    }
                    self.notify(Notice::info("Playback complete", Instant::now()));
                }
            }
            ControllerEvent::Progress(status) => {
                if !self.options.quiet {
                    output::render_status(&status);
                }
            }
            ControllerEvent::StreamFinalized => {
                if self.options.save
                    && let Some(download) = self.controller.download()
                {
                    self.save(&download);
                }
            }
            ControllerEvent::SpeedChanged(speed) => {
                if let Err(e) = self
                    .service
                    .settings()
                    .save_settings(&SettingsPatch::speed(speed))
                {
                    warn!("could not persist playback speed: {}", e);
                }
                self.redraw();
            }
            ControllerEvent::FellBack { reason } => {
                debug!("whole-stream playback: {}", reason);
            }
            ControllerEvent::Error(message) => self.fail(message),
            ControllerEvent::PlaybackStopped => self.service.stop(),
        }
        Flow::Continue
    }

    fn save(&mut self, download: &AudioDownload) {
        match download.save_to(&self.options.download_dir) {
            Ok(path) => {
                info!(path = %path.display(), "audio saved");
                self.notify(Notice::info(
                    format!("Saved {}", path.display()),
                    Instant::now(),
                ));
            }
            Err(e) => self.notify(Notice::error(
                format!("Could not save audio: {}", e),
                Instant::now(),
            )),
        }
    }

    fn fail(&mut self, message: String) {
        self.notify(Notice::error(message.clone(), Instant::now()));
        self.failure = Some(message);
    }

    fn notify(&mut self, notice: Notice) {
        if !self.options.quiet || notice.requires_dismiss() {
            output::render_notice(&notice);
        }
        self.notices.show(notice);
        self.redraw();
    }

    fn redraw(&self) {
        if !self.options.quiet && self.controller.state() != PlaybackState::Idle {
            output::render_status(&self.controller.status());
        }
    }
}

#[cfg(all(feature = "cpal-audio", feature = "http"))]
mod run {
    use super::{ControlKey, Flow, Player, SpeakOptions};
    use crate::audio::{CpalRenderer, Mp3Decoder, Mp3SinkProbe, suppress_audio_warnings};
    use crate::config::Config;
    use crate::output;
    use crate::playback::PlaybackController;
    use crate::service::TtsService;
    use crate::settings::{Settings, SettingsGateway};
    use crate::tts::OpenAiTransport;
    use anyhow::{Context, Result, bail};
    use std::io::BufRead;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::MissedTickBehavior;
    use tracing::debug;

    /// Speak `text` and run the interactive player until it finishes.
    pub async fn run_speak_command(
        config: Config,
        settings: Settings,
        store: Arc<dyn SettingsGateway>,
        text: String,
        options: SpeakOptions,
    ) -> Result<()> {
        suppress_audio_warnings();

        let (stream_tx, mut stream_rx) = mpsc::unbounded_channel();
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
        let (render_tx, mut render_rx) = mpsc::unbounded_channel();

        let transport = OpenAiTransport::new(config.api.endpoint.clone(), config.request_timeout())
            .context("Failed to create HTTP client")?;
        let service = TtsService::new(Arc::new(transport), store, stream_tx);

        let renderer = CpalRenderer::new(config.audio.device.as_deref(), render_tx)
            .context("Failed to open audio output")?;
        let controller = PlaybackController::new(
            config.to_playback_config(settings.playback_speed),
            Box::new(Mp3SinkProbe::new(sink_tx)),
            Box::new(renderer),
            Box::new(Mp3Decoder),
        );

        let interactive = options.interactive;
        let quiet = options.quiet;
        let mut player = Player::new(service, controller, options);
        if !player.start(&text, settings)? {
            if !quiet {
                eprintln!("Nothing to speak.");
            }
            return Ok(());
        }
        if interactive && !quiet {
            eprintln!("{}", output::CONTROLS_HINT);
        }

        let mut keys = spawn_key_reader(interactive);
        let mut tick = tokio::time::interval(Duration::from_millis(
            config.playback.sink_poll_interval_ms.max(1),
        ));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let flow = tokio::select! {
                Some((id, event)) = stream_rx.recv() => player.on_stream_event(id, event),
                Some(event) = sink_rx.recv() => player.on_sink_event(event),
                Some(event) = render_rx.recv() => player.on_render_event(event),
                Some(line) = keys.recv() => match ControlKey::parse(&line) {
                    Some(key) => player.on_key(key),
                    None => {
                        debug!(line = %line.trim(), "unknown control");
                        Flow::Continue
                    }
                },
                _ = tick.tick() => player.on_tick(),
                _ = tokio::signal::ctrl_c() => {
                    player.shutdown();
                    Flow::Exit
                }
            };
            if flow == Flow::Exit {
                break;
            }
        }

        player.shutdown();
        if let Some(message) = player.failure() {
            bail!("{}", message);
        }
        Ok(())
    }

    /// Forward stdin lines from a dedicated thread. The receiver stays empty
    /// when controls are disabled.
    fn spawn_key_reader(interactive: bool) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        if interactive {
            let spawned = std::thread::Builder::new()
                .name("stdin-keys".to_string())
                .spawn(move || {
                    let stdin = std::io::stdin();
                    for line in stdin.lock().lines() {
                        let Ok(line) = line else { break };
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                });
            if let Err(e) = spawned {
                debug!("controls unavailable: {}", e);
            }
        }
        rx
    }
}

#[cfg(all(feature = "cpal-audio", feature = "http"))]
pub use run::run_speak_command;
