//! Audio output using CPAL (Cross-Platform Audio Library).
//!
//! The output callback pulls mono samples from the attached timeline through
//! the tempo strategy, resamples them to the device rate and copies them to
//! every output channel. Reaching the end of a complete timeline, or running
//! dry while more audio is expected, is reported once as a [`RenderEvent`].

use crate::error::{Result, TtsError};
use crate::playback::renderer::{RenderEvent, RenderEventKind, Renderer};
use crate::playback::tempo::{TempoStrategy, strategy_for};
use crate::playback::timeline::PcmTimeline;
use crate::playback::types::SessionId;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// CPAL probing makes ALSA/JACK print harmless but confusing messages.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2.
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Keep JACK from starting a server while CPAL probes backends.
///
/// # Safety
/// Modifies environment variables; call at startup before spawning threads.
pub fn suppress_audio_warnings() {
    // SAFETY: Called at startup before any threads are spawned
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("ALSA_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

/// Preferred device names for GNOME/PipeWire environments.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns that are raw ALSA plugins rather than usable sinks.
const FILTERED_PATTERNS: &[&str] = &[
    "surround", "front:", "rear:", "center:", "side:", "dmix", "null",
];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List output devices, marking preferred ones with "\[recommended\]".
pub fn list_devices() -> Result<Vec<String>> {
    let devices = with_suppressed_stderr(|| cpal::default_host().output_devices())
        .map_err(|e| TtsError::AudioOutput {
            message: format!("Failed to enumerate output devices: {}", e),
        })?;

    let mut names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                names.push(format!("{} [recommended]", name));
            } else {
                names.push(name);
            }
        }
    }
    Ok(names)
}

fn find_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.output_devices().map_err(|e| TtsError::AudioOutput {
            message: format!("Failed to enumerate output devices: {}", e),
        })?;

        if let Some(wanted) = device_name {
            for device in devices {
                if let Ok(name) = device.name()
                    && name == wanted
                {
                    return Ok(device);
                }
            }
            return Err(TtsError::AudioDeviceNotFound {
                device: wanted.to_string(),
            });
        }

        for device in devices {
            if let Ok(name) = device.name()
                && is_preferred_device(&name)
            {
                return Ok(device);
            }
        }
        host.default_output_device()
            .ok_or_else(|| TtsError::AudioDeviceNotFound {
                device: "default".to_string(),
            })
    })
}

/// Linear-interpolation rate converter from the timeline rate to the device rate.
#[derive(Debug, Default)]
struct Resampler {
    pending: Vec<f32>,
    scratch: Vec<f32>,
    pos: f64,
}

const PULL_SAMPLES: usize = 512;

impl Resampler {
    /// Fill `out`, pulling source samples from `pull` as needed. `ratio` is
    /// source samples per output sample. Returns samples written.
    fn fill<F>(&mut self, out: &mut [f32], ratio: f64, mut pull: F) -> usize
    where
        F: FnMut(&mut [f32]) -> usize,
    {
        for (i, slot) in out.iter_mut().enumerate() {
            let idx = self.pos.floor() as usize;
            while self.pending.len() < idx + 2 {
                self.scratch.resize(PULL_SAMPLES, 0.0);
                let n = pull(&mut self.scratch);
                if n == 0 {
                    self.compact();
                    return i;
                }
                self.pending.extend_from_slice(&self.scratch[..n]);
            }
            let frac = (self.pos - idx as f64) as f32;
            *slot = self.pending[idx] * (1.0 - frac) + self.pending[idx + 1] * frac;
            self.pos += ratio;
        }
        self.compact();
        out.len()
    }

    fn compact(&mut self) {
        let consumed = (self.pos.floor() as usize).min(self.pending.len());
        self.pending.drain(..consumed);
        self.pos -= consumed as f64;
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.pos = 0.0;
    }
}

/// Everything the output callback touches.
struct RenderState {
    session: Option<SessionId>,
    timeline: Option<Arc<PcmTimeline>>,
    tempo: Box<dyn TempoStrategy>,
    speed: f64,
    /// Read position in timeline samples; doubles as the logical position.
    cursor: f64,
    playing: bool,
    device_rate: u32,
    resampler: Resampler,
    mono: Vec<f32>,
    notified: Option<RenderEventKind>,
}

impl RenderState {
    fn new(device_rate: u32) -> Self {
        Self {
            session: None,
            timeline: None,
            tempo: strategy_for(true),
            speed: 1.0,
            cursor: 0.0,
            playing: false,
            device_rate,
            resampler: Resampler::default(),
            mono: Vec::new(),
            notified: None,
        }
    }

    fn rewind_buffers(&mut self) {
        self.tempo.reset();
        self.resampler.reset();
        self.notified = None;
    }

    fn position(&self) -> f64 {
        match &self.timeline {
            Some(timeline) => self.cursor / timeline.sample_rate().max(1) as f64,
            None => 0.0,
        }
    }

    /// Fill interleaved `out`; returns an event when playback stalls or ends.
    fn render(&mut self, out: &mut [f32], channels: usize) -> Option<RenderEvent> {
        out.fill(0.0);
        if !self.playing {
            return None;
        }
        let (Some(timeline), Some(session)) = (self.timeline.clone(), self.session) else {
            return None;
        };

        let channels = channels.max(1);
        let frames = out.len() / channels;
        let ratio = timeline.sample_rate() as f64 / self.device_rate.max(1) as f64;
        let mut mono = std::mem::take(&mut self.mono);
        mono.clear();
        mono.resize(frames, 0.0);

        let speed = self.speed;
        let tempo = &mut self.tempo;
        let cursor = &mut self.cursor;
        let resampler = &mut self.resampler;
        let (written, complete) = timeline.with_samples(|source, complete| {
            let written = resampler.fill(&mut mono, ratio, |buf| {
                tempo.process(source, complete, cursor, speed, buf)
            });
            (written, complete)
        });

        for (frame, &sample) in out.chunks_mut(channels).zip(&mono[..written]) {
            frame.fill(sample);
        }
        self.mono = mono;

        if written == frames {
            self.notified = None;
            return None;
        }

        let kind = if complete {
            self.playing = false;
            RenderEventKind::Ended
        } else {
            RenderEventKind::Starved
        };
        if self.notified == Some(kind) {
            return None;
        }
        self.notified = Some(kind);
        Some(RenderEvent { session, kind })
    }
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only created, played and dropped by the owning
/// `CpalRenderer`, which is driven from a single task.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Renderer on a CPAL output device.
pub struct CpalRenderer {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    stream: Option<SendableStream>,
    state: Arc<Mutex<RenderState>>,
    events: UnboundedSender<RenderEvent>,
}

impl CpalRenderer {
    /// Open `device_name`, or the preferred/default output device.
    pub fn new(device_name: Option<&str>, events: UnboundedSender<RenderEvent>) -> Result<Self> {
        let device = find_device(device_name)?;
        let default_config = device
            .default_output_config()
            .map_err(|e| TtsError::AudioOutput {
                message: format!("Failed to query default output config: {}", e),
            })?;

        let sample_format = default_config.sample_format();
        let config: cpal::StreamConfig = default_config.into();
        info!(
            device = %device.name().unwrap_or_default(),
            channels = config.channels,
            rate = config.sample_rate,
            format = ?sample_format,
            "audio output ready"
        );

        Ok(Self {
            state: Arc::new(Mutex::new(RenderState::new(config.sample_rate))),
            device,
            config,
            sample_format,
            stream: None,
            events,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RenderState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn build_stream(&self) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let channels = self.config.channels as usize;
        let err_callback = |err| {
            warn!("audio output error: {}", err);
        };

        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let stream = match self.sample_format {
            SampleFormat::F32 => self.device.build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let event = state
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .render(data, channels);
                    if let Some(event) = event
                        && events.send(event).is_err()
                    {
                        debug!("render event receiver closed");
                    }
                },
                err_callback,
                None,
            ),
            SampleFormat::I16 => {
                let mut scratch: Vec<f32> = Vec::new();
                self.device.build_output_stream(
                    &self.config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        scratch.resize(data.len(), 0.0);
                        let event = state
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .render(&mut scratch, channels);
                        for (out, &s) in data.iter_mut().zip(&scratch) {
                            *out = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                        }
                        if let Some(event) = event
                            && events.send(event).is_err()
                        {
                            debug!("render event receiver closed");
                        }
                    },
                    err_callback,
                    None,
                )
            }
            fmt => {
                return Err(TtsError::AudioOutput {
                    message: format!(
                        "Unsupported output sample format: {:?}. \
                         Try specifying a device with --device.",
                        fmt
                    ),
                });
            }
        };

        stream.map_err(|e| TtsError::AudioOutput {
            message: format!("Failed to build output stream: {}", e),
        })
    }

    fn ensure_stream(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = with_suppressed_stderr(|| self.build_stream())?;
        stream.play().map_err(|e| TtsError::AudioOutput {
            message: format!("Failed to start output stream: {}", e),
        })?;
        self.stream = Some(SendableStream(stream));
        Ok(())
    }
}

impl Renderer for CpalRenderer {
    fn attach(&mut self, session: SessionId, timeline: Arc<PcmTimeline>) -> Result<()> {
        self.ensure_stream()?;
        let mut state = self.lock();
        state.session = Some(session);
        state.timeline = Some(timeline);
        state.cursor = 0.0;
        state.playing = false;
        state.rewind_buffers();
        Ok(())
    }

    fn set_speed(&mut self, speed: f64, preserve_pitch: bool) {
        let mut state = self.lock();
        if state.tempo.preserves_pitch() != preserve_pitch {
            state.tempo = strategy_for(preserve_pitch);
        }
        state.speed = speed;
    }

    fn play(&mut self) -> Result<()> {
        self.ensure_stream()?;
        let mut state = self.lock();
        if state.timeline.is_none() {
            return Err(TtsError::AudioOutput {
                message: "nothing attached to play".to_string(),
            });
        }
        state.playing = true;
        state.notified = None;
        Ok(())
    }

    fn pause(&mut self) {
        self.lock().playing = false;
    }

    fn seek(&mut self, secs: f64) {
        let mut state = self.lock();
        let Some(timeline) = state.timeline.clone() else {
            return;
        };
        let target = (secs.max(0.0) * timeline.sample_rate() as f64).min(timeline.len() as f64);
        state.cursor = target;
        state.rewind_buffers();
    }

    fn position(&self) -> f64 {
        self.lock().position()
    }

    fn detach(&mut self) {
        let mut state = self.lock();
        state.session = None;
        state.timeline = None;
        state.playing = false;
        state.cursor = 0.0;
        state.rewind_buffers();
    }
}
