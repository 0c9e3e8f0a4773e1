//! whisper-tts - Read text aloud with streamed OpenAI speech
//!
//! Long text is split into request-sized segments, spoken through the
//! OpenAI speech endpoint, and played back while it is still arriving.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cpal-audio")]
pub mod audio;
pub mod catalog;
#[cfg(feature = "cli")]
pub mod cli;
pub mod clock;
pub mod config;
pub mod defaults;
pub mod download;
pub mod error;
pub mod logging;
pub mod notice;
#[cfg(feature = "cli")]
pub mod output;
pub mod playback;
pub mod protocol;
pub mod service;
pub mod settings;
pub mod stream;
pub mod text;
pub mod tts;

// Composition root - needs the terminal surface
#[cfg(feature = "cli")]
pub mod app;

// Seams (platform pieces behind traits)
pub use clock::{Clock, SystemClock};
pub use playback::{BlobDecoder, Renderer};
pub use settings::SettingsGateway;
pub use stream::{IncrementalSink, SinkProbe};
pub use tts::SpeechTransport;

// Core
pub use playback::{PlaybackController, PlaybackState};
pub use service::TtsService;
pub use stream::{ChunkStore, IncrementalMediaFeeder};
pub use text::{Segment, segment};
pub use tts::StreamOrchestrator;

// Error handling
pub use error::{Result, TtsError};

// Config
pub use config::Config;
pub use settings::Settings;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
