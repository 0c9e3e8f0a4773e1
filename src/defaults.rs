//! Default configuration constants for whisper-tts.
//!
//! Shared by the configuration types, the playback controller and the
//! speech client so that every layer agrees on the same limits.

/// Speech endpoint of the provider.
pub const API_ENDPOINT: &str = "https://api.openai.com/v1/audio/speech";

/// Provider ceiling for a single request's `input`, in characters.
///
/// Longer text is segmented, never rejected.
pub const MAX_SEGMENT_CHARS: usize = 4096;

/// Audio codec requested from the provider.
pub const RESPONSE_FORMAT: &str = "mp3";

/// MIME type of the streamed audio and of downloaded files.
pub const AUDIO_MIME: &str = "audio/mpeg";

/// Prefix of downloaded file names.
pub const DOWNLOAD_PREFIX: &str = "whisper-tts";

/// Default voice.
pub const DEFAULT_VOICE: &str = "alloy";

/// Default model.
pub const DEFAULT_MODEL: &str = "tts-1";

/// Model that accepts free-form `instructions`.
pub const INSTRUCTION_MODEL: &str = "gpt-4o-mini-tts";

/// Default client-side playback speed.
pub const PLAYBACK_SPEED: f64 = 1.0;

/// Slowest playback speed.
pub const MIN_SPEED: f64 = 0.2;

/// Fastest playback speed.
pub const MAX_SPEED: f64 = 3.0;

/// Increment used by the speed up / slow down controls.
pub const SPEED_STEP: f64 = 0.1;

/// Logical seconds moved back by one rewind.
pub const REWIND_SECS: f64 = 5.0;

/// Number of received chunks before audible playback starts.
///
/// Small enough to start within the first second of a response, large
/// enough that the decoder has a few frames to lock onto.
pub const BUFFER_THRESHOLD: usize = 4;

/// How long to wait for the incremental sink handshake before falling back
/// to whole-blob playback.
pub const SINK_READY_TIMEOUT_MS: u64 = 2000;

/// Interval of the bounded poll on the sink handshake.
pub const SINK_POLL_INTERVAL_MS: u64 = 100;

/// Interval of the position timer that feeds the status line.
pub const POSITION_POLL_MS: u64 = 100;

/// How long info notices stay visible.
pub const NOTICE_DISMISS_MS: u64 = 3000;

/// Bound on connecting and on each wait for response data.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Sample rate of the provider's MP3 output, used until the decoder reports one.
pub const SOURCE_SAMPLE_RATE: u32 = 24000;

/// Text spoken by `test-voice` when none is given.
pub const PREVIEW_TEXT: &str = "Welcome to Whisper to Me. This extension uses OpenAI's advanced \
text-to-speech technology to read any selected text aloud with natural, expressive voices.";

/// Environment variable consulted when no API key is stored.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
