//! Command-line interface for whisper-tts
//!
//! Provides argument parsing using clap derive macros.

use clap::{ArgAction, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Read text aloud with streamed OpenAI speech
#[derive(Parser, Debug)]
#[command(
    name = "whisper-tts",
    version,
    about = "Read text aloud with streamed OpenAI speech"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Text to speak (default: read from --file or stdin)
    #[arg(value_name = "TEXT")]
    pub text: Vec<String>,

    /// Read the text from a file
    #[arg(long, short = 'f', value_name = "PATH", conflicts_with = "text")]
    pub file: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose diagnostics (-v: info, -vv: debug, -vvv: trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(flatten)]
    pub voice: VoiceArgs,

    /// Audio output device (see `whisper-tts devices`)
    #[arg(long, global = true, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Playback speed (0.2 - 3.0)
    #[arg(long, short = 's', value_name = "FACTOR")]
    pub speed: Option<f64>,

    /// Skip incremental decoding and play the whole stream as one blob
    #[arg(long)]
    pub no_stream: bool,

    /// Keep pitch constant when changing speed
    #[arg(long, overrides_with = "no_pitch")]
    pub pitch: bool,

    /// Let pitch follow speed
    #[arg(long, overrides_with = "pitch")]
    pub no_pitch: bool,

    /// How long to wait for the incremental decoder (e.g. 2s, 1500ms)
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub sink_timeout: Option<Duration>,

    /// Save the audio to the download directory when the stream completes
    #[arg(long)]
    pub save: bool,
}

/// Voice selection shared by speaking and `test-voice`
#[derive(clap::Args, Debug, Clone, Default, PartialEq)]
pub struct VoiceArgs {
    /// Voice (alloy, ash, ballad, coral, echo, fable, onyx, nova, sage, shimmer, verse)
    #[arg(long, global = true, value_name = "VOICE")]
    pub voice: Option<String>,

    /// Model (tts-1, tts-1-hd, gpt-4o-mini-tts)
    #[arg(long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Speaking instructions (gpt-4o-mini-tts only)
    #[arg(long, global = true, value_name = "TEXT")]
    pub instructions: Option<String>,
}

impl Cli {
    /// `Some(true)` for `--pitch`, `Some(false)` for `--no-pitch`.
    pub fn preserve_pitch(&self) -> Option<bool> {
        match (self.pitch, self.no_pitch) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

/// Parse a duration string.
///
/// Supports any duration format accepted by `humantime`; a bare number is
/// taken as milliseconds.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check the API key and voice with a short request
    TestVoice {
        /// Text to speak (default: a short introduction)
        text: Vec<String>,
    },

    /// List voices and the models that offer them
    Voices,

    /// List available audio output devices
    Devices,

    /// View and change stored settings and the API key
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Settings actions
#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    /// Show current settings
    Show,
    /// Store the OpenAI API key
    SetKey {
        /// Key starting with sk- (read from stdin when omitted)
        key: Option<String>,
    },
    /// Remove all stored settings, including the API key
    ClearKey,
    /// Change voice, model, speed or instructions
    Set {
        #[arg(long, value_name = "VOICE")]
        voice: Option<String>,
        #[arg(long, value_name = "MODEL")]
        model: Option<String>,
        #[arg(long, value_name = "FACTOR")]
        speed: Option<f64>,
        #[arg(long, value_name = "TEXT")]
        instructions: Option<String>,
    },
    /// Restore default voice, model and instructions (keeps the API key)
    Reset,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Dump,
    /// Print the configuration file path
    Path,
}
