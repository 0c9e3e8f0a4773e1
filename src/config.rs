use crate::defaults;
use crate::error::{Result, TtsError};
use crate::playback::PlaybackConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Hard limits accepted for the speed range.
const SPEED_FLOOR: f64 = 0.1;
const SPEED_CEILING: f64 = 4.0;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub playback: PlaybackSection,
    pub audio: AudioConfig,
    pub output: OutputConfig,
}

/// Speech endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub endpoint: String,
    /// Connect timeout and longest silence between reads; a slow body that
    /// keeps arriving is never cut off.
    pub timeout_secs: u64,
}

/// Playback tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackSection {
    pub buffer_threshold: usize,
    pub sink_ready_timeout_ms: u64,
    pub sink_poll_interval_ms: u64,
    pub position_poll_ms: u64,
    pub min_speed: f64,
    pub max_speed: f64,
    pub speed_step: f64,
    pub rewind_secs: f64,
    pub preserve_pitch: bool,
    pub incremental: bool,
}

/// Audio output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
}

/// Where downloads are written
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub download_dir: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::API_ENDPOINT.to_string(),
            timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Default for PlaybackSection {
    fn default() -> Self {
        Self {
            buffer_threshold: defaults::BUFFER_THRESHOLD,
            sink_ready_timeout_ms: defaults::SINK_READY_TIMEOUT_MS,
            sink_poll_interval_ms: defaults::SINK_POLL_INTERVAL_MS,
            position_poll_ms: defaults::POSITION_POLL_MS,
            min_speed: defaults::MIN_SPEED,
            max_speed: defaults::MAX_SPEED,
            speed_step: defaults::SPEED_STEP,
            rewind_secs: defaults::REWIND_SECS,
            preserve_pitch: true,
            incremental: true,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TtsError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                TtsError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(TtsError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - WHISPER_TTS_ENDPOINT → api.endpoint
    /// - WHISPER_TTS_DEVICE → audio.device
    /// - WHISPER_TTS_DOWNLOAD_DIR → output.download_dir
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(endpoint) = std::env::var("WHISPER_TTS_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.api.endpoint = endpoint;
        }

        if let Ok(device) = std::env::var("WHISPER_TTS_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(dir) = std::env::var("WHISPER_TTS_DOWNLOAD_DIR")
            && !dir.is_empty()
        {
            self.output.download_dir = Some(PathBuf::from(dir));
        }

        self
    }

    /// Reject values the player cannot work with.
    pub fn validate(&self) -> Result<()> {
        let p = &self.playback;
        let invalid = |key: &str, message: String| TtsError::ConfigInvalidValue {
            key: key.to_string(),
            message,
        };

        if p.buffer_threshold == 0 {
            return Err(invalid(
                "playback.buffer_threshold",
                "must be at least 1".to_string(),
            ));
        }
        for (key, value) in [("playback.min_speed", p.min_speed), ("playback.max_speed", p.max_speed)]
        {
            if !(SPEED_FLOOR..=SPEED_CEILING).contains(&value) {
                return Err(invalid(
                    key,
                    format!("{value} is outside {SPEED_FLOOR}..={SPEED_CEILING}"),
                ));
            }
        }
        if p.min_speed > p.max_speed {
            return Err(invalid(
                "playback.min_speed",
                format!("{} is above max_speed {}", p.min_speed, p.max_speed),
            ));
        }
        if !(p.speed_step > 0.0 && p.speed_step.is_finite()) {
            return Err(invalid("playback.speed_step", "must be positive".to_string()));
        }
        if !(p.rewind_secs > 0.0 && p.rewind_secs.is_finite()) {
            return Err(invalid("playback.rewind_secs", "must be positive".to_string()));
        }
        if self.api.endpoint.trim().is_empty() {
            return Err(invalid("api.endpoint", "must not be empty".to_string()));
        }
        Ok(())
    }

    /// Controller settings derived from the `[playback]` section.
    pub fn to_playback_config(&self, initial_speed: f64) -> PlaybackConfig {
        let p = &self.playback;
        PlaybackConfig {
            buffer_threshold: p.buffer_threshold,
            sink_ready_timeout: Duration::from_millis(p.sink_ready_timeout_ms),
            position_poll: Duration::from_millis(p.position_poll_ms),
            min_speed: p.min_speed,
            max_speed: p.max_speed,
            speed_step: p.speed_step,
            rewind_secs: p.rewind_secs,
            preserve_pitch: p.preserve_pitch,
            incremental: p.incremental,
            initial_speed,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    /// Directory for saved audio.
    pub fn download_dir(&self) -> PathBuf {
        self.output
            .download_dir
            .clone()
            .unwrap_or_else(crate::download::default_download_dir)
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/whisper-tts/config.toml on Linux
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("whisper-tts").join("config.toml"))
            .ok_or_else(|| TtsError::ConfigParse {
                message: "could not determine config directory".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_whisper_env() {
        remove_env("WHISPER_TTS_ENDPOINT");
        remove_env("WHISPER_TTS_DEVICE");
        remove_env("WHISPER_TTS_DOWNLOAD_DIR");
    }

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.api.endpoint, "https://api.openai.com/v1/audio/speech");
        assert_eq!(config.playback.buffer_threshold, 4);
        assert_eq!(config.playback.sink_ready_timeout_ms, 2000);
        assert_eq!(config.playback.min_speed, 0.2);
        assert_eq!(config.playback.max_speed, 3.0);
        assert_eq!(config.playback.rewind_secs, 5.0);
        assert!(config.playback.preserve_pitch);
        assert!(config.playback.incremental);
        assert_eq!(config.audio.device, None);
        assert_eq!(config.output.download_dir, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let temp_file = write_temp(
            r#"
            [api]
            endpoint = "http://localhost:8080/v1/audio/speech"
            timeout_secs = 30

            [playback]
            buffer_threshold = 2
            preserve_pitch = false
            incremental = false

            [audio]
            device = "pipewire"

            [output]
            download_dir = "/tmp/speech"
        "#,
        );

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.api.endpoint, "http://localhost:8080/v1/audio/speech");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.playback.buffer_threshold, 2);
        assert!(!config.playback.preserve_pitch);
        assert!(!config.playback.incremental);
        assert_eq!(config.audio.device.as_deref(), Some("pipewire"));
        assert_eq!(config.download_dir(), PathBuf::from("/tmp/speech"));
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let temp_file = write_temp(
            r#"
            [playback]
            max_speed = 2.0
        "#,
        );

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.playback.max_speed, 2.0);
        assert_eq!(config.playback.min_speed, 0.2);
        assert_eq!(config.api, ApiConfig::default());
        assert_eq!(config.audio, AudioConfig::default());
    }

    #[test]
    fn test_playback_config_mapping() {
        let config = Config::default();
        let playback = config.to_playback_config(1.5);
        assert_eq!(playback.initial_speed, 1.5);
        assert_eq!(playback.sink_ready_timeout, Duration::from_millis(2000));
        assert_eq!(playback.position_poll, Duration::from_millis(100));
        assert_eq!(playback.buffer_threshold, 4);
    }

    #[test]
    fn test_validate_rejects_inverted_speed_range() {
        let mut config = Config::default();
        config.playback.min_speed = 2.5;
        config.playback.max_speed = 1.0;
        assert!(matches!(
            config.validate(),
            Err(TtsError::ConfigInvalidValue { key, .. }) if key == "playback.min_speed"
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_speed() {
        let mut config = Config::default();
        config.playback.max_speed = 8.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let mut config = Config::default();
        config.playback.buffer_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_override_device() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_whisper_env();

        set_env("WHISPER_TTS_DEVICE", "hw:1,0");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.audio.device, Some("hw:1,0".to_string()));
        assert_eq!(config.api, ApiConfig::default());

        clear_whisper_env();
    }

    #[test]
    fn test_env_override_all() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_whisper_env();

        set_env("WHISPER_TTS_ENDPOINT", "http://proxy/v1/audio/speech");
        set_env("WHISPER_TTS_DEVICE", "pulse");
        set_env("WHISPER_TTS_DOWNLOAD_DIR", "/srv/audio");

        let config = Config::default().with_env_overrides();

        assert_eq!(config.api.endpoint, "http://proxy/v1/audio/speech");
        assert_eq!(config.audio.device, Some("pulse".to_string()));
        assert_eq!(config.output.download_dir, Some(PathBuf::from("/srv/audio")));

        clear_whisper_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_whisper_env();

        set_env("WHISPER_TTS_ENDPOINT", "");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.api.endpoint, defaults::API_ENDPOINT);

        clear_whisper_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let temp_file = write_temp(
            r#"
            [api
            endpoint = "broken
        "#,
        );

        assert!(matches!(
            Config::load(temp_file.path()),
            Err(TtsError::Config(_))
        ));
    }

    #[test]
    fn test_default_path_is_xdg_compliant() {
        let path = Config::default_path().unwrap();
        let path_str = path.to_string_lossy();

        assert!(path_str.contains("whisper-tts"));
        assert!(path_str.ends_with("config.toml"));
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_errors_on_invalid_toml() {
        let temp_file = write_temp("[playback\nmin_speed = ");
        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut config = Config::default();
        config.audio.device = Some("pipewire".to_string());
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
