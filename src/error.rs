//! Error types for whisper-tts.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TtsError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Credential errors
    #[error("Please configure your OpenAI API key (whisper-tts settings set-key <KEY>)")]
    MissingApiKey,

    #[error("Invalid API key: {message}")]
    InvalidApiKey { message: String },

    #[error("Settings error: {message}")]
    Settings { message: String },

    // Transport errors
    #[error("{message}")]
    Transport { status: u16, message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    // Playback errors
    #[error("Error playing audio: {message}")]
    Decode { message: String },

    #[error("Incremental playback unavailable: {reason}")]
    SinkUnavailable { reason: String },

    #[error("Audio stream already finalized")]
    StreamFinalized,

    #[error("Audio output device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio output failed: {message}")]
    AudioOutput { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl TtsError {
    /// Whether a notice for this error must stay visible until the user dismisses it.
    ///
    /// Credential and configuration problems need user action; a soft sink
    /// failure is never shown at all.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, TtsError::SinkUnavailable { .. })
    }

    /// Message suitable for the status area.
    pub fn user_message(&self) -> String {
        match self {
            TtsError::Transport { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, TtsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_file_not_found_display() {
        let error = TtsError::ConfigFileNotFound {
            path: "/path/to/config.toml".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Configuration file not found at /path/to/config.toml"
        );
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = TtsError::ConfigInvalidValue {
            key: "playback.min_speed".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for playback.min_speed: must be positive"
        );
    }

    #[test]
    fn test_missing_api_key_mentions_set_key() {
        let error = TtsError::MissingApiKey;
        assert!(error.to_string().contains("set-key"));
    }

    #[test]
    fn test_transport_display_is_provider_message() {
        let error = TtsError::Transport {
            status: 401,
            message: "Invalid API key".to_string(),
        };
        assert_eq!(error.to_string(), "Invalid API key");
        assert_eq!(error.user_message(), "Invalid API key");
    }

    #[test]
    fn test_decode_display() {
        let error = TtsError::Decode {
            message: "no audio frames".to_string(),
        };
        assert_eq!(error.to_string(), "Error playing audio: no audio frames");
    }

    #[test]
    fn test_sink_unavailable_is_not_actionable() {
        let soft = TtsError::SinkUnavailable {
            reason: "unsupported".to_string(),
        };
        assert!(!soft.is_actionable());
        assert!(TtsError::MissingApiKey.is_actionable());
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: TtsError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: TtsError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_source_chain_io() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: TtsError = io_error.into();
        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<TtsError>();
        assert_sync::<TtsError>();
    }
}
