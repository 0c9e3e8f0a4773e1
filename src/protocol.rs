//! JSON messages between the trigger surface and the speech service.
//!
//! Audio bytes travel as base64 strings.

use crate::settings::Settings;
use crate::tts::StreamEvent;
use serde::{Deserialize, Serialize};

/// Requests accepted by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Speak `text`; `settings` overrides the stored settings.
    StartSession {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        settings: Option<Settings>,
    },
    /// Cancel the stream and playback.
    Stop,
    /// One-shot request that validates key and voice, discarding the audio.
    TestVoice {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        settings: Option<Settings>,
    },
}

impl Command {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Messages emitted by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    AudioChunk {
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
        is_last: bool,
    },
    TtsError {
        message: String,
    },
    PlaybackStopped,
}

impl Event {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl From<StreamEvent> for Event {
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::Chunk { bytes, is_last } => Event::AudioChunk { bytes, is_last },
            StreamEvent::Error(message) => Event::TtsError { message },
        }
    }
}

/// Reply to [`Command::TestVoice`]: `{"success":true}` or `{"error":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestVoiceOutcome {
    Success { success: bool },
    Failed { error: String },
}

impl TestVoiceOutcome {
    pub fn success() -> Self {
        TestVoiceOutcome::Success { success: true }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        TestVoiceOutcome::Failed {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestVoiceOutcome::Success { success: true })
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
