//! Speech request bodies and provider error payloads.

use crate::catalog;
use crate::defaults;
use crate::error::TtsError;
use crate::settings::Settings;
use serde::{Deserialize, Serialize};

/// Message used when a failed response carries no readable error.
pub const FALLBACK_ERROR_MESSAGE: &str = "API request failed";

/// JSON body of `POST /v1/audio/speech`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SpeechRequest {
    pub model: String,
    pub input: String,
    pub voice: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub response_format: &'static str,
}

impl SpeechRequest {
    /// Build the request for one segment of text.
    ///
    /// The voice is resolved against the model, and `instructions` is only
    /// carried for the instruction-capable model.
    pub fn new(input: impl Into<String>, settings: &Settings) -> Self {
        Self {
            model: settings.model.clone(),
            input: input.into(),
            voice: catalog::resolve_voice(&settings.voice, &settings.model).to_string(),
            instructions: settings.effective_instructions().map(str::to_string),
            response_format: defaults::RESPONSE_FORMAT,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// Extract `error.message` from a provider error body.
pub fn parse_error_message(body: &str) -> Option<String> {
    let payload: ErrorPayload = serde_json::from_str(body).ok()?;
    payload
        .error?
        .message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
}

/// Turn a non-success response into a transport error.
pub fn transport_error(status: u16, body: &str) -> TtsError {
    TtsError::Transport {
        status,
        message: parse_error_message(body).unwrap_or_else(|| FALLBACK_ERROR_MESSAGE.to_string()),
    }
}
