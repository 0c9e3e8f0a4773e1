//! Voices and models offered by the speech endpoint.

use crate::defaults;
use tracing::info;

/// A speech model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub description: &'static str,
    /// Accepts free-form `instructions` and the extra voices.
    pub supports_instructions: bool,
}

/// A voice and the models that offer it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    pub id: &'static str,
    /// Only available with the instruction-capable model.
    pub instruction_model_only: bool,
}

pub const MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "tts-1",
        description: "Optimized for real-time use",
        supports_instructions: false,
    },
    ModelInfo {
        id: "tts-1-hd",
        description: "Higher audio quality",
        supports_instructions: false,
    },
    ModelInfo {
        id: "gpt-4o-mini-tts",
        description: "Voice customization through instructions",
        supports_instructions: true,
    },
];

pub const VOICES: &[VoiceInfo] = &[
    VoiceInfo { id: "alloy", instruction_model_only: false },
    VoiceInfo { id: "ash", instruction_model_only: false },
    VoiceInfo { id: "ballad", instruction_model_only: true },
    VoiceInfo { id: "coral", instruction_model_only: false },
    VoiceInfo { id: "echo", instruction_model_only: false },
    VoiceInfo { id: "fable", instruction_model_only: false },
    VoiceInfo { id: "onyx", instruction_model_only: false },
    VoiceInfo { id: "nova", instruction_model_only: false },
    VoiceInfo { id: "sage", instruction_model_only: false },
    VoiceInfo { id: "shimmer", instruction_model_only: false },
    VoiceInfo { id: "verse", instruction_model_only: true },
];

pub fn find_model(id: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|m| m.id == id)
}

pub fn find_voice(id: &str) -> Option<&'static VoiceInfo> {
    VOICES.iter().find(|v| v.id == id)
}

/// Whether `model` is the instruction-capable variant.
pub fn supports_instructions(model: &str) -> bool {
    model == defaults::INSTRUCTION_MODEL
}

/// Voices usable with `model`, in catalog order.
pub fn voices_for(model: &str) -> Vec<&'static str> {
    let gpt = supports_instructions(model);
    VOICES
        .iter()
        .filter(|v| gpt || !v.instruction_model_only)
        .map(|v| v.id)
        .collect()
}

/// The voice to actually request for `model`.
///
/// A voice only the instruction-capable model offers falls back to the
/// default voice with other models. Unknown voices pass through so the
/// endpoint can report them.
pub fn resolve_voice<'a>(voice: &'a str, model: &str) -> &'a str {
    let gpt_only = find_voice(voice).is_some_and(|v| v.instruction_model_only);
    if gpt_only && !supports_instructions(model) {
        info!(voice, model, "voice unavailable for model, using {}", defaults::DEFAULT_VOICE);
        return defaults::DEFAULT_VOICE;
    }
    voice
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpt_model_offers_all_voices() {
        assert_eq!(voices_for("gpt-4o-mini-tts").len(), VOICES.len());
    }

    #[test]
    fn test_standard_models_hide_gpt_voices() {
        let voices = voices_for("tts-1");
        assert!(!voices.contains(&"ballad"));
        assert!(!voices.contains(&"verse"));
        assert!(voices.contains(&"alloy"));
        assert_eq!(voices.len(), VOICES.len() - 2);
    }

    #[test]
    fn test_resolve_voice_falls_back_to_alloy() {
        assert_eq!(resolve_voice("verse", "tts-1-hd"), "alloy");
        assert_eq!(resolve_voice("verse", "gpt-4o-mini-tts"), "verse");
        assert_eq!(resolve_voice("nova", "tts-1"), "nova");
    }

    #[test]
    fn test_unknown_voice_passes_through() {
        assert_eq!(resolve_voice("robot", "tts-1"), "robot");
    }

    #[test]
    fn test_find_model() {
        assert!(find_model("tts-1").is_some());
        assert!(find_model("gpt-4o-mini-tts").is_some_and(|m| m.supports_instructions));
        assert!(find_model("tts-2").is_none());
    }
}
