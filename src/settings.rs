//! User settings and the stored API key.
//!
//! Settings live in `settings.toml` next to `config.toml`. The file holds
//! what the user changes at runtime (voice, model, speed, instructions, key)
//! while `config.toml` holds installation-level tuning.

use crate::catalog;
use crate::defaults;
use crate::error::{Result, TtsError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Minimum accepted API key length.
const MIN_API_KEY_LEN: usize = 20;

/// Required API key prefix.
const API_KEY_PREFIX: &str = "sk-";

/// Voice, model and speed used for a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub voice: String,
    pub model: String,
    pub playback_speed: f64,
    pub instructions: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            voice: defaults::DEFAULT_VOICE.to_string(),
            model: defaults::DEFAULT_MODEL.to_string(),
            playback_speed: defaults::PLAYBACK_SPEED,
            instructions: String::new(),
        }
    }
}

impl Settings {
    /// Merge `patch` into these settings.
    ///
    /// Switching to a model that does not offer the current voice moves the
    /// voice back to the default.
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(voice) = &patch.voice {
            self.voice = voice.clone();
        }
        if let Some(model) = &patch.model {
            self.model = model.clone();
        }
        if let Some(speed) = patch.playback_speed
            && speed.is_finite()
        {
            self.playback_speed = speed;
        }
        if let Some(instructions) = &patch.instructions {
            self.instructions = instructions.clone();
        }

        let resolved = catalog::resolve_voice(&self.voice, &self.model);
        if resolved != self.voice {
            self.voice = resolved.to_string();
        }
    }

    /// Instructions to send, if the model accepts them and any are set.
    pub fn effective_instructions(&self) -> Option<&str> {
        let trimmed = self.instructions.trim();
        (catalog::supports_instructions(&self.model) && !trimmed.is_empty()).then_some(trimmed)
    }
}

/// Partial update for [`Settings`]; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub voice: Option<String>,
    pub model: Option<String>,
    pub playback_speed: Option<f64>,
    pub instructions: Option<String>,
}

impl SettingsPatch {
    pub fn speed(speed: f64) -> Self {
        Self {
            playback_speed: Some(speed),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.voice.is_none()
            && self.model.is_none()
            && self.playback_speed.is_none()
            && self.instructions.is_none()
    }
}

/// Persistent store for settings and the API key.
pub trait SettingsGateway: Send + Sync {
    fn get_settings(&self) -> Result<Settings>;

    /// Merge `patch` into the stored settings and return the result.
    fn save_settings(&self, patch: &SettingsPatch) -> Result<Settings>;

    fn get_api_key(&self) -> Result<Option<String>>;

    fn save_api_key(&self, key: &str) -> Result<()>;

    fn has_api_key(&self) -> Result<bool> {
        Ok(self.get_api_key()?.is_some())
    }

    /// Remove everything, including the API key.
    fn clear_all(&self) -> Result<()>;

    /// Restore voice, model and instructions to their defaults. The API key
    /// and playback speed are kept.
    fn reset_to_defaults(&self) -> Result<Settings> {
        let defaults = Settings::default();
        self.save_settings(&SettingsPatch {
            voice: Some(defaults.voice),
            model: Some(defaults.model),
            playback_speed: None,
            instructions: Some(defaults.instructions),
        })
    }
}

/// Check the shape of an API key before storing it.
pub fn validate_api_key_format(key: &str) -> Result<()> {
    let key = key.trim();
    if key.is_empty() {
        return Err(TtsError::InvalidApiKey {
            message: "key is empty".to_string(),
        });
    }
    if !key.starts_with(API_KEY_PREFIX) {
        return Err(TtsError::InvalidApiKey {
            message: format!("OpenAI keys start with '{API_KEY_PREFIX}'"),
        });
    }
    if key.chars().count() < MIN_API_KEY_LEN {
        return Err(TtsError::InvalidApiKey {
            message: format!("key is shorter than {MIN_API_KEY_LEN} characters"),
        });
    }
    Ok(())
}

/// Stored key, else the `OPENAI_API_KEY` environment variable.
pub fn resolve_api_key(gateway: &dyn SettingsGateway) -> Result<Option<String>> {
    let env = std::env::var(defaults::API_KEY_ENV).ok();
    Ok(pick_api_key(gateway.get_api_key()?, env))
}

fn pick_api_key(stored: Option<String>, env: Option<String>) -> Option<String> {
    stored
        .or(env)
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

/// Base64 of the key, character-reversed. Keeps the key out of casual view;
/// it is not encryption.
pub fn obfuscate_key(key: &str) -> String {
    STANDARD.encode(key.as_bytes()).chars().rev().collect()
}

/// Inverse of [`obfuscate_key`]; `None` when the stored value is garbage.
pub fn deobfuscate_key(stored: &str) -> Option<String> {
    let reversed: String = stored.chars().rev().collect();
    let bytes = STANDARD.decode(reversed).ok()?;
    String::from_utf8(bytes).ok().filter(|k| !k.is_empty())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoredSettings {
    #[serde(flatten)]
    settings: Settings,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
}

/// Settings persisted to a TOML file.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.config/whisper-tts/settings.toml` on Linux.
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("whisper-tts").join("settings.toml"))
            .ok_or_else(|| TtsError::Settings {
                message: "could not determine config directory".to_string(),
            })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StoredSettings> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => toml::from_str(&contents).map_err(|e| TtsError::Settings {
                message: format!("{}: {}", self.path.display(), e),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoredSettings::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, stored: &StoredSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(stored).map_err(|e| TtsError::Settings {
            message: e.to_string(),
        })?;
        fs::write(&self.path, contents)?;
        debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

impl SettingsGateway for FileSettingsStore {
    fn get_settings(&self) -> Result<Settings> {
        Ok(self.read()?.settings)
    }

    fn save_settings(&self, patch: &SettingsPatch) -> Result<Settings> {
        let mut stored = self.read()?;
        stored.settings.apply(patch);
        self.write(&stored)?;
        Ok(stored.settings)
    }

    fn get_api_key(&self) -> Result<Option<String>> {
        Ok(self.read()?.api_key.as_deref().and_then(deobfuscate_key))
    }

    fn save_api_key(&self, key: &str) -> Result<()> {
        let mut stored = self.read()?;
        stored.api_key = Some(obfuscate_key(key.trim()));
        self.write(&stored)?;
        info!("API key saved");
        Ok(())
    }

    fn clear_all(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory settings for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    inner: Mutex<StoredSettings>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(self, settings: Settings) -> Self {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).settings = settings;
        self
    }

    pub fn with_api_key(self, key: &str) -> Self {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).api_key = Some(obfuscate_key(key));
        self
    }
}

impl SettingsGateway for MemorySettingsStore {
    fn get_settings(&self) -> Result<Settings> {
        Ok(self.inner.lock().unwrap_or_else(|e| e.into_inner()).settings.clone())
    }

    fn save_settings(&self, patch: &SettingsPatch) -> Result<Settings> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.settings.apply(patch);
        Ok(inner.settings.clone())
    }

    fn get_api_key(&self) -> Result<Option<String>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.api_key.as_deref().and_then(deobfuscate_key))
    }

    fn save_api_key(&self, key: &str) -> Result<()> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).api_key =
            Some(obfuscate_key(key.trim()));
        Ok(())
    }

    fn clear_all(&self) -> Result<()> {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = StoredSettings::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "sk-test-0123456789abcdef";

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.voice, "alloy");
        assert_eq!(settings.model, "tts-1");
        assert_eq!(settings.playback_speed, 1.0);
        assert_eq!(settings.instructions, "");
    }

    #[test]
    fn test_patch_merges_only_given_fields() {
        let mut settings = Settings::default();
        settings.apply(&SettingsPatch {
            voice: Some("nova".to_string()),
            ..SettingsPatch::default()
        });
        assert_eq!(settings.voice, "nova");
        assert_eq!(settings.model, "tts-1");
        assert_eq!(settings.playback_speed, 1.0);
    }

    #[test]
    fn test_non_finite_speed_ignored() {
        let mut settings = Settings::default();
        settings.apply(&SettingsPatch::speed(f64::NAN));
        assert_eq!(settings.playback_speed, 1.0);
    }

    #[test]
    fn test_switching_model_resets_gpt_only_voice() {
        let mut settings = Settings {
            voice: "ballad".to_string(),
            model: "gpt-4o-mini-tts".to_string(),
            ..Settings::default()
        };
        settings.apply(&SettingsPatch {
            model: Some("tts-1-hd".to_string()),
            ..SettingsPatch::default()
        });
        assert_eq!(settings.voice, "alloy");
    }

    #[test]
    fn test_instructions_only_for_instruction_model() {
        let mut settings = Settings {
            instructions: "Speak calmly".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.effective_instructions(), None);

        settings.model = "gpt-4o-mini-tts".to_string();
        assert_eq!(settings.effective_instructions(), Some("Speak calmly"));

        settings.instructions = "   ".to_string();
        assert_eq!(settings.effective_instructions(), None);
    }

    #[test]
    fn test_obfuscation_round_trip_and_not_plaintext() {
        let stored = obfuscate_key(KEY);
        assert!(!stored.contains("sk-"));
        assert_eq!(deobfuscate_key(&stored).as_deref(), Some(KEY));
    }

    #[test]
    fn test_garbage_stored_key_is_absent() {
        assert_eq!(deobfuscate_key("%%%not base64%%%"), None);
        assert_eq!(deobfuscate_key(""), None);
    }

    #[test]
    fn test_validate_api_key_format() {
        assert!(validate_api_key_format(KEY).is_ok());
        assert!(validate_api_key_format("").is_err());
        assert!(validate_api_key_format("pk-0123456789abcdefghij").is_err());
        assert!(validate_api_key_format("sk-short").is_err());
    }

    #[test]
    fn test_stored_key_wins_over_env() {
        let picked = pick_api_key(Some(KEY.to_string()), Some("sk-from-env".to_string()));
        assert_eq!(picked.as_deref(), Some(KEY));
        let picked = pick_api_key(None, Some(" sk-from-env ".to_string()));
        assert_eq!(picked.as_deref(), Some("sk-from-env"));
        assert_eq!(pick_api_key(None, Some(String::new())), None);
    }

    #[test]
    fn test_file_store_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSettingsStore::new(dir.path().join("settings.toml"));
        assert_eq!(store.get_settings().unwrap(), Settings::default());
        assert!(!store.has_api_key().unwrap());
    }

    #[test]
    fn test_file_store_persists_settings_and_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        let store = FileSettingsStore::new(&path);

        store.save_settings(&SettingsPatch::speed(1.5)).unwrap();
        store.save_api_key(KEY).unwrap();

        let reopened = FileSettingsStore::new(&path);
        assert_eq!(reopened.get_settings().unwrap().playback_speed, 1.5);
        assert_eq!(reopened.get_api_key().unwrap().as_deref(), Some(KEY));

        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains(KEY));
    }

    #[test]
    fn test_reset_keeps_key_and_speed() {
        let store = MemorySettingsStore::new().with_api_key(KEY);
        store
            .save_settings(&SettingsPatch {
                voice: Some("verse".to_string()),
                model: Some("gpt-4o-mini-tts".to_string()),
                playback_speed: Some(2.0),
                instructions: Some("Whisper".to_string()),
            })
            .unwrap();

        let reset = store.reset_to_defaults().unwrap();
        assert_eq!(reset.voice, "alloy");
        assert_eq!(reset.model, "tts-1");
        assert_eq!(reset.instructions, "");
        assert_eq!(reset.playback_speed, 2.0);
        assert!(store.has_api_key().unwrap());
    }

    #[test]
    fn test_clear_all_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSettingsStore::new(dir.path().join("settings.toml"));
        store.save_api_key(KEY).unwrap();
        store.clear_all().unwrap();
        assert!(!store.path().exists());
        assert!(!store.has_api_key().unwrap());
        store.clear_all().unwrap();
    }

    #[test]
    fn test_invalid_settings_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "voice = [").unwrap();
        let store = FileSettingsStore::new(&path);
        assert!(matches!(
            store.get_settings(),
            Err(TtsError::Settings { .. })
        ));
    }
}
