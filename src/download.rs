//! Saving a finalized stream as an MP3 file.

use crate::defaults;
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// The complete compressed stream of one session, ready to save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDownload {
    pub filename: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl AudioDownload {
    pub fn new(bytes: Vec<u8>, at: DateTime<Utc>) -> Self {
        Self {
            filename: filename_at(at),
            mime: defaults::AUDIO_MIME,
            bytes,
        }
    }

    /// Write into `dir`, creating it if needed. Returns the written path.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.filename);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

/// `whisper-tts-<ISO 8601 timestamp with ':' and 'T' replaced by '-'>.mp3`
pub fn filename_at(at: DateTime<Utc>) -> String {
    let stamp = at
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
        .replace([':', 'T'], "-");
    format!("{}-{}.{}", defaults::DOWNLOAD_PREFIX, stamp, defaults::RESPONSE_FORMAT)
}

/// Directory downloads go to when none is configured.
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}
