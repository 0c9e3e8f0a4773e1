//! Whole-blob decoding used when no incremental sink is available.

use crate::error::{Result, TtsError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Mono PCM produced by a decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate.max(1) as f64
    }
}

/// Decodes a complete or partial compressed stream from its first byte.
///
/// Decoding a longer prefix of the same stream must reproduce the samples
/// of the shorter one; the controller relies on this to extend a timeline.
pub trait BlobDecoder: Send {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio>;
}

/// Decoder producing a fixed number of silent samples per input byte.
#[derive(Debug, Clone)]
pub struct MockBlobDecoder {
    sample_rate: u32,
    samples_per_byte: usize,
    min_bytes: usize,
    always_fail: bool,
    calls: Arc<AtomicUsize>,
}

impl MockBlobDecoder {
    pub fn new(sample_rate: u32, samples_per_byte: usize) -> Self {
        Self {
            sample_rate,
            samples_per_byte,
            min_bytes: 0,
            always_fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail while the blob is shorter than `bytes`.
    pub fn with_min_bytes(mut self, bytes: usize) -> Self {
        self.min_bytes = bytes;
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.always_fail = true;
        self
    }

    /// Number of decode calls across all clones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Default for MockBlobDecoder {
    fn default() -> Self {
        Self::new(1000, 1000)
    }
}

impl BlobDecoder for MockBlobDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.always_fail || bytes.len() < self.min_bytes {
            return Err(TtsError::Decode {
                message: "mock decode failure".to_string(),
            });
        }
        Ok(DecodedAudio {
            samples: vec![0.0; bytes.len() * self.samples_per_byte],
            sample_rate: self.sample_rate,
        })
    }
}
