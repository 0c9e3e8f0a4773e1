//! Decoded audio shared between a producer (sink worker or blob decoder) and
//! the renderer.
//!
//! The timeline only grows while a session is streaming. Readers borrow the
//! samples through [`PcmTimeline::with_samples`] so the output callback never
//! copies the whole buffer.

use std::sync::Mutex;

#[derive(Debug)]
struct TimelineInner {
    samples: Vec<f32>,
    sample_rate: u32,
    complete: bool,
}

/// Growable mono PCM buffer in logical (speed 1.0) time.
#[derive(Debug)]
pub struct PcmTimeline {
    inner: Mutex<TimelineInner>,
}

impl PcmTimeline {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            inner: Mutex::new(TimelineInner {
                samples: Vec::new(),
                sample_rate: sample_rate.max(1),
                complete: false,
            }),
        }
    }

    /// Build a finished timeline from already decoded samples.
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            inner: Mutex::new(TimelineInner {
                samples,
                sample_rate: sample_rate.max(1),
                complete: true,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TimelineInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn sample_rate(&self) -> u32 {
        self.lock().sample_rate
    }

    /// Adopt the rate reported by the decoder. Ignored once samples exist.
    pub fn set_sample_rate(&self, sample_rate: u32) {
        let mut inner = self.lock();
        if inner.samples.is_empty() && sample_rate > 0 {
            inner.sample_rate = sample_rate;
        }
    }

    /// Append freshly decoded samples.
    pub fn push(&self, samples: &[f32]) {
        let mut inner = self.lock();
        if !inner.complete {
            inner.samples.extend_from_slice(samples);
        }
    }

    /// Append only the part of `decoded` beyond the current length.
    ///
    /// `decoded` is a re-decode of the same stream from its start, so its
    /// prefix matches what is already stored. Returns the number of samples added.
    pub fn extend_to(&self, decoded: &[f32]) -> usize {
        let mut inner = self.lock();
        if inner.complete || decoded.len() <= inner.samples.len() {
            return 0;
        }
        let start = inner.samples.len();
        inner.samples.extend_from_slice(&decoded[start..]);
        decoded.len() - start
    }

    /// Mark that no more samples will be appended.
    pub fn finish(&self) {
        self.lock().complete = true;
    }

    pub fn is_complete(&self) -> bool {
        self.lock().complete
    }

    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().samples.is_empty()
    }

    /// Seconds of audio decoded so far.
    pub fn duration_secs(&self) -> f64 {
        let inner = self.lock();
        inner.samples.len() as f64 / inner.sample_rate as f64
    }

    /// Borrow the samples and completion flag under the lock.
    pub fn with_samples<R>(&self, f: impl FnOnce(&[f32], bool) -> R) -> R {
        let inner = self.lock();
        f(&inner.samples, inner.complete)
    }
}
