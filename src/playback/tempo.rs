//! Tempo strategies used by the renderer to play a timeline faster or slower.
//!
//! [`RateShift`] steps through the source at `speed` samples per output
//! sample, so pitch follows speed. [`Wsola`] keeps pitch by overlap-adding
//! windowed frames picked near the ideal read position, each aligned to
//! continue the previous frame's waveform.
//!
//! Both work in the source's sample rate and advance a cursor measured in
//! source samples, which is also the logical play position.

use std::collections::VecDeque;
use std::f32::consts::PI;

/// Turns source samples into output samples at a given speed.
pub trait TempoStrategy: Send {
    /// Fill `out` starting at `*cursor`, advancing it by about `speed` source
    /// samples per output sample.
    ///
    /// Returns the number of samples written. Fewer than `out.len()` means
    /// the source ran dry: either more audio is expected (`complete` false)
    /// or the end was reached.
    fn process(
        &mut self,
        source: &[f32],
        complete: bool,
        cursor: &mut f64,
        speed: f64,
        out: &mut [f32],
    ) -> usize;

    /// Drop buffered state after a seek.
    fn reset(&mut self);

    fn preserves_pitch(&self) -> bool;
}

/// Pick the strategy for the configured pitch policy.
pub fn strategy_for(preserve_pitch: bool) -> Box<dyn TempoStrategy> {
    if preserve_pitch {
        Box::new(Wsola::default())
    } else {
        Box::new(RateShift)
    }
}

/// Linear-interpolation resampling; pitch drifts with speed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateShift;

impl TempoStrategy for RateShift {
    fn process(
        &mut self,
        source: &[f32],
        _complete: bool,
        cursor: &mut f64,
        speed: f64,
        out: &mut [f32],
    ) -> usize {
        let len = source.len();
        let mut written = 0;
        for slot in out.iter_mut() {
            let pos = cursor.max(0.0);
            let idx = pos as usize;
            if idx >= len {
                break;
            }
            let frac = (pos - idx as f64) as f32;
            let a = source[idx];
            let b = source.get(idx + 1).copied().unwrap_or(a);
            *slot = a + (b - a) * frac;
            *cursor = pos + speed;
            written += 1;
        }
        written
    }

    fn reset(&mut self) {}

    fn preserves_pitch(&self) -> bool {
        false
    }
}

/// Waveform-similarity overlap-add time stretcher.
#[derive(Debug, Clone)]
pub struct Wsola {
    frame_len: usize,
    hop: usize,
    tolerance: usize,
    window: Vec<f32>,
    pending: VecDeque<f32>,
    overlap: Vec<f32>,
    prev_start: Option<usize>,
    drained: bool,
}

impl Wsola {
    /// `frame_len` is rounded up to an even number of at least 4 samples.
    pub fn new(frame_len: usize, tolerance: usize) -> Self {
        let frame_len = (frame_len.max(4) + 1) & !1;
        let hop = frame_len / 2;
        let window = (0..frame_len)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / frame_len as f32).cos())
            .collect();
        Self {
            frame_len,
            hop,
            tolerance,
            window,
            pending: VecDeque::with_capacity(hop),
            overlap: vec![0.0; hop],
            prev_start: None,
            drained: false,
        }
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Produce one hop of output into `pending`. Returns `false` when no
    /// output can be produced yet (or ever, at the end of a complete source).
    fn synthesize_hop(&mut self, source: &[f32], complete: bool, cursor: &mut f64, speed: f64) -> bool {
        let len = source.len();
        let ideal = cursor.max(0.0) as usize;

        let max_start = if complete {
            len.saturating_sub(self.frame_len)
        } else {
            // Only commit to a frame once every candidate position is decoded.
            match len.checked_sub(self.frame_len + self.tolerance) {
                Some(limit) if ideal <= limit => limit,
                _ => return false,
            }
        };

        if ideal > max_start || len < self.frame_len {
            return complete && self.flush_tail(source, ideal, cursor);
        }

        let lo = ideal.saturating_sub(self.tolerance);
        let hi = (ideal + self.tolerance).min(max_start);
        let start = match self.prev_start {
            Some(prev) => self.best_alignment(source, prev + self.hop, lo, hi, ideal),
            None => ideal,
        };

        for i in 0..self.hop {
            self.pending
                .push_back(self.overlap[i] + source[start + i] * self.window[i]);
        }
        for i in 0..self.hop {
            self.overlap[i] = source[start + self.hop + i] * self.window[self.hop + i];
        }
        self.prev_start = Some(start);
        *cursor += self.hop as f64 * speed;
        true
    }

    /// Candidate start in `lo..=hi` whose first hop best continues `natural`.
    fn best_alignment(&self, source: &[f32], natural: usize, lo: usize, hi: usize, ideal: usize) -> usize {
        if natural + self.hop > source.len() {
            return ideal;
        }
        let target = &source[natural..natural + self.hop];
        let mut best = ideal;
        let mut best_score = f32::NEG_INFINITY;
        for start in lo..=hi {
            let candidate = &source[start..start + self.hop];
            let (dot, energy) = candidate
                .iter()
                .zip(target)
                .fold((0.0f32, 0.0f32), |(d, e), (&c, &t)| (d + c * t, e + c * c));
            let score = dot / (energy + 1e-9).sqrt();
            if score > best_score {
                best_score = score;
                best = start;
            }
        }
        best
    }

    /// Emit whatever is left after the last full frame, faded in under the
    /// pending overlap.
    fn flush_tail(&mut self, source: &[f32], ideal: usize, cursor: &mut f64) -> bool {
        if self.drained {
            return false;
        }
        self.drained = true;
        let rest = source.get(ideal..).unwrap_or(&[]);
        let n = rest.len().max(self.hop);
        for i in 0..n {
            let carried = self.overlap.get(i).copied().unwrap_or(0.0);
            let fresh = match rest.get(i) {
                Some(&s) if i < self.hop => s * self.window[i],
                Some(&s) => s,
                None => 0.0,
            };
            self.pending.push_back(carried + fresh);
        }
        self.overlap.iter_mut().for_each(|s| *s = 0.0);
        *cursor = source.len() as f64;
        true
    }
}

impl Default for Wsola {
    /// About 21 ms frames and 5 ms search at 24 kHz.
    fn default() -> Self {
        Self::new(512, 128)
    }
}

impl TempoStrategy for Wsola {
    fn process(
        &mut self,
        source: &[f32],
        complete: bool,
        cursor: &mut f64,
        speed: f64,
        out: &mut [f32],
    ) -> usize {
        let mut written = 0;
        while written < out.len() {
            if let Some(sample) = self.pending.pop_front() {
                out[written] = sample;
                written += 1;
                continue;
            }
            if !self.synthesize_hop(source, complete, cursor, speed) {
                break;
            }
        }
        written
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.overlap.iter_mut().for_each(|s| *s = 0.0);
        self.prev_start = None;
        self.drained = false;
    }

    fn preserves_pitch(&self) -> bool {
        true
    }
}
