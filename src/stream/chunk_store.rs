//! Append-only store of received audio fragments for one playback session.

use crate::error::{Result, TtsError};
use std::sync::Arc;

/// One received fragment of compressed audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Position in arrival order, contiguous from 0.
    pub sequence: u64,
    /// Immutable fragment bytes.
    pub bytes: Arc<[u8]>,
}

impl AudioChunk {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Downstream processes that consume the store at their own pace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumer {
    /// Incremental sink appends.
    Sink,
    /// Whole-blob decoding in fallback mode.
    Blob,
}

/// Ordered chunk sequence plus per-consumer read cursors.
#[derive(Debug, Default)]
pub struct ChunkStore {
    chunks: Vec<AudioChunk>,
    total_bytes: usize,
    finalized: bool,
    sink_cursor: usize,
    blob_cursor: usize,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return its sequence index.
    ///
    /// Empty fragments carry no audio and are not stored (`Ok(None)`).
    /// Appending after [`finalize`](Self::finalize) is an error.
    pub fn append(&mut self, bytes: impl Into<Arc<[u8]>>) -> Result<Option<u64>> {
        if self.finalized {
            return Err(TtsError::StreamFinalized);
        }
        let bytes: Arc<[u8]> = bytes.into();
        if bytes.is_empty() {
            return Ok(None);
        }
        let sequence = self.chunks.len() as u64;
        self.total_bytes += bytes.len();
        self.chunks.push(AudioChunk { sequence, bytes });
        Ok(Some(sequence))
    }

    /// Mark that no more chunks will arrive.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn chunks(&self) -> &[AudioChunk] {
        &self.chunks
    }

    /// Number of chunks `consumer` has taken so far.
    pub fn consumed(&self, consumer: Consumer) -> usize {
        match consumer {
            Consumer::Sink => self.sink_cursor,
            Consumer::Blob => self.blob_cursor,
        }
    }

    /// Oldest chunk not yet taken by `consumer`.
    pub fn next_unconsumed(&self, consumer: Consumer) -> Option<&AudioChunk> {
        self.chunks.get(self.consumed(consumer))
    }

    /// Whether `consumer` has taken every chunk stored so far.
    pub fn is_drained(&self, consumer: Consumer) -> bool {
        self.consumed(consumer) >= self.chunks.len()
    }

    /// Advance `consumer` past one chunk.
    pub fn mark_consumed(&mut self, consumer: Consumer) {
        let len = self.chunks.len();
        let cursor = match consumer {
            Consumer::Sink => &mut self.sink_cursor,
            Consumer::Blob => &mut self.blob_cursor,
        };
        *cursor = (*cursor + 1).min(len);
    }

    /// Advance `consumer` past everything stored so far.
    pub fn mark_all_consumed(&mut self, consumer: Consumer) {
        let len = self.chunks.len();
        match consumer {
            Consumer::Sink => self.sink_cursor = len,
            Consumer::Blob => self.blob_cursor = len,
        }
    }

    /// All stored bytes concatenated in sequence order.
    pub fn concat(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(self.total_bytes);
        for chunk in &self.chunks {
            blob.extend_from_slice(&chunk.bytes);
        }
        blob
    }

    /// Drop every chunk and start over, accepting appends again.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
