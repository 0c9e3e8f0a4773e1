//! Bridges the [`ChunkStore`] to an [`IncrementalSink`].
//!
//! Two independent triggers drive appends: a chunk arriving in the store and
//! the sink reporting that its outstanding append completed. Both land in
//! [`IncrementalMediaFeeder::try_append`], which a busy flag keeps from ever
//! having two appends outstanding.
//!
//! Closing and teardown respect the sink's handshake: finalize waits for the
//! outstanding append, and a reset during the open handshake is deferred until
//! the handshake completes or fails.

use super::chunk_store::{ChunkStore, Consumer};
use super::sink::{IncrementalSink, SinkEvent, SinkId};
use crate::playback::timeline::PcmTimeline;
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifecycle of the sink as seen by the feeder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeederPhase {
    /// Handshake in flight.
    Opening,
    /// Accepting appends.
    Open,
    /// End of stream signaled; decoded audio remains playable.
    Ended,
    /// Open or append failed.
    Failed,
    /// Sink released.
    TornDown,
}

/// What the owner should do after the feeder handled an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeederSignal {
    /// Nothing changed for the owner.
    Idle,
    /// The handshake completed and appends started flowing.
    Ready,
    /// The sink became unusable; switch to whole-blob playback.
    Failed(String),
    /// A deferred teardown ran; the feeder can be dropped.
    TornDown,
}

/// Incremental appends for one session's sink.
pub struct IncrementalMediaFeeder {
    sink: Box<dyn IncrementalSink>,
    phase: FeederPhase,
    busy: bool,
    pushed: usize,
    finalize_pending: bool,
    teardown_pending: bool,
}

impl IncrementalMediaFeeder {
    pub fn new(sink: Box<dyn IncrementalSink>) -> Self {
        Self {
            sink,
            phase: FeederPhase::Opening,
            busy: false,
            pushed: 0,
            finalize_pending: false,
            teardown_pending: false,
        }
    }

    /// Start the sink handshake.
    ///
    /// Returns `Failed` when the sink refuses to open at all.
    pub fn open(&mut self) -> FeederSignal {
        match self.sink.begin_open() {
            Ok(()) => {
                debug!(sink = self.id(), "sink handshake started");
                FeederSignal::Idle
            }
            Err(e) => {
                self.phase = FeederPhase::Failed;
                FeederSignal::Failed(e.to_string())
            }
        }
    }

    pub fn id(&self) -> SinkId {
        self.sink.id()
    }

    pub fn phase(&self) -> FeederPhase {
        self.phase
    }

    /// Whether an append is outstanding.
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Number of chunks handed to the sink.
    pub fn pushed(&self) -> usize {
        self.pushed
    }

    /// Handshake done and at least one chunk handed over.
    pub fn is_playable(&self) -> bool {
        matches!(self.phase, FeederPhase::Open | FeederPhase::Ended) && self.pushed > 0
    }

    pub fn timeline(&self) -> Arc<PcmTimeline> {
        self.sink.timeline()
    }

    /// New chunk stored.
    pub fn on_chunk_added(&mut self, store: &mut ChunkStore) -> FeederSignal {
        self.try_append(store)
    }

    /// Push the oldest not-yet-pushed chunk if the sink is idle.
    ///
    /// With nothing left to push and the store finalized, closes the stream.
    pub fn try_append(&mut self, store: &mut ChunkStore) -> FeederSignal {
        if self.phase != FeederPhase::Open || self.busy {
            return FeederSignal::Idle;
        }

        let Some(chunk) = store.next_unconsumed(Consumer::Sink) else {
            if self.finalize_pending {
                return self.close();
            }
            return FeederSignal::Idle;
        };

        let bytes = Arc::clone(&chunk.bytes);
        let sequence = chunk.sequence;
        match self.sink.append(&bytes) {
            Ok(()) => {
                self.busy = true;
                self.pushed += 1;
                store.mark_consumed(Consumer::Sink);
                debug!(sink = self.id(), sequence, bytes = bytes.len(), "appended chunk");
                FeederSignal::Idle
            }
            Err(e) => {
                warn!(sink = self.id(), sequence, "append failed: {}", e);
                self.phase = FeederPhase::Failed;
                FeederSignal::Failed(e.to_string())
            }
        }
    }

    /// No more chunks will arrive.
    ///
    /// Closing waits for the outstanding append and for every stored chunk to
    /// be pushed. Before the handshake completes this only records the intent.
    pub fn finalize(&mut self, store: &mut ChunkStore) -> FeederSignal {
        self.finalize_pending = true;
        self.try_append(store)
    }

    fn close(&mut self) -> FeederSignal {
        match self.sink.end_of_stream() {
            Ok(()) => {
                debug!(sink = self.id(), pushed = self.pushed, "end of stream signaled");
                self.phase = FeederPhase::Ended;
                FeederSignal::Idle
            }
            Err(e) => {
                warn!(sink = self.id(), "end of stream failed: {}", e);
                self.phase = FeederPhase::Failed;
                FeederSignal::Failed(e.to_string())
            }
        }
    }

    /// Release the sink.
    ///
    /// Returns `false` when the handshake is still in flight; the teardown
    /// then runs as soon as the handshake settles.
    pub fn reset(&mut self) -> bool {
        match self.phase {
            FeederPhase::Opening => {
                debug!(sink = self.id(), "teardown deferred until handshake settles");
                self.teardown_pending = true;
                false
            }
            FeederPhase::TornDown => true,
            _ => {
                self.teardown();
                true
            }
        }
    }

    fn teardown(&mut self) {
        self.sink.teardown();
        self.phase = FeederPhase::TornDown;
        self.busy = false;
    }

    /// React to an event from this feeder's sink.
    pub fn handle_event(&mut self, event: &SinkEvent, store: &mut ChunkStore) -> FeederSignal {
        if event.sink() != self.id() || self.phase == FeederPhase::TornDown {
            return FeederSignal::Idle;
        }

        match event {
            SinkEvent::Opened { .. } => {
                if self.teardown_pending {
                    self.teardown();
                    return FeederSignal::TornDown;
                }
                if self.phase != FeederPhase::Opening {
                    return FeederSignal::Idle;
                }
                debug!(sink = self.id(), "sink handshake completed");
                self.phase = FeederPhase::Open;
                match self.try_append(store) {
                    FeederSignal::Idle => FeederSignal::Ready,
                    other => other,
                }
            }
            SinkEvent::OpenFailed { reason, .. } => {
                self.phase = FeederPhase::Failed;
                if self.teardown_pending {
                    self.teardown();
                    return FeederSignal::TornDown;
                }
                FeederSignal::Failed(reason.clone())
            }
            SinkEvent::UpdateEnd { .. } => {
                self.busy = false;
                self.try_append(store)
            }
            SinkEvent::Error { message, .. } => {
                self.phase = FeederPhase::Failed;
                self.busy = false;
                FeederSignal::Failed(message.clone())
            }
        }
    }

    /// React to an event after the owning session has gone.
    ///
    /// Only the deferred teardown matters; returns `true` once the feeder can
    /// be dropped.
    pub fn handle_retired_event(&mut self, event: &SinkEvent) -> bool {
        if event.sink() != self.id() {
            return false;
        }
        match event {
            SinkEvent::Opened { .. } | SinkEvent::OpenFailed { .. } => {
                if self.phase != FeederPhase::TornDown {
                    self.teardown();
                }
                true
            }
            _ => self.phase == FeederPhase::TornDown,
        }
    }
}

impl std::fmt::Debug for IncrementalMediaFeeder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalMediaFeeder")
            .field("sink", &self.id())
            .field("phase", &self.phase)
            .field("busy", &self.busy)
            .field("pushed", &self.pushed)
            .field("finalize_pending", &self.finalize_pending)
            .field("teardown_pending", &self.teardown_pending)
            .finish()
    }
}
