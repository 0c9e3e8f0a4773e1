//! Incremental decode sink abstraction.
//!
//! A sink accepts compressed fragments one at a time and exposes the decoded
//! audio as a growing [`PcmTimeline`] before the whole stream has arrived.
//! Everything a sink does asynchronously is reported back as a [`SinkEvent`]
//! tagged with the sink's id, so events from a sink that has since been
//! replaced can be recognized and routed to its retired feeder.

use crate::error::{Result, TtsError};
use crate::playback::timeline::PcmTimeline;
use std::sync::{Arc, Mutex};

/// Identifies one sink instance across its asynchronous events.
pub type SinkId = u64;

/// Asynchronous notifications from a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// Open handshake completed; the sink accepts appends.
    Opened { sink: SinkId },
    /// Open handshake failed.
    OpenFailed { sink: SinkId, reason: String },
    /// The outstanding append has been consumed; ready for the next one.
    UpdateEnd { sink: SinkId },
    /// The sink hit an unrecoverable error after opening.
    Error { sink: SinkId, message: String },
}

impl SinkEvent {
    pub fn sink(&self) -> SinkId {
        match self {
            SinkEvent::Opened { sink }
            | SinkEvent::OpenFailed { sink, .. }
            | SinkEvent::UpdateEnd { sink }
            | SinkEvent::Error { sink, .. } => *sink,
        }
    }
}

/// Platform primitive that decodes a compressed stream progressively.
///
/// At most one append may be outstanding: after [`append`](Self::append)
/// returns, the caller must wait for [`SinkEvent::UpdateEnd`] before
/// appending again.
pub trait IncrementalSink: Send {
    fn id(&self) -> SinkId;

    /// Start the open handshake. Completion arrives as [`SinkEvent::Opened`].
    fn begin_open(&mut self) -> Result<()>;

    /// Hand one fragment to the decoder.
    fn append(&mut self, bytes: &[u8]) -> Result<()>;

    /// Signal that no more fragments follow.
    fn end_of_stream(&mut self) -> Result<()>;

    /// Release the sink. Must not be called while the handshake is in flight.
    fn teardown(&mut self);

    /// Decoded output of this sink.
    fn timeline(&self) -> Arc<PcmTimeline>;
}

/// Result of probing for an incremental sink.
pub enum SinkCapability {
    Supported(Box<dyn IncrementalSink>),
    Unsupported { reason: String },
}

impl std::fmt::Debug for SinkCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkCapability::Supported(sink) => write!(f, "Supported(sink {})", sink.id()),
            SinkCapability::Unsupported { reason } => write!(f, "Unsupported({})", reason),
        }
    }
}

/// Decides once per session whether incremental decoding is available.
pub trait SinkProbe: Send {
    fn probe(&self, mime: &str, id: SinkId) -> SinkCapability;
}

/// Probe that never offers a sink, forcing whole-blob playback.
#[derive(Debug, Clone, Default)]
pub struct NoSinkProbe;

impl SinkProbe for NoSinkProbe {
    fn probe(&self, _mime: &str, _id: SinkId) -> SinkCapability {
        SinkCapability::Unsupported {
            reason: "incremental decoding disabled".to_string(),
        }
    }
}

/// Operation recorded by [`MockSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOp {
    Open,
    Append(usize),
    EndOfStream,
    Teardown,
}

#[derive(Debug, Default)]
struct MockSinkLog {
    ops: Vec<SinkOp>,
    in_flight: bool,
    overlapping_appends: usize,
}

/// Test-side view of a [`MockSink`] after it has been moved into a feeder.
#[derive(Debug, Clone)]
pub struct MockSinkHandle {
    id: SinkId,
    log: Arc<Mutex<MockSinkLog>>,
    timeline: Arc<PcmTimeline>,
}

impl MockSinkHandle {
    fn lock(&self) -> std::sync::MutexGuard<'_, MockSinkLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> SinkId {
        self.id
    }

    pub fn ops(&self) -> Vec<SinkOp> {
        self.lock().ops.clone()
    }

    /// Whether an append is waiting for its completion event.
    pub fn in_flight(&self) -> bool {
        self.lock().in_flight
    }

    /// Simulate the decoder consuming the outstanding append.
    pub fn finish_append(&self) {
        self.lock().in_flight = false;
    }

    /// Appends started while another was still outstanding.
    pub fn overlapping_appends(&self) -> usize {
        self.lock().overlapping_appends
    }

    pub fn append_count(&self) -> usize {
        self.lock()
            .ops
            .iter()
            .filter(|op| matches!(op, SinkOp::Append(_)))
            .count()
    }

    pub fn ended(&self) -> bool {
        self.lock().ops.contains(&SinkOp::EndOfStream)
    }

    pub fn torn_down(&self) -> bool {
        self.lock().ops.contains(&SinkOp::Teardown)
    }

    pub fn timeline(&self) -> Arc<PcmTimeline> {
        Arc::clone(&self.timeline)
    }
}

/// Sink that records its calls and synthesizes PCM for each append.
#[derive(Debug)]
pub struct MockSink {
    handle: MockSinkHandle,
    samples_per_append: usize,
    fail_open: bool,
    fail_append: bool,
}

impl MockSink {
    pub fn new(id: SinkId) -> Self {
        Self {
            handle: MockSinkHandle {
                id,
                log: Arc::new(Mutex::new(MockSinkLog::default())),
                timeline: Arc::new(PcmTimeline::new(1000)),
            },
            samples_per_append: 0,
            fail_open: false,
            fail_append: false,
        }
    }

    /// Push `samples` of silence into the timeline on every append.
    pub fn with_samples_per_append(mut self, samples: usize) -> Self {
        self.samples_per_append = samples;
        self
    }

    pub fn with_open_failure(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn with_append_failure(mut self) -> Self {
        self.fail_append = true;
        self
    }

    pub fn handle(&self) -> MockSinkHandle {
        self.handle.clone()
    }
}

impl IncrementalSink for MockSink {
    fn id(&self) -> SinkId {
        self.handle.id
    }

    fn begin_open(&mut self) -> Result<()> {
        self.handle.lock().ops.push(SinkOp::Open);
        if self.fail_open {
            return Err(TtsError::SinkUnavailable {
                reason: "mock open failure".to_string(),
            });
        }
        Ok(())
    }

    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if self.fail_append {
            return Err(TtsError::SinkUnavailable {
                reason: "mock append failure".to_string(),
            });
        }
        let mut log = self.handle.lock();
        if log.in_flight {
            log.overlapping_appends += 1;
        }
        log.in_flight = true;
        log.ops.push(SinkOp::Append(bytes.len()));
        drop(log);

        if self.samples_per_append > 0 {
            self.handle
                .timeline
                .push(&vec![0.0; self.samples_per_append]);
        }
        Ok(())
    }

    fn end_of_stream(&mut self) -> Result<()> {
        self.handle.lock().ops.push(SinkOp::EndOfStream);
        self.handle.timeline.finish();
        Ok(())
    }

    fn teardown(&mut self) {
        self.handle.lock().ops.push(SinkOp::Teardown);
    }

    fn timeline(&self) -> Arc<PcmTimeline> {
        self.handle.timeline()
    }
}

#[derive(Debug, Default)]
struct MockProbeState {
    sinks: Vec<MockSinkHandle>,
    mimes: Vec<String>,
}

/// Probe handing out [`MockSink`]s; clones share the record of created sinks.
#[derive(Debug, Clone, Default)]
pub struct MockSinkProbe {
    unsupported: Option<String>,
    samples_per_append: usize,
    fail_open: bool,
    state: Arc<Mutex<MockProbeState>>,
}

impl MockSinkProbe {
    /// Probe that offers a working sink.
    pub fn supported() -> Self {
        Self::default()
    }

    /// Probe that reports the codec as unsupported.
    pub fn unsupported(reason: &str) -> Self {
        Self {
            unsupported: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn with_samples_per_append(mut self, samples: usize) -> Self {
        self.samples_per_append = samples;
        self
    }

    pub fn with_open_failure(mut self) -> Self {
        self.fail_open = true;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockProbeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Handles of every sink created so far, oldest first.
    pub fn sinks(&self) -> Vec<MockSinkHandle> {
        self.lock().sinks.clone()
    }

    pub fn last_sink(&self) -> Option<MockSinkHandle> {
        self.lock().sinks.last().cloned()
    }

    /// MIME types passed to `probe`.
    pub fn probed_mimes(&self) -> Vec<String> {
        self.lock().mimes.clone()
    }
}

impl SinkProbe for MockSinkProbe {
    fn probe(&self, mime: &str, id: SinkId) -> SinkCapability {
        self.lock().mimes.push(mime.to_string());
        if let Some(reason) = &self.unsupported {
            return SinkCapability::Unsupported {
                reason: reason.clone(),
            };
        }
        let mut sink = MockSink::new(id).with_samples_per_append(self.samples_per_append);
        if self.fail_open {
            sink = sink.with_open_failure();
        }
        self.lock().sinks.push(sink.handle());
        SinkCapability::Supported(Box::new(sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_sink_detects_overlapping_appends() {
        let mut sink = MockSink::new(1);
        let handle = sink.handle();
        sink.append(&[1]).unwrap();
        sink.append(&[2]).unwrap();
        assert_eq!(handle.overlapping_appends(), 1);

        handle.finish_append();
        sink.append(&[3]).unwrap();
        assert_eq!(handle.overlapping_appends(), 1);
        assert_eq!(handle.append_count(), 3);
    }

    #[test]
    fn test_mock_sink_synthesizes_samples() {
        let mut sink = MockSink::new(1).with_samples_per_append(250);
        sink.append(&[0; 8]).unwrap();
        sink.append(&[0; 8]).unwrap();
        assert_eq!(sink.timeline().len(), 500);
    }

    #[test]
    fn test_end_of_stream_finishes_timeline() {
        let mut sink = MockSink::new(1);
        sink.end_of_stream().unwrap();
        assert!(sink.timeline().is_complete());
        assert!(sink.handle().ended());
    }

    #[test]
    fn test_probe_unsupported() {
        let probe = MockSinkProbe::unsupported("no MSE");
        match probe.probe("audio/mpeg", 1) {
            SinkCapability::Unsupported { reason } => assert_eq!(reason, "no MSE"),
            other => panic!("expected unsupported, got {:?}", other),
        }
        assert!(probe.sinks().is_empty());
        assert_eq!(probe.probed_mimes(), vec!["audio/mpeg".to_string()]);
    }

    #[test]
    fn test_probe_supported_records_sinks() {
        let probe = MockSinkProbe::supported();
        let shared = probe.clone();
        let cap = probe.probe("audio/mpeg", 7);
        assert!(matches!(cap, SinkCapability::Supported(ref s) if s.id() == 7));
        assert_eq!(shared.last_sink().map(|h| h.id()), Some(7));
    }

    #[test]
    fn test_no_sink_probe_is_unsupported() {
        assert!(matches!(
            NoSinkProbe.probe("audio/mpeg", 1),
            SinkCapability::Unsupported { .. }
        ));
    }

    #[test]
    fn test_event_sink_id() {
        let event = SinkEvent::OpenFailed {
            sink: 4,
            reason: "x".to_string(),
        };
        assert_eq!(event.sink(), 4);
        assert_eq!(SinkEvent::UpdateEnd { sink: 9 }.sink(), 9);
    }
}
