//! Sequential speech requests over the segments of one session.
//!
//! One request is in flight at a time. Fragments from all segments form a
//! single logical stream; the last fragment of the last segment is the only
//! one flagged `is_last`. Every other fragment is forwarded before the next
//! request opens. The first failure ends the session with exactly one error
//! event.

use crate::error::TtsError;
use crate::settings::Settings;
use crate::text::Segment;
use crate::tts::client::SpeechTransport;
use crate::tts::request::SpeechRequest;
use futures_util::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Output of a running stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Chunk { bytes: Vec<u8>, is_last: bool },
    Error(String),
}

/// How a stream run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed { chunks: usize },
    Failed,
    Cancelled,
}

/// Shared stop flag checked at every fragment boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Issues one request per segment and forwards the audio.
#[derive(Clone)]
pub struct StreamOrchestrator {
    transport: Arc<dyn SpeechTransport>,
}

impl StreamOrchestrator {
    pub fn new(transport: Arc<dyn SpeechTransport>) -> Self {
        Self { transport }
    }

    /// Stream every segment in order, calling `emit` for each event.
    ///
    /// Nothing is emitted once `cancel` is set, not even an error.
    pub async fn run<F>(
        &self,
        segments: &[Segment],
        settings: &Settings,
        api_key: &str,
        cancel: &CancelToken,
        mut emit: F,
    ) -> StreamOutcome
    where
        F: FnMut(StreamEvent) + Send,
    {
        if segments.is_empty() {
            return StreamOutcome::Completed { chunks: 0 };
        }

        // Held back one fragment so the final one can carry `is_last`.
        let mut pending: Option<Vec<u8>> = None;
        let mut emitted = 0usize;

        for segment in segments {
            if cancel.is_cancelled() {
                return StreamOutcome::Cancelled;
            }
            // A finished segment's tail goes out before the next request opens.
            if let Some(bytes) = pending.take() {
                emit(StreamEvent::Chunk {
                    bytes,
                    is_last: false,
                });
                emitted += 1;
            }
            debug!(
                index = segment.index,
                total = segment.total,
                chars = segment.char_len(),
                "requesting segment"
            );

            let request = SpeechRequest::new(segment.text.as_str(), settings);
            let mut body = match self.transport.open_stream(&request, api_key).await {
                Ok(body) => body,
                Err(e) => {
                    return self.fail(e, segment, pending.take(), cancel, &mut emit);
                }
            };

            while let Some(fragment) = body.next().await {
                if cancel.is_cancelled() {
                    info!("stream cancelled");
                    return StreamOutcome::Cancelled;
                }
                match fragment {
                    Ok(bytes) if bytes.is_empty() => {}
                    Ok(bytes) => {
                        if let Some(previous) = pending.replace(bytes) {
                            emit(StreamEvent::Chunk {
                                bytes: previous,
                                is_last: false,
                            });
                            emitted += 1;
                        }
                    }
                    Err(e) => {
                        return self.fail(e, segment, pending.take(), cancel, &mut emit);
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            return StreamOutcome::Cancelled;
        }
        emit(StreamEvent::Chunk {
            bytes: pending.unwrap_or_default(),
            is_last: true,
        });
        emitted += 1;
        info!(chunks = emitted, segments = segments.len(), "stream complete");
        StreamOutcome::Completed { chunks: emitted }
    }

    fn fail<F>(
        &self,
        error: TtsError,
        segment: &Segment,
        pending: Option<Vec<u8>>,
        cancel: &CancelToken,
        emit: &mut F,
    ) -> StreamOutcome
    where
        F: FnMut(StreamEvent),
    {
        if cancel.is_cancelled() {
            return StreamOutcome::Cancelled;
        }
        warn!(index = segment.index, error = %error, "segment request failed");
        if let Some(bytes) = pending {
            emit(StreamEvent::Chunk {
                bytes,
                is_last: false,
            });
        }
        emit(StreamEvent::Error(error.user_message()));
        StreamOutcome::Failed
    }

    /// Run on the tokio runtime, sending events tagged with `tag` to `events`.
    ///
    /// A closed receiver cancels the stream.
    pub fn spawn<T>(
        &self,
        segments: Vec<Segment>,
        settings: Settings,
        api_key: String,
        tag: T,
        events: mpsc::UnboundedSender<(T, StreamEvent)>,
    ) -> StreamHandle
    where
        T: Clone + Send + 'static,
    {
        let cancel = CancelToken::new();
        let task_cancel = cancel.clone();
        let orchestrator = self.clone();
        let task = tokio::spawn(async move {
            let emit_cancel = task_cancel.clone();
            orchestrator
                .run(&segments, &settings, &api_key, &task_cancel, move |event| {
                    if events.send((tag.clone(), event)).is_err() {
                        emit_cancel.cancel();
                    }
                })
                .await
        });
        StreamHandle { cancel, task }
    }
}

/// Handle to a spawned stream.
pub struct StreamHandle {
    cancel: CancelToken,
    task: JoinHandle<StreamOutcome>,
}

impl StreamHandle {
    /// Cancel the stream. The in-flight read is dropped and no further
    /// events are sent. Safe to call repeatedly.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the stream to end. An aborted task counts as cancelled.
    pub async fn join(self) -> StreamOutcome {
        self.task.await.unwrap_or(StreamOutcome::Cancelled)
    }
}
