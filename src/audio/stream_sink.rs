//! Incremental MP3 sink backed by a decode worker thread.
//!
//! Appended fragments travel over a channel to a worker that decodes them
//! with symphonia as they arrive and pushes the samples onto the sink's
//! timeline. The worker blocks while waiting for more bytes; closing the
//! channel (end of stream or teardown) lets it drain and exit.

use super::mp3::decode_source;
use crate::defaults;
use crate::error::{Result, TtsError};
use crate::playback::timeline::PcmTimeline;
use crate::stream::{IncrementalSink, SinkCapability, SinkEvent, SinkId, SinkProbe};
use crossbeam_channel::{Receiver, Sender};
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use symphonia::core::io::MediaSource;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Read side of the fragment channel, seen by symphonia as a byte stream.
struct ChannelSource {
    fragments: Receiver<Vec<u8>>,
    current: Vec<u8>,
    offset: usize,
    position: u64,
    cancelled: Arc<AtomicBool>,
}

impl Read for ChannelSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.offset >= self.current.len() {
            if self.cancelled.load(Ordering::SeqCst) {
                return Ok(0);
            }
            match self.fragments.recv() {
                Ok(fragment) => {
                    self.current = fragment;
                    self.offset = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let available = &self.current[self.offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for ChannelSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Current(0) => Ok(self.position),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "streamed audio is not seekable",
            )),
        }
    }
}

impl MediaSource for ChannelSource {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

/// Sink decoding MP3 fragments on a worker thread.
pub struct Mp3StreamSink {
    id: SinkId,
    events: UnboundedSender<SinkEvent>,
    timeline: Arc<PcmTimeline>,
    fragments: Option<Sender<Vec<u8>>>,
    cancelled: Arc<AtomicBool>,
    opened: bool,
}

impl Mp3StreamSink {
    pub fn new(id: SinkId, events: UnboundedSender<SinkEvent>) -> Self {
        Self {
            id,
            events,
            timeline: Arc::new(PcmTimeline::new(defaults::SOURCE_SAMPLE_RATE)),
            fragments: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            opened: false,
        }
    }

    fn notify(&self, event: SinkEvent) {
        if self.events.send(event).is_err() {
            debug!(sink = self.id, "sink event receiver closed");
        }
    }
}

impl IncrementalSink for Mp3StreamSink {
    fn id(&self) -> SinkId {
        self.id
    }

    fn begin_open(&mut self) -> Result<()> {
        if self.opened {
            return Ok(());
        }
        let (tx, rx) = crossbeam_channel::unbounded();
        let source = ChannelSource {
            fragments: rx,
            current: Vec::new(),
            offset: 0,
            position: 0,
            cancelled: Arc::clone(&self.cancelled),
        };

        let id = self.id;
        let events = self.events.clone();
        let timeline = Arc::clone(&self.timeline);
        let cancelled = Arc::clone(&self.cancelled);

        std::thread::Builder::new()
            .name(format!("mp3-sink-{id}"))
            .spawn(move || {
                if events.send(SinkEvent::Opened { sink: id }).is_err() {
                    return;
                }
                let result = decode_source(Box::new(source), |samples, rate| {
                    if cancelled.load(Ordering::SeqCst) {
                        return;
                    }
                    if timeline.is_empty() {
                        timeline.set_sample_rate(rate);
                    }
                    timeline.push(samples);
                });
                if cancelled.load(Ordering::SeqCst) {
                    debug!(sink = id, "decode worker stopped");
                    return;
                }
                match result {
                    Ok(samples) => {
                        timeline.finish();
                        debug!(sink = id, samples, "decode worker finished");
                    }
                    Err(e) => {
                        warn!(sink = id, "incremental decode failed: {}", e);
                        if events
                            .send(SinkEvent::Error {
                                sink: id,
                                message: e.to_string(),
                            })
                            .is_err()
                        {
                            debug!(sink = id, "sink event receiver closed");
                        }
                    }
                }
            })
            .map_err(|e| TtsError::SinkUnavailable {
                reason: format!("could not start decode worker: {e}"),
            })?;

        self.fragments = Some(tx);
        self.opened = true;
        Ok(())
    }

    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let Some(fragments) = &self.fragments else {
            return Err(TtsError::SinkUnavailable {
                reason: "sink is closed".to_string(),
            });
        };
        fragments
            .send(bytes.to_vec())
            .map_err(|_| TtsError::SinkUnavailable {
                reason: "decode worker exited".to_string(),
            })?;
        // The channel took ownership of the bytes; ready for the next append.
        self.notify(SinkEvent::UpdateEnd { sink: self.id });
        Ok(())
    }

    fn end_of_stream(&mut self) -> Result<()> {
        self.fragments = None;
        Ok(())
    }

    fn teardown(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.fragments = None;
    }

    fn timeline(&self) -> Arc<PcmTimeline> {
        Arc::clone(&self.timeline)
    }
}

impl Drop for Mp3StreamSink {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Offers [`Mp3StreamSink`] for MP3 streams.
#[derive(Debug, Clone)]
pub struct Mp3SinkProbe {
    events: UnboundedSender<SinkEvent>,
}

impl Mp3SinkProbe {
    pub fn new(events: UnboundedSender<SinkEvent>) -> Self {
        Self { events }
    }
}

impl SinkProbe for Mp3SinkProbe {
    fn probe(&self, mime: &str, id: SinkId) -> SinkCapability {
        if mime != defaults::AUDIO_MIME {
            return SinkCapability::Unsupported {
                reason: format!("no incremental decoder for {mime}"),
            };
        }
        SinkCapability::Supported(Box::new(Mp3StreamSink::new(id, self.events.clone())))
    }
}
