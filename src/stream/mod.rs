//! Received audio storage and the incremental decode sink bridge.

pub mod chunk_store;
pub mod feeder;
pub mod sink;

pub use chunk_store::{AudioChunk, ChunkStore, Consumer};
pub use feeder::{FeederPhase, FeederSignal, IncrementalMediaFeeder};
pub use sink::{
    IncrementalSink, MockSink, MockSinkHandle, MockSinkProbe, NoSinkProbe, SinkCapability,
    SinkEvent, SinkId, SinkOp, SinkProbe,
};
