//! Real audio: MP3 decoding, the incremental decode sink and device output.

pub mod mp3;
pub mod output;
pub mod stream_sink;

pub use mp3::{Mp3Decoder, decode_mp3};
pub use output::{CpalRenderer, list_devices, suppress_audio_warnings};
pub use stream_sink::{Mp3SinkProbe, Mp3StreamSink};
