//! Playback: the controller state machine and the seams it drives.

pub mod controller;
pub mod decoder;
pub mod renderer;
pub mod tempo;
pub mod ticker;
pub mod timeline;
pub mod types;

pub use controller::PlaybackController;
pub use decoder::{BlobDecoder, DecodedAudio, MockBlobDecoder};
pub use renderer::{MockRenderer, RenderCall, RenderEvent, RenderEventKind, Renderer};
pub use tempo::{RateShift, TempoStrategy, Wsola, strategy_for};
pub use ticker::PositionTicker;
pub use timeline::PcmTimeline;
pub use types::{
    ControllerEvent, PlaybackConfig, PlaybackState, PlaybackStatus, SessionId, SourceMode,
};
