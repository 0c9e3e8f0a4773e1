//! Speech synthesis: request building, transport and the per-session stream.

pub mod client;
pub mod orchestrator;
pub mod request;

#[cfg(feature = "http")]
pub use client::OpenAiTransport;
pub use client::{ByteStream, MockResponse, MockTransport, SpeechTransport};
pub use orchestrator::{CancelToken, StreamEvent, StreamHandle, StreamOrchestrator, StreamOutcome};
pub use request::{FALLBACK_ERROR_MESSAGE, SpeechRequest, parse_error_message, transport_error};
