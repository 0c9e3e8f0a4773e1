//! Speech service: turns trigger commands into streamed sessions.
//!
//! Credentials and settings are resolved before any network call. Each
//! session gets a fresh id; events from a stream that has since been
//! replaced or stopped carry an old id and can be ignored by the receiver.

use crate::error::{Result, TtsError};
use crate::protocol::{Command, TestVoiceOutcome};
use crate::settings::{Settings, SettingsGateway, resolve_api_key};
use crate::text::segment;
use crate::tts::{SpeechRequest, SpeechTransport, StreamEvent, StreamHandle, StreamOrchestrator};
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

/// Identifies one streamed session.
pub type StreamId = u64;

/// Message returned by `test_voice` when no key is stored.
pub const NO_API_KEY_MESSAGE: &str = "No API key configured";

pub struct TtsService {
    transport: Arc<dyn SpeechTransport>,
    orchestrator: StreamOrchestrator,
    settings: Arc<dyn SettingsGateway>,
    events: UnboundedSender<(StreamId, StreamEvent)>,
    current: Option<(StreamId, StreamHandle)>,
    next_id: StreamId,
}

impl TtsService {
    pub fn new(
        transport: Arc<dyn SpeechTransport>,
        settings: Arc<dyn SettingsGateway>,
        events: UnboundedSender<(StreamId, StreamEvent)>,
    ) -> Self {
        Self {
            orchestrator: StreamOrchestrator::new(Arc::clone(&transport)),
            transport,
            settings,
            events,
            current: None,
            next_id: 0,
        }
    }

    pub fn settings(&self) -> &Arc<dyn SettingsGateway> {
        &self.settings
    }

    /// Id of the stream currently allowed to deliver events.
    pub fn current_stream(&self) -> Option<StreamId> {
        self.current.as_ref().map(|(id, _)| *id)
    }

    /// Start streaming `text`, replacing any running stream.
    ///
    /// Whitespace-only text is a no-op and returns `Ok(None)`. A missing API
    /// key fails before anything is sent.
    pub fn start_session(
        &mut self,
        text: &str,
        settings: Option<Settings>,
    ) -> Result<Option<StreamId>> {
        let segments = segment(text);
        if segments.is_empty() {
            debug!("empty selection, nothing to speak");
            return Ok(None);
        }
        let api_key = resolve_api_key(self.settings.as_ref())?.ok_or(TtsError::MissingApiKey)?;
        let settings = match settings {
            Some(settings) => settings,
            None => self.settings.get_settings()?,
        };

        self.stop();
        self.next_id += 1;
        let id = self.next_id;
        info!(
            stream = id,
            segments = segments.len(),
            voice = %settings.voice,
            model = %settings.model,
            "starting speech stream"
        );
        let handle = self
            .orchestrator
            .spawn(segments, settings, api_key, id, self.events.clone());
        self.current = Some((id, handle));
        Ok(Some(id))
    }

    /// Cancel the running stream, if any. Idempotent.
    pub fn stop(&mut self) {
        if let Some((id, handle)) = self.current.take() {
            debug!(stream = id, "stopping speech stream");
            handle.stop();
        }
    }

    /// Forget a stream that ended on its own.
    pub fn finish(&mut self, id: StreamId) {
        if self.current_stream() == Some(id) {
            self.current = None;
        }
    }

    /// Validate key, model and voice with one request; the audio is discarded.
    pub async fn test_voice(&self, text: &str, settings: Option<Settings>) -> TestVoiceOutcome {
        let api_key = match resolve_api_key(self.settings.as_ref()) {
            Ok(Some(key)) => key,
            Ok(None) => return TestVoiceOutcome::failed(NO_API_KEY_MESSAGE),
            Err(e) => return TestVoiceOutcome::failed(e.user_message()),
        };
        let settings = match settings.map(Ok).unwrap_or_else(|| self.settings.get_settings()) {
            Ok(settings) => settings,
            Err(e) => return TestVoiceOutcome::failed(e.user_message()),
        };

        let text = text.trim();
        let text = if text.is_empty() {
            crate::defaults::PREVIEW_TEXT
        } else {
            text
        };
        let request = SpeechRequest::new(text, &settings);
        let mut body = match self.transport.open_stream(&request, &api_key).await {
            Ok(body) => body,
            Err(e) => return TestVoiceOutcome::failed(e.user_message()),
        };

        let mut bytes = 0usize;
        while let Some(fragment) = body.next().await {
            match fragment {
                Ok(fragment) => bytes += fragment.len(),
                Err(e) => return TestVoiceOutcome::failed(e.user_message()),
            }
        }
        info!(bytes, voice = %request.voice, "voice test succeeded");
        TestVoiceOutcome::success()
    }

    /// Dispatch a protocol command. Only `TestVoice` has a reply.
    pub async fn handle(&mut self, command: Command) -> Result<Option<TestVoiceOutcome>> {
        match command {
            Command::StartSession { text, settings } => {
                self.start_session(&text, settings)?;
                Ok(None)
            }
            Command::Stop => {
                self.stop();
                Ok(None)
            }
            Command::TestVoice { text, settings } => {
                Ok(Some(self.test_voice(&text, settings).await))
            }
        }
    }
}

impl Drop for TtsService {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettingsStore;
    use crate::tts::MockTransport;
    use tokio::sync::mpsc;

    const KEY: &str = "sk-test-0123456789abcdef";

    fn service(
        transport: MockTransport,
        store: MemorySettingsStore,
    ) -> (TtsService, mpsc::UnboundedReceiver<(StreamId, StreamEvent)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TtsService::new(Arc::new(transport), Arc::new(store), tx), rx)
    }

    #[tokio::test]
    async fn test_whitespace_text_is_noop() {
        let transport = MockTransport::new();
        let (mut svc, _rx) = service(transport.clone(), MemorySettingsStore::new());
        assert_eq!(svc.start_session("  \n ", None).unwrap(), None);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let transport = MockTransport::new();
        let (mut svc, _rx) = service(transport.clone(), MemorySettingsStore::new());
        // Only meaningful when the environment does not provide a key.
        if std::env::var(crate::defaults::API_KEY_ENV).is_err() {
            assert!(matches!(
                svc.start_session("Hello", None),
                Err(TtsError::MissingApiKey)
            ));
            assert_eq!(transport.request_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_session_streams_tagged_chunks() {
        let transport = MockTransport::new().with_chunks(vec![vec![1], vec![2]]);
        let (mut svc, mut rx) = service(transport, MemorySettingsStore::new().with_api_key(KEY));
        let id = svc.start_session("Hello there.", None).unwrap().unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.0, id);
        assert_eq!(
            second,
            (
                id,
                StreamEvent::Chunk {
                    bytes: vec![2],
                    is_last: true
                }
            )
        );
    }

    #[tokio::test]
    async fn test_new_session_gets_new_id_and_stop_clears() {
        let (mut svc, _rx) =
            service(MockTransport::new(), MemorySettingsStore::new().with_api_key(KEY));
        let a = svc.start_session("one", None).unwrap().unwrap();
        let b = svc.start_session("two", None).unwrap().unwrap();
        assert_ne!(a, b);
        assert_eq!(svc.current_stream(), Some(b));
        svc.stop();
        svc.stop();
        assert_eq!(svc.current_stream(), None);
    }

    #[tokio::test]
    async fn test_settings_override_reaches_request() {
        let transport = MockTransport::new();
        let (mut svc, mut rx) =
            service(transport.clone(), MemorySettingsStore::new().with_api_key(KEY));
        let settings = Settings {
            voice: "nova".to_string(),
            ..Settings::default()
        };
        svc.start_session("Hi", Some(settings)).unwrap();
        rx.recv().await.unwrap();
        let (request, key) = transport.requests().remove(0);
        assert_eq!(request.voice, "nova");
        assert_eq!(key, KEY);
    }

    #[tokio::test]
    async fn test_voice_reports_provider_error() {
        let transport =
            MockTransport::new().with_status(401, r#"{"error":{"message":"Invalid API key"}}"#);
        let (svc, _rx) = service(transport, MemorySettingsStore::new().with_api_key(KEY));
        assert_eq!(
            svc.test_voice("Hi", None).await,
            TestVoiceOutcome::failed("Invalid API key")
        );
    }

    #[tokio::test]
    async fn test_voice_success_uses_preview_text() {
        let transport = MockTransport::new().with_chunks(vec![vec![0; 16]]);
        let (svc, _rx) = service(transport.clone(), MemorySettingsStore::new().with_api_key(KEY));
        assert!(svc.test_voice("", None).await.is_success());
        assert!(transport.requests()[0].0.input.starts_with("Welcome to Whisper to Me"));
    }

    #[tokio::test]
    async fn test_handle_dispatches_commands() {
        let (mut svc, _rx) =
            service(MockTransport::new(), MemorySettingsStore::new().with_api_key(KEY));
        let reply = svc
            .handle(Command::StartSession {
                text: "Hello".to_string(),
                settings: None,
            })
            .await
            .unwrap();
        assert!(reply.is_none());
        assert!(svc.current_stream().is_some());
        svc.handle(Command::Stop).await.unwrap();
        assert!(svc.current_stream().is_none());
    }
}
