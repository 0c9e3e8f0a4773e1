//! Transport for speech requests.

use crate::error::{Result, TtsError};
use crate::tts::request::{SpeechRequest, transport_error};
use async_trait::async_trait;
use futures_util::stream::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// Response body delivered fragment by fragment, in network order.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Opens a streamed speech response.
///
/// Non-success statuses are returned as `TtsError::Transport` carrying the
/// provider's message; an `Ok` stream is always a 2xx audio body.
#[async_trait]
pub trait SpeechTransport: Send + Sync {
    async fn open_stream(&self, request: &SpeechRequest, api_key: &str) -> Result<ByteStream>;
}

#[cfg(feature = "http")]
pub use http::OpenAiTransport;

#[cfg(feature = "http")]
mod http {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;
    use tracing::debug;

    /// `reqwest` transport for the OpenAI speech endpoint.
    #[derive(Debug, Clone)]
    pub struct OpenAiTransport {
        client: reqwest::Client,
        endpoint: String,
    }

    impl OpenAiTransport {
        /// `timeout` bounds connecting and each wait for response data.
        pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
            // No total deadline: long segments stream for as long as data flows.
            let client = reqwest::Client::builder()
                .connect_timeout(timeout)
                .read_timeout(timeout)
                .build()
                .map_err(|e| TtsError::Network {
                    message: format!("Failed to build HTTP client: {e}"),
                })?;
            Ok(Self {
                client,
                endpoint: endpoint.into(),
            })
        }

        pub fn endpoint(&self) -> &str {
            &self.endpoint
        }
    }

    #[async_trait]
    impl SpeechTransport for OpenAiTransport {
        async fn open_stream(&self, request: &SpeechRequest, api_key: &str) -> Result<ByteStream> {
            debug!(
                model = %request.model,
                voice = %request.voice,
                chars = request.input.chars().count(),
                "requesting speech"
            );
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(api_key)
                .json(request)
                .send()
                .await
                .map_err(|e| TtsError::Network {
                    message: e.to_string(),
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                debug!(status = status.as_u16(), "speech request failed");
                return Err(transport_error(status.as_u16(), &body));
            }

            let stream = response.bytes_stream().map(|chunk| {
                chunk.map(|bytes| bytes.to_vec()).map_err(|e| TtsError::Network {
                    message: format!("Failed to read audio stream: {e}"),
                })
            });
            Ok(Box::pin(stream))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::settings::Settings;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        /// Serve one 200 response whose body trickles out a byte every `gap`.
        async fn trickle_server(body: &'static [u8], gap: Duration) -> String {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = [0u8; 4096];
                let _read = socket.read(&mut request).await.unwrap();
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: audio/mpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                socket.write_all(head.as_bytes()).await.unwrap();
                for byte in body {
                    tokio::time::sleep(gap).await;
                    if socket.write_all(&[*byte]).await.is_err() || socket.flush().await.is_err() {
                        break;
                    }
                }
            });
            format!("http://{}/v1/audio/speech", addr)
        }

        #[tokio::test]
        async fn test_slow_body_outlasting_timeout_is_not_cut() {
            let endpoint = trickle_server(&[1, 2, 3, 4, 5, 6], Duration::from_millis(100)).await;
            let transport = OpenAiTransport::new(endpoint, Duration::from_millis(400)).unwrap();
            let request = SpeechRequest::new("hello", &Settings::default());

            let mut body = transport.open_stream(&request, "sk-test").await.unwrap();
            let mut received = Vec::new();
            while let Some(fragment) = body.next().await {
                received.extend(fragment.unwrap());
            }
            assert_eq!(received, vec![1, 2, 3, 4, 5, 6]);
        }

        #[tokio::test]
        async fn test_stalled_body_times_out() {
            let endpoint = trickle_server(&[1], Duration::from_millis(1500)).await;
            let transport = OpenAiTransport::new(endpoint, Duration::from_millis(200)).unwrap();
            let request = SpeechRequest::new("hello", &Settings::default());

            let mut body = transport.open_stream(&request, "sk-test").await.unwrap();
            let first = body.next().await.unwrap();
            assert!(matches!(first, Err(TtsError::Network { .. })));
        }
    }
}

/// Scripted reply of [`MockTransport`].
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// 2xx body delivered as these fragments.
    Chunks(Vec<Vec<u8>>),
    /// Non-success status with this body.
    Status { status: u16, body: String },
    /// Connection failure before any response.
    Network(String),
    /// 2xx body that breaks after these fragments.
    Interrupted { chunks: Vec<Vec<u8>>, message: String },
}

/// Transport replaying scripted responses, one per request.
///
/// Requests beyond the script get an empty 2xx body.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    requests: Arc<Mutex<Vec<(SpeechRequest, String)>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, response: MockResponse) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
        self
    }

    pub fn with_chunks(self, chunks: Vec<Vec<u8>>) -> Self {
        self.with_response(MockResponse::Chunks(chunks))
    }

    pub fn with_status(self, status: u16, body: &str) -> Self {
        self.with_response(MockResponse::Status {
            status,
            body: body.to_string(),
        })
    }

    /// Requests received so far with the API key used.
    pub fn requests(&self) -> Vec<(SpeechRequest, String)> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl SpeechTransport for MockTransport {
    async fn open_stream(&self, request: &SpeechRequest, api_key: &str) -> Result<ByteStream> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((request.clone(), api_key.to_string()));

        let response = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(MockResponse::Chunks(Vec::new()));

        let items: Vec<Result<Vec<u8>>> = match response {
            MockResponse::Chunks(chunks) => chunks.into_iter().map(Ok).collect(),
            MockResponse::Status { status, body } => return Err(transport_error(status, &body)),
            MockResponse::Network(message) => return Err(TtsError::Network { message }),
            MockResponse::Interrupted { chunks, message } => chunks
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(TtsError::Network { message })))
                .collect(),
        };
        Ok(Box::pin(futures_util::stream::iter(items)))
    }
}
