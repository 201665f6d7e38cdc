use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt as _;
use tracing::debug;

use crate::config::ClientConfig;
use crate::errors::{ClientError, SourceError};
use crate::orchestrator::{GenerationRun, StreamOrchestrator};
use crate::request::EpisodeRequest;
use crate::source::ChunkSource;
use crate::state::GenerationState;

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static>>;

/// Client for the streaming episode generation endpoint.
#[derive(Clone)]
pub struct GenerationClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl GenerationClient {
    /// Creates a client from explicit configuration.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        // The body of a generation can stream for a long time, so only
        // connecting and the response head are bounded.
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a client using `SERVER_API_URL`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Prepares the streaming request. Nothing is sent until the first chunk
    /// is pulled, so connection failures surface through the source.
    pub fn open(&self, request: &EpisodeRequest) -> Result<HttpChunkSource, ClientError> {
        request.validate()?;
        let url = self.config.generate_url();
        debug!(%url, art_style = ?request.art_style, mode = ?request.mode, "preparing generation request");
        let builder = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request);
        Ok(HttpChunkSource {
            state: SourceState::Pending(builder),
            response_timeout: self.config.timeout,
        })
    }

    /// Runs a generation to its end, reporting every intermediate state.
    ///
    /// Only request validation fails here; transport problems end the run in
    /// a `Failed` state.
    pub async fn generate<F>(
        &self,
        request: &EpisodeRequest,
        on_state_change: F,
    ) -> Result<GenerationState, ClientError>
    where
        F: FnMut(&GenerationState) + Send,
    {
        let source = self.open(request)?;
        Ok(StreamOrchestrator::new().run(source, on_state_change).await)
    }

    /// Starts a generation on a background task.
    pub fn spawn(&self, request: &EpisodeRequest) -> Result<GenerationRun, ClientError> {
        let source = self.open(request)?;
        Ok(StreamOrchestrator::new().spawn(source, self.config.state_buffer_capacity))
    }
}

enum SourceState {
    Pending(reqwest::RequestBuilder),
    Streaming {
        stream: ByteStream,
        received_any: bool,
    },
    Closed,
}

/// Response body of a generation request, read chunk by chunk.
///
/// A body that ends before its first byte is reported as
/// `SourceError::EmptyBody`, whether or not the server declared a length.
pub struct HttpChunkSource {
    state: SourceState,
    response_timeout: Duration,
}

impl HttpChunkSource {
    async fn connect(
        builder: reqwest::RequestBuilder,
        response_timeout: Duration,
    ) -> Result<ByteStream, SourceError> {
        let response = tokio::time::timeout(response_timeout, builder.send())
            .await
            .map_err(|_| {
                SourceError::request(format!("no response within {response_timeout:?}"))
            })?
            .map_err(|e| SourceError::request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if response.content_length() == Some(0) {
            return Err(SourceError::EmptyBody);
        }
        debug!(status = status.as_u16(), "generation stream opened");
        Ok(Box::pin(response.bytes_stream()))
    }
}

#[async_trait::async_trait]
impl ChunkSource for HttpChunkSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, SourceError> {
        // A failed connect leaves the source closed.
        self.state = match std::mem::replace(&mut self.state, SourceState::Closed) {
            SourceState::Pending(builder) => SourceState::Streaming {
                stream: Self::connect(builder, self.response_timeout).await?,
                received_any: false,
            },
            other => other,
        };
        let SourceState::Streaming {
            stream,
            received_any,
        } = &mut self.state
        else {
            return Ok(None);
        };
        let chunk = match stream.next().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(SourceError::read(e.to_string())),
            None if *received_any => return Ok(None),
            None => {
                self.state = SourceState::Closed;
                return Err(SourceError::EmptyBody);
            }
        };
        *received_any |= !chunk.is_empty();
        Ok(Some(chunk))
    }

    async fn close(&mut self) {
        self.state = SourceState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::GenerationStatus;
    use serde_json::json;
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::{TcpListener, TcpStream};

    const CHUNKED_HEAD: &str = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n";

    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    return;
                }
            }
        }
    }

    /// Serves one connection, writing each part after its delay.
    async fn serve_once(parts: Vec<(Duration, String)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            read_request(&mut socket).await;
            for (delay, part) in parts {
                tokio::time::sleep(delay).await;
                if socket.write_all(part.as_bytes()).await.is_err() {
                    return;
                }
            }
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_millis(200)).await;
        });
        format!("http://{addr}")
    }

    fn chunk(text: &str) -> String {
        format!("{:x}\r\n{text}\r\n", text.len())
    }

    #[tokio::test]
    async fn open_rejects_invalid_request() {
        let client = GenerationClient::new(ClientConfig::new("http://127.0.0.1:9")).expect("client");
        let request = EpisodeRequest::new("", json!("c1"), "u1");
        assert!(matches!(
            client.open(&request),
            Err(ClientError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn connection_failure_ends_in_failed_state() {
        // Port 9 (discard) is not expected to accept HTTP connections.
        let client = GenerationClient::new(
            ClientConfig::new("http://127.0.0.1:9").timeout(Duration::from_secs(5)),
        )
        .expect("client");
        let request = EpisodeRequest::new("story", json!({"_id": "c1"}), "u1");
        let mut seen = Vec::new();
        let state = client
            .generate(&request, |s| seen.push(s.status))
            .await
            .expect("valid request");
        assert_eq!(state.status, GenerationStatus::Failed);
        assert!(state.error.as_deref().is_some_and(|e| !e.is_empty()));
        assert_eq!(seen, vec![GenerationStatus::Failed]);
    }

    #[tokio::test]
    async fn empty_chunked_body_ends_in_failed_state() {
        let base_url = serve_once(vec![(Duration::ZERO, format!("{CHUNKED_HEAD}0\r\n\r\n"))]).await;
        let client = GenerationClient::new(ClientConfig::new(base_url)).expect("client");
        let request = EpisodeRequest::new("story", json!({"_id": "c1"}), "u1");
        let mut seen = Vec::new();
        let state = client
            .generate(&request, |s| seen.push(s.status))
            .await
            .expect("valid request");
        assert_eq!(state.status, GenerationStatus::Failed);
        assert_eq!(state.error, Some(SourceError::EmptyBody.to_string()));
        assert_eq!(seen, vec![GenerationStatus::Failed]);
    }

    #[tokio::test]
    async fn timeout_does_not_cut_off_a_slow_body() {
        let completed = "event: completed\ndata: {\"body\":{\"url\":\"x.mp4\"}}\n\n";
        let base_url = serve_once(vec![
            (Duration::ZERO, CHUNKED_HEAD.to_string()),
            (
                Duration::from_millis(600),
                format!("{}0\r\n\r\n", chunk(completed)),
            ),
        ])
        .await;
        let client = GenerationClient::new(
            ClientConfig::new(base_url).timeout(Duration::from_millis(200)),
        )
        .expect("client");
        let request = EpisodeRequest::new("story", json!({"_id": "c1"}), "u1");
        let state = client.generate(&request, |_| {}).await.expect("valid request");
        assert_eq!(state.status, GenerationStatus::Completed, "{state:?}");
        assert_eq!(
            state.final_payload.map(serde_json::Value::Object),
            Some(json!({"url": "x.mp4"}))
        );
    }

    #[tokio::test]
    async fn timeout_bounds_the_wait_for_response_headers() {
        let base_url = serve_once(vec![(Duration::from_secs(2), CHUNKED_HEAD.to_string())]).await;
        let client = GenerationClient::new(
            ClientConfig::new(base_url).timeout(Duration::from_millis(200)),
        )
        .expect("client");
        let request = EpisodeRequest::new("story", json!({"_id": "c1"}), "u1");
        let state = client.generate(&request, |_| {}).await.expect("valid request");
        assert_eq!(state.status, GenerationStatus::Failed);
        assert!(state.error.as_deref().is_some_and(|e| e.contains("no response within")));
    }

    #[tokio::test]
    async fn closed_source_reports_end_of_stream() {
        let client = GenerationClient::new(ClientConfig::new("http://127.0.0.1:9")).expect("client");
        let mut source = client
            .open(&EpisodeRequest::new("story", json!("c1"), "u1"))
            .expect("source");
        source.close().await;
        assert_eq!(source.next_chunk().await, Ok(None));
    }

    #[tokio::test]
    async fn env_gated_smoke_generation_if_server_configured() {
        let client = match GenerationClient::from_env() {
            Ok(client) => client,
            Err(_) => {
                eprintln!("skipping generation smoke test (SERVER_API_URL missing)");
                return;
            }
        };
        let request = EpisodeRequest::new("A short test story.", json!({"_id": "smoke"}), "smoke");
        let state = client.generate(&request, |_| {}).await.expect("valid request");
        assert!(
            state.status != GenerationStatus::Idle,
            "expected at least one event or a failure: {state:?}"
        );
    }
}
