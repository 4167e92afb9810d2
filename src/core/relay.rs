//! Forwards composed prompts to the chat-completions provider.
//!
//! Two delivery modes share one request builder: [`ChatRelay::complete`]
//! waits for the whole reply (retrying transient failures), while
//! [`ChatRelay::stream`] hands back a [`RelayStream`] of fragments. The relay
//! never touches conversation history; appending the finished turn is the
//! caller's job, so a retried call can never produce a duplicate turn.

use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{ChatMessage, ChatRequest, CompletionResponse};
use crate::core::chat_stream::{spawn_stream, summarize_api_error, RelayStream, StreamParams};
use crate::core::config::{ProviderConfig, SamplingConfig};
use crate::core::providers::ProviderSession;

/// Failure talking to the provider.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("provider did not respond within {}s", .0.as_secs_f32())]
    Timeout(Duration),

    #[error("provider reported an error: {0}")]
    Provider(String),

    #[error("provider stream interrupted: {0}")]
    Interrupted(String),

    #[error("provider closed the stream before signalling completion")]
    Incomplete,

    #[error("malformed provider response: {0}")]
    Decode(String),

    #[error("provider returned no completion")]
    EmptyCompletion,
}

impl RelayError {
    /// Whether a fresh attempt has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            RelayError::Request(err) => err.is_connect() || err.is_timeout(),
            RelayError::Status { status, .. } => *status == 429 || *status >= 500,
            RelayError::Timeout(_) => true,
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            RelayError::Timeout(_) => true,
            RelayError::Request(err) => err.is_timeout(),
            _ => false,
        }
    }
}

/// Joins a base URL and an endpoint path without doubling slashes.
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

#[derive(Clone)]
pub struct ChatRelay {
    client: Client,
    session: ProviderSession,
    sampling: SamplingConfig,
    timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

impl ChatRelay {
    pub fn new(session: ProviderSession, provider: &ProviderConfig, sampling: SamplingConfig) -> Self {
        Self {
            client: Client::new(),
            session,
            sampling,
            timeout: provider.timeout(),
            max_retries: provider.max_retries,
            retry_backoff: provider.retry_backoff(),
        }
    }

    pub fn model(&self) -> &str {
        &self.session.model
    }

    fn request(&self, messages: &[ChatMessage], stream: bool) -> reqwest::RequestBuilder {
        let body = ChatRequest {
            model: &self.session.model,
            messages,
            stream,
            temperature: self.sampling.temperature,
            max_tokens: self.sampling.max_tokens,
            top_p: self.sampling.top_p,
        };

        self.client
            .post(construct_api_url(&self.session.base_url, "chat/completions"))
            .bearer_auth(&self.session.api_key)
            .json(&body)
    }

    /// Blocking mode: the full reply or a single error, never partial text.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, RelayError> {
        let mut attempt: u32 = 0;
        loop {
            match self.complete_once(messages).await {
                Ok(reply) => return Ok(reply),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self
                        .retry_backoff
                        .saturating_mul(1u32 << attempt.min(16));
                    attempt += 1;
                    warn!(attempt, error = %err, ?delay, "transient provider failure, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn complete_once(&self, messages: &[ChatMessage]) -> Result<String, RelayError> {
        tokio::time::timeout(self.timeout, self.send_completion(messages))
            .await
            .map_err(|_| RelayError::Timeout(self.timeout))?
    }

    async fn send_completion(&self, messages: &[ChatMessage]) -> Result<String, RelayError> {
        debug!(model = %self.session.model, messages = messages.len(), "requesting completion");
        let response = self.request(messages, false).send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RelayError::Status {
                status: status.as_u16(),
                message: summarize_api_error(&error_text),
            });
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|err| RelayError::Decode(err.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(RelayError::EmptyCompletion)
    }

    /// Streaming mode. Cancelling `cancel_token` or dropping the returned
    /// stream closes the upstream connection.
    pub fn stream(&self, messages: &[ChatMessage], cancel_token: CancellationToken) -> RelayStream {
        debug!(model = %self.session.model, messages = messages.len(), "requesting streamed completion");
        spawn_stream(StreamParams {
            request: self.request(messages, true),
            idle_timeout: self.timeout,
            cancel_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chat_stream::{StreamEvent, StreamOutcome};
    use axum::body::Body;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::{Json, Router};
    use futures_util::StreamExt;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    #[derive(Clone, Copy)]
    enum Script {
        Reply,
        FailThenReply(usize),
        AlwaysStatus(u16),
        Slow,
        StreamDone,
        StreamDropped,
        /// One fragment, then the body stays open without sending more.
        StreamStalled,
    }

    /// Flips `body_dropped` once the server releases the response body.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Clone)]
    struct MockState {
        script: Script,
        calls: Arc<AtomicUsize>,
        bodies: Arc<tokio::sync::Mutex<Vec<serde_json::Value>>>,
        body_dropped: Arc<AtomicBool>,
    }

    fn sse(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    async fn completions(
        State(state): State<MockState>,
        Json(body): Json<serde_json::Value>,
    ) -> Response {
        let call = state.calls.fetch_add(1, Ordering::SeqCst);
        state.bodies.lock().await.push(body);

        let reply = || {
            Json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "Elementary."}}]
            }))
            .into_response()
        };

        match state.script {
            Script::Reply => reply(),
            Script::FailThenReply(failures) if call < failures => (
                StatusCode::SERVICE_UNAVAILABLE,
                r#"{"error":{"message":"over capacity"}}"#,
            )
                .into_response(),
            Script::FailThenReply(_) => reply(),
            Script::AlwaysStatus(code) => (
                StatusCode::from_u16(code).unwrap(),
                r#"{"error":{"message":"nope"}}"#,
            )
                .into_response(),
            Script::Slow => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                reply()
            }
            Script::StreamDone => {
                let body = format!("{}{}data: [DONE]\n\n", sse("Elemen"), sse("tary."));
                Response::builder()
                    .header("content-type", "text/event-stream")
                    .body(Body::from(body))
                    .unwrap()
            }
            Script::StreamDropped => {
                let parts: Vec<Result<String, std::io::Error>> = vec![
                    Ok(sse("Half an ans")),
                    Err(std::io::Error::new(std::io::ErrorKind::Other, "boom")),
                ];
                // Give the first fragment time to reach the client before the abort.
                let body = futures_util::stream::iter(parts).then(|part| async move {
                    if part.is_err() {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                    part
                });
                Response::builder()
                    .header("content-type", "text/event-stream")
                    .body(Body::from_stream(body))
                    .unwrap()
            }
            Script::StreamStalled => {
                let flag = DropFlag(state.body_dropped.clone());
                let body = futures_util::stream::once(async { Ok::<_, std::io::Error>(sse("f0 ")) })
                    .chain(futures_util::stream::pending())
                    .map(move |part| {
                        let _alive = &flag;
                        part
                    });
                Response::builder()
                    .header("content-type", "text/event-stream")
                    .body(Body::from_stream(body))
                    .unwrap()
            }
        }
    }

    async fn start_mock(script: Script) -> (String, MockState) {
        let state = MockState {
            script,
            calls: Arc::new(AtomicUsize::new(0)),
            bodies: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            body_dropped: Arc::new(AtomicBool::new(false)),
        };
        let app = Router::new()
            .route("/v1/chat/completions", post(completions))
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("local addr should resolve");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{addr}/v1/"), state)
    }

    fn relay_for(base_url: String, timeout: Duration) -> ChatRelay {
        let session = ProviderSession {
            api_key: "test-key".to_string(),
            base_url,
            model: "test-model".to_string(),
        };
        let provider = ProviderConfig {
            timeout_secs: 1,
            max_retries: 2,
            retry_backoff_ms: 1,
            ..Default::default()
        };
        let mut relay = ChatRelay::new(session, &provider, SamplingConfig::default());
        relay.timeout = timeout;
        relay
    }

    fn prompt() -> Vec<ChatMessage> {
        vec![ChatMessage::system("persona"), ChatMessage::user("Who made you?")]
    }

    #[test]
    fn construct_api_url_normalizes_slashes() {
        assert_eq!(
            construct_api_url("https://api.groq.com/openai/v1/", "/chat/completions"),
            "https://api.groq.com/openai/v1/chat/completions"
        );
        assert_eq!(
            construct_api_url("http://localhost:8080///", "chat/completions"),
            "http://localhost:8080/chat/completions"
        );
    }

    #[test]
    fn transient_classification() {
        let status = |status| RelayError::Status {
            status,
            message: String::new(),
        };
        assert!(status(429).is_transient());
        assert!(status(503).is_transient());
        assert!(!status(400).is_transient());
        assert!(!status(401).is_transient());
        assert!(RelayError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(RelayError::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(!RelayError::EmptyCompletion.is_transient());
        assert!(!RelayError::Provider("x".into()).is_transient());
    }

    #[tokio::test]
    async fn complete_sends_sampling_and_returns_reply() {
        let (base_url, state) = start_mock(Script::Reply).await;
        let relay = relay_for(base_url, Duration::from_secs(5));

        let reply = relay.complete(&prompt()).await.expect("completion");
        assert_eq!(reply, "Elementary.");

        let bodies = state.bodies.lock().await;
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["model"], "test-model");
        assert_eq!(bodies[0]["stream"], false);
        assert_eq!(bodies[0]["max_tokens"], 1024);
        assert_eq!(bodies[0]["messages"][1]["content"], "Who made you?");
    }

    #[tokio::test]
    async fn complete_retries_transient_failures() {
        let (base_url, state) = start_mock(Script::FailThenReply(2)).await;
        let relay = relay_for(base_url, Duration::from_secs(5));

        let reply = relay.complete(&prompt()).await.expect("third attempt succeeds");
        assert_eq!(reply, "Elementary.");
        assert_eq!(state.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn complete_gives_up_after_max_retries() {
        let (base_url, state) = start_mock(Script::AlwaysStatus(502)).await;
        let relay = relay_for(base_url, Duration::from_secs(5));

        let err = relay.complete(&prompt()).await.expect_err("should fail");
        assert!(matches!(err, RelayError::Status { status: 502, ref message } if message == "nope"));
        assert_eq!(state.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn complete_does_not_retry_client_errors() {
        let (base_url, state) = start_mock(Script::AlwaysStatus(401)).await;
        let relay = relay_for(base_url, Duration::from_secs(5));

        let err = relay.complete(&prompt()).await.expect_err("should fail");
        assert!(matches!(err, RelayError::Status { status: 401, .. }));
        assert_eq!(state.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn complete_times_out() {
        let (base_url, _state) = start_mock(Script::Slow).await;
        let mut relay = relay_for(base_url, Duration::from_millis(100));
        relay.max_retries = 0;

        let err = relay.complete(&prompt()).await.expect_err("should time out");
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn stream_yields_fragments_then_completion() {
        let (base_url, state) = start_mock(Script::StreamDone).await;
        let relay = relay_for(base_url, Duration::from_secs(5));

        let mut stream = relay.stream(&prompt(), CancellationToken::new());
        let mut fragments = Vec::new();
        let mut outcome = None;
        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Chunk(text) => fragments.push(text),
                StreamEvent::Finished(done) => outcome = Some(done),
            }
        }
        assert_eq!(fragments, ["Elemen", "tary."]);
        assert!(matches!(outcome, Some(StreamOutcome::Completed)));
        assert!(stream.next().await.is_none(), "stream is one-shot");
        assert_eq!(state.bodies.lock().await[0]["stream"], true);
    }

    #[tokio::test]
    async fn dropped_connection_is_reported_as_truncation() {
        let (base_url, _state) = start_mock(Script::StreamDropped).await;
        let relay = relay_for(base_url, Duration::from_secs(5));

        let (text, outcome) = relay
            .stream(&prompt(), CancellationToken::new())
            .collect_text()
            .await;
        assert_eq!(text, "Half an ans");
        assert!(matches!(outcome, StreamOutcome::Truncated(_)));
    }

    #[tokio::test]
    async fn stream_surfaces_status_errors_without_fragments() {
        let (base_url, _state) = start_mock(Script::AlwaysStatus(500)).await;
        let relay = relay_for(base_url, Duration::from_secs(5));

        let (text, outcome) = relay
            .stream(&prompt(), CancellationToken::new())
            .collect_text()
            .await;
        assert!(text.is_empty());
        assert!(matches!(
            outcome,
            StreamOutcome::Truncated(RelayError::Status { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn cancelling_the_token_ends_the_stream() {
        let (base_url, _state) = start_mock(Script::Slow).await;
        let relay = relay_for(base_url, Duration::from_secs(5));
        let token = CancellationToken::new();

        let stream = relay.stream(&prompt(), token.clone());
        token.cancel();
        let (text, outcome) = stream.collect_text().await;
        assert!(text.is_empty());
        assert!(matches!(outcome, StreamOutcome::Cancelled));
    }

    #[tokio::test]
    async fn stalled_stream_times_out_between_chunks() {
        let (base_url, _state) = start_mock(Script::StreamStalled).await;
        let relay = relay_for(base_url, Duration::from_millis(300));

        let (text, outcome) = relay
            .stream(&prompt(), CancellationToken::new())
            .collect_text()
            .await;
        assert_eq!(text, "f0 ");
        assert!(matches!(
            outcome,
            StreamOutcome::Truncated(RelayError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn dropping_the_stream_closes_the_upstream_body() {
        let (base_url, state) = start_mock(Script::StreamStalled).await;
        let relay = relay_for(base_url, Duration::from_secs(5));

        let mut stream = relay.stream(&prompt(), CancellationToken::new());
        match stream.next().await {
            Some(StreamEvent::Chunk(text)) => assert_eq!(text, "f0 "),
            other => panic!("expected a first fragment, got {other:?}"),
        }
        assert!(!state.body_dropped.load(Ordering::SeqCst));
        drop(stream);

        let mut released = false;
        for _ in 0..40 {
            if state.body_dropped.load(Ordering::SeqCst) {
                released = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(released, "upstream body should be dropped after the stream is");
    }
}
