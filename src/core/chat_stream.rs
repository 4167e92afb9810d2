use futures_util::{Stream, StreamExt};
use memchr::memchr;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::api::ChatResponse;
use crate::core::relay::RelayError;

/// How a streamed reply ended.
#[derive(Debug)]
pub enum StreamOutcome {
    /// The provider signalled completion (`[DONE]` or a finish reason).
    Completed,
    /// The stream stopped early; fragments already delivered stay delivered.
    Truncated(RelayError),
    /// The consumer went away or cancelled the token.
    Cancelled,
}

impl StreamOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StreamOutcome::Completed)
    }
}

#[derive(Debug)]
pub enum StreamEvent {
    Chunk(String),
    /// Always the last event of a [`RelayStream`].
    Finished(StreamOutcome),
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
}

const MAX_ERROR_SUMMARY_CHARS: usize = 300;

/// Condenses a provider error body into a single user-facing line.
pub fn summarize_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "<empty response body>".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&json_value) {
            return summary;
        }
        return json_value.to_string();
    }

    let collapsed = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > MAX_ERROR_SUMMARY_CHARS {
        let cut: String = collapsed.chars().take(MAX_ERROR_SUMMARY_CHARS).collect();
        format!("{cut}…")
    } else {
        collapsed
    }
}

/// Incremental decoder for a chat-completions server-sent-event body.
#[derive(Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    finish_seen: bool,
}

impl SseDecoder {
    /// Feeds raw bytes. Returns the events produced; a `Finished` event, if
    /// present, is last and means the rest of the body must be ignored.
    pub(crate) fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(outcome) = self.process_line(&line, &mut events) {
                events.push(StreamEvent::Finished(outcome));
                self.buffer.clear();
                break;
            }
        }

        events
    }

    /// Called at end of body. A stream that never signalled completion is
    /// reported as truncated.
    pub(crate) fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let rest = std::mem::take(&mut self.buffer);
        if let Some(outcome) = self.process_line(&rest, &mut events) {
            events.push(StreamEvent::Finished(outcome));
            return events;
        }

        let outcome = if self.finish_seen {
            StreamOutcome::Completed
        } else {
            StreamOutcome::Truncated(RelayError::Incomplete)
        };
        events.push(StreamEvent::Finished(outcome));
        events
    }

    fn process_line(&mut self, raw: &[u8], events: &mut Vec<StreamEvent>) -> Option<StreamOutcome> {
        let line = match std::str::from_utf8(raw) {
            Ok(s) => s.trim(),
            Err(err) => {
                debug!(error = %err, "skipping stream line with invalid UTF-8");
                return None;
            }
        };

        let payload = extract_data_payload(line)?;
        if payload == "[DONE]" {
            return Some(StreamOutcome::Completed);
        }
        if payload.is_empty() {
            return None;
        }

        match serde_json::from_str::<ChatResponse>(payload) {
            Ok(response) => {
                if let Some(choice) = response.choices.into_iter().next() {
                    if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                        events.push(StreamEvent::Chunk(content));
                    }
                    if choice.finish_reason.is_some() {
                        self.finish_seen = true;
                    }
                }
                None
            }
            Err(_) => Some(StreamOutcome::Truncated(RelayError::Provider(
                summarize_api_error(payload),
            ))),
        }
    }
}

pub struct StreamParams {
    pub request: reqwest::RequestBuilder,
    /// Bound on time-to-first-response and on each gap between chunks.
    pub idle_timeout: Duration,
    pub cancel_token: CancellationToken,
}

/// Starts the upstream request on a background task and returns the
/// consumer side.
pub fn spawn_stream(params: StreamParams) -> RelayStream {
    let (tx, rx) = mpsc::unbounded_channel();
    let StreamParams {
        request,
        idle_timeout,
        cancel_token,
    } = params;
    let guard = cancel_token.clone().drop_guard();

    tokio::spawn(async move {
        let outcome = tokio::select! {
            outcome = pump_stream(request, idle_timeout, &tx) => outcome,
            _ = cancel_token.cancelled() => StreamOutcome::Cancelled,
        };
        debug!(?outcome, "provider stream finished");
        let _ = tx.send(StreamEvent::Finished(outcome));
    });

    RelayStream {
        rx,
        finished: false,
        _cancel_on_drop: guard,
    }
}

async fn pump_stream(
    request: reqwest::RequestBuilder,
    idle_timeout: Duration,
    tx: &mpsc::UnboundedSender<StreamEvent>,
) -> StreamOutcome {
    let response = match tokio::time::timeout(idle_timeout, request.send()).await {
        Err(_) => return StreamOutcome::Truncated(RelayError::Timeout(idle_timeout)),
        Ok(Err(err)) => return StreamOutcome::Truncated(RelayError::Request(err)),
        Ok(Ok(response)) => response,
    };

    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        return StreamOutcome::Truncated(RelayError::Status {
            status: status.as_u16(),
            message: summarize_api_error(&error_text),
        });
    }

    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::default();

    loop {
        let next = match tokio::time::timeout(idle_timeout, body.next()).await {
            Err(_) => return StreamOutcome::Truncated(RelayError::Timeout(idle_timeout)),
            Ok(next) => next,
        };

        let events = match next {
            Some(Ok(bytes)) => decoder.feed(&bytes),
            Some(Err(err)) => {
                return StreamOutcome::Truncated(RelayError::Interrupted(err.to_string()))
            }
            None => decoder.finish(),
        };

        for event in events {
            match event {
                StreamEvent::Chunk(text) => {
                    if tx.send(StreamEvent::Chunk(text)).is_err() {
                        return StreamOutcome::Cancelled;
                    }
                }
                StreamEvent::Finished(outcome) => return outcome,
            }
        }
    }
}

/// Lazy, finite, one-shot sequence of reply fragments.
///
/// Yields [`StreamEvent::Chunk`]s followed by exactly one
/// [`StreamEvent::Finished`]. Dropping the stream cancels the upstream
/// request.
pub struct RelayStream {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
    finished: bool,
    _cancel_on_drop: DropGuard,
}

impl RelayStream {
    /// Drains the stream, concatenating every fragment.
    pub async fn collect_text(mut self) -> (String, StreamOutcome) {
        let mut text = String::new();
        while let Some(event) = self.next().await {
            match event {
                StreamEvent::Chunk(chunk) => text.push_str(&chunk),
                StreamEvent::Finished(outcome) => return (text, outcome),
            }
        }
        (text, StreamOutcome::Cancelled)
    }
}

impl Stream for RelayStream {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        let event = match ready!(this.rx.poll_recv(cx)) {
            Some(event) => event,
            // The task always reports an outcome unless it panicked.
            None => StreamEvent::Finished(StreamOutcome::Truncated(RelayError::Interrupted(
                "relay task ended unexpectedly".to_string(),
            ))),
        };
        if matches!(event, StreamEvent::Finished(_)) {
            this.finished = true;
        }
        Poll::Ready(Some(event))
    }
}
