//! Request handlers for `GET /`, `GET /characters` and `POST /chat`.

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::{future, stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ChatMessage;
use crate::character::PersonaLookup;
use crate::core::chat_stream::{StreamEvent, StreamOutcome};
use crate::core::language::classify;
use crate::core::message::Turn;
use crate::core::prompt::compose;
use crate::core::relay::RelayError;
use crate::server::error::ApiError;
use crate::server::wire::{CharacterList, ChatPayload, ChatReply, Health};
use crate::server::AppState;

const PLAIN_TEXT: &str = "text/plain; charset=utf-8";

pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "Persona relay running".to_string(),
        version: crate::VERSION.to_string(),
        model: state.relay.model().to_string(),
    })
}

pub async fn characters(State(state): State<AppState>) -> Json<CharacterList> {
    Json(CharacterList {
        characters: state.registry.names(),
    })
}

pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatPayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(ChatPayload {
        character,
        message,
        history,
        stream,
    }) = payload?;

    if message.trim().is_empty() {
        return Err(ApiError::MalformedRequest(
            "message must not be empty".to_string(),
        ));
    }

    let lookup = state.registry.lookup(&character);
    if let PersonaLookup::Fallback { requested, persona } = lookup {
        warn!(requested, fallback = %persona.name, "unknown character, using default persona");
    }

    let mode = classify(&message);
    let history = history.unwrap_or_default();
    let messages = compose(
        &lookup.persona().system_prompt,
        mode,
        history.turns(),
        &message,
    );
    info!(
        character = %lookup.persona().name,
        language = mode.language_name(),
        turns = history.len(),
        stream,
        "relaying chat message"
    );

    if stream {
        return stream_reply(&state, &messages).await;
    }

    let reply = state.relay.complete(&messages).await?;
    let mut history = history;
    history.push(Turn::new(message, reply.clone()));
    Ok(Json(ChatReply { reply, history }).into_response())
}

/// Streams fragments as a raw `text/plain` body.
///
/// The first event is awaited before any header goes out, so a provider that
/// fails up front still gets a JSON error. Later failures abort the body.
async fn stream_reply(state: &AppState, messages: &[ChatMessage]) -> Result<Response, ApiError> {
    let mut events = state.relay.stream(messages, CancellationToken::new());

    let first = match events.next().await {
        Some(StreamEvent::Chunk(text)) => text,
        Some(StreamEvent::Finished(StreamOutcome::Completed)) => String::new(),
        Some(StreamEvent::Finished(StreamOutcome::Truncated(err))) => return Err(err.into()),
        Some(StreamEvent::Finished(StreamOutcome::Cancelled)) | None => {
            return Err(RelayError::Interrupted("stream cancelled before any output".to_string()).into())
        }
    };

    let rest = events.filter_map(|event| {
        future::ready(match event {
            StreamEvent::Chunk(text) => Some(Ok(text)),
            StreamEvent::Finished(StreamOutcome::Completed) => {
                debug!("streamed reply completed");
                None
            }
            StreamEvent::Finished(StreamOutcome::Truncated(err)) => {
                warn!(error = %err, "streamed reply truncated");
                Some(Err(err))
            }
            StreamEvent::Finished(StreamOutcome::Cancelled) => Some(Err(RelayError::Interrupted(
                "stream cancelled".to_string(),
            ))),
        })
    });
    let body = stream::once(future::ready(Ok::<_, RelayError>(first))).chain(rest);

    Ok(([(header::CONTENT_TYPE, PLAIN_TEXT)], Body::from_stream(body)).into_response())
}
