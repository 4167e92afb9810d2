//! HTTP client for a running relay, used by the `characters`, `say` and
//! `chat` subcommands.

use futures_util::StreamExt;
use reqwest::{Client, Response};
use thiserror::Error;
use tracing::debug;

use crate::core::message::History;
use crate::core::relay::construct_api_url;
use crate::server::wire::{CharacterList, ChatPayload, ChatReply, ErrorBody, Health};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not reach the relay: {0}")]
    Request(#[from] reqwest::Error),

    /// The relay answered with its JSON error body.
    #[error("{detail} ({kind}, HTTP {status})")]
    Api {
        status: u16,
        kind: String,
        detail: String,
    },

    #[error("relay returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Text of a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamedReply {
    pub text: String,
    /// The body ended abnormally; `text` holds only what arrived.
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct RelayClient {
    client: Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        construct_api_url(&self.base_url, endpoint)
    }

    async fn check(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match serde_json::from_str::<ErrorBody>(&body) {
            Ok(error) => ClientError::Api {
                status: status.as_u16(),
                kind: error.kind,
                detail: error.detail,
            },
            Err(_) => ClientError::Status {
                status: status.as_u16(),
                body,
            },
        })
    }

    pub async fn health(&self) -> Result<Health, ClientError> {
        let response = self.client.get(self.url("")).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn characters(&self) -> Result<Vec<String>, ClientError> {
        let response = self.client.get(self.url("characters")).send().await?;
        let list: CharacterList = Self::check(response).await?.json().await?;
        Ok(list.characters)
    }

    /// Blocking chat: the full reply plus `history` extended by the new turn.
    pub async fn chat(
        &self,
        character: &str,
        message: &str,
        history: &History,
    ) -> Result<ChatReply, ClientError> {
        let payload = payload(character, message, history, false);
        let response = self.client.post(self.url("chat")).json(&payload).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Streaming chat. `on_chunk` sees each decoded fragment as it arrives.
    /// A body cut off mid-way is reported through
    /// [`StreamedReply::truncated`], not as an error.
    pub async fn chat_stream<F>(
        &self,
        character: &str,
        message: &str,
        history: &History,
        mut on_chunk: F,
    ) -> Result<StreamedReply, ClientError>
    where
        F: FnMut(&str),
    {
        let payload = payload(character, message, history, true);
        let response = self.client.post(self.url("chat")).json(&payload).send().await?;
        let mut body = Self::check(response).await?.bytes_stream();

        let mut text = String::new();
        let mut pending = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    pending.extend_from_slice(&bytes);
                    let decoded = take_utf8(&mut pending);
                    if !decoded.is_empty() {
                        on_chunk(&decoded);
                        text.push_str(&decoded);
                    }
                }
                Err(err) => {
                    debug!(error = %err, "relay stream ended abnormally");
                    truncated = true;
                    break;
                }
            }
        }
        if !pending.is_empty() {
            let rest = String::from_utf8_lossy(&pending).into_owned();
            on_chunk(&rest);
            text.push_str(&rest);
        }

        Ok(StreamedReply { text, truncated })
    }
}

fn payload(character: &str, message: &str, history: &History, stream: bool) -> ChatPayload {
    ChatPayload {
        character: character.to_string(),
        message: message.to_string(),
        history: Some(history.clone()),
        stream,
    }
}

/// Takes the longest valid UTF-8 prefix out of `pending`, leaving an
/// incomplete trailing sequence for the next read.
fn take_utf8(pending: &mut Vec<u8>) -> String {
    let valid = match std::str::from_utf8(pending) {
        Ok(_) => pending.len(),
        Err(err) if err.error_len().is_none() => err.valid_up_to(),
        Err(_) => pending.len(),
    };
    let text = String::from_utf8_lossy(&pending[..valid]).into_owned();
    pending.drain(..valid);
    text
}
