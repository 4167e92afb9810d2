//! JSON bodies of the relay's own HTTP surface, shared by the server and
//! [`crate::client::RelayClient`].

use serde::{Deserialize, Serialize};

use crate::core::message::History;

/// Body of `POST /chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub character: String,
    pub message: String,
    /// Prior turns of the conversation; omitted or `null` means none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<History>,
    /// Selects the streamed `text/plain` response instead of JSON.
    #[serde(default)]
    pub stream: bool,
}

/// Blocking-mode answer to `POST /chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
    /// Request history with the new turn appended.
    pub history: History,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterList {
    pub characters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub version: String,
    pub model: String,
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub detail: String,
}
