use serde::{Deserialize, Serialize};
use std::fmt;

/// Role tag attached to every entry sent to the chat-completions API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// One user message paired with the assistant reply it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub user: String,
    pub assistant: String,
}

impl Turn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}

/// Chronologically ordered turns of a single conversation.
///
/// The only mutation is [`History::push`]; turns are never reordered,
/// deduplicated or truncated here. Callers that need a bounded context window
/// must trim before composing a prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(Vec<Turn>);

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.0.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.0.last()
    }
}

impl From<Vec<Turn>> for History {
    fn from(turns: Vec<Turn>) -> Self {
        Self(turns)
    }
}

impl FromIterator<Turn> for History {
    fn from_iter<I: IntoIterator<Item = Turn>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_as_api_strings() {
        let json = serde_json::to_string(&[Role::System, Role::User, Role::Assistant]).unwrap();
        assert_eq!(json, r#"["system","user","assistant"]"#);
        let parsed: Role = serde_json::from_str(r#""assistant""#).unwrap();
        assert_eq!(parsed, Role::Assistant);
    }

    #[test]
    fn invalid_role_strings_are_rejected() {
        assert!(Role::try_from("tool").is_err());
        assert!(serde_json::from_str::<Role>(r#""narrator""#).is_err());
    }

    #[test]
    fn history_uses_plain_turn_array_on_the_wire() {
        let history: History = vec![Turn::new("hi", "hello"), Turn::new("bye", "farewell")].into();
        let json = serde_json::to_value(&history).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"user": "hi", "assistant": "hello"},
                {"user": "bye", "assistant": "farewell"}
            ])
        );

        let parsed: History = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, history);
    }

    #[test]
    fn push_preserves_order() {
        let mut history = History::new();
        assert!(history.is_empty());
        history.push(Turn::new("1", "a"));
        history.push(Turn::new("2", "b"));
        let users: Vec<&str> = history.iter().map(|t| t.user.as_str()).collect();
        assert_eq!(users, ["1", "2"]);
        assert_eq!(history.last(), Some(&Turn::new("2", "b")));
    }
}
