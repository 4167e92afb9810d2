//! Client-side collection of named chat sessions.
//!
//! The relay server is stateless; whoever drives it (the interactive CLI, a
//! browser UI) owns a [`SessionStore`] and sends the active session's history
//! along with every message. A session starts out pending (no turns, a
//! placeholder name) and is re-keyed under an automatic title when its first
//! turn lands. Sessions are never deleted.
//!
//! Sends are serialised per session: [`SessionStore::begin_send`] marks the
//! active session as waiting for a reply and hands out a [`PendingTurn`] that
//! must be either completed (appending exactly one turn) or aborted (leaving
//! the history untouched).

use chrono::{DateTime, Local};
use std::collections::HashSet;
use thiserror::Error;

use crate::core::message::{History, Turn};

/// Number of words of the first message used in an automatic title.
pub const AUTO_NAME_WORDS: usize = 4;

const PLACEHOLDER_TITLE: &str = "New Conversation";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no chat session named '{0}'")]
    UnknownSession(String),

    #[error("session name cannot be empty")]
    EmptyName,

    #[error("chat session '{0}' is still waiting for a reply")]
    Busy(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    name: String,
    history: History,
}

impl Session {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// True until the first turn has been recorded.
    pub fn is_pending(&self) -> bool {
        self.history.is_empty()
    }
}

/// Claim on a session while its reply is in flight.
#[derive(Debug)]
#[must_use = "a pending turn must be completed or aborted"]
pub struct PendingTurn {
    session: String,
    history: History,
}

impl PendingTurn {
    pub fn session(&self) -> &str {
        &self.session
    }

    /// History to send with the request, as it was when the send began.
    pub fn history(&self) -> &History {
        &self.history
    }
}

/// Title for a session derived from its first message:
/// `"{character} – {first four words, title-cased}"`.
pub fn auto_name(character: &str, message: &str) -> String {
    let title = message
        .split_whitespace()
        .take(AUTO_NAME_WORDS)
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ");

    if title.is_empty() {
        format!("{character} – {PLACEHOLDER_TITLE}")
    } else {
        format!("{character} – {title}")
    }
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

fn placeholder_name(now: DateTime<Local>) -> String {
    format!("New Chat ({})", now.format("%H:%M:%S"))
}

#[derive(Debug, Default)]
pub struct SessionStore {
    /// Creation order; renames keep a session's slot.
    sessions: Vec<Session>,
    active: Option<String>,
    in_flight: HashSet<String>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sessions.iter().map(|s| s.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.name == name)
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.active.as_deref().and_then(|name| self.get(name))
    }

    /// Turns of the active session; empty before the first session exists.
    pub fn active_history(&self) -> &[Turn] {
        self.active_session()
            .map(|s| s.history.turns())
            .unwrap_or(&[])
    }

    pub fn is_in_flight(&self, name: &str) -> bool {
        self.in_flight.contains(name)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.sessions.iter().position(|s| s.name == name)
    }

    /// `base`, or `base #n` for the first free `n`. `ignore` names a session
    /// whose current name does not count as taken.
    fn unique_name(&self, base: &str, ignore: Option<&str>) -> String {
        let taken = |candidate: &str| {
            Some(candidate) != ignore && self.sessions.iter().any(|s| s.name == candidate)
        };
        if !taken(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{base} #{n}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Creates an empty session under a timestamp placeholder and activates it.
    pub fn new_session(&mut self) -> &str {
        self.new_session_at(Local::now())
    }

    pub fn new_session_at(&mut self, now: DateTime<Local>) -> &str {
        let name = self.unique_name(&placeholder_name(now), None);
        self.sessions.push(Session {
            name: name.clone(),
            history: History::new(),
        });
        self.active = Some(name);
        &self.sessions[self.sessions.len() - 1].name
    }

    /// Makes `name` the active session. Unknown names are rejected; nothing
    /// is created on the fly.
    pub fn switch_active(&mut self, name: &str) -> Result<&History, SessionError> {
        let index = self
            .position(name)
            .ok_or_else(|| SessionError::UnknownSession(name.to_string()))?;
        self.active = Some(name.to_string());
        Ok(&self.sessions[index].history)
    }

    /// Moves `old`'s history under `new`. An existing session called `new` is
    /// overwritten and removed; the active pointer follows the rename.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), SessionError> {
        let new = new.trim();
        if new.is_empty() {
            return Err(SessionError::EmptyName);
        }
        let mut index = self
            .position(old)
            .ok_or_else(|| SessionError::UnknownSession(old.to_string()))?;
        if old == new {
            return Ok(());
        }
        for name in [old, new] {
            if self.in_flight.contains(name) {
                return Err(SessionError::Busy(name.to_string()));
            }
        }

        if let Some(target) = self.position(new) {
            self.sessions.remove(target);
            if target < index {
                index -= 1;
            }
        }
        self.sessions[index].name = new.to_string();

        if matches!(self.active.as_deref(), Some(active) if active == old || active == new) {
            self.active = Some(new.to_string());
        }
        Ok(())
    }

    /// Claims the active session for one send, creating a session first if
    /// the store is empty.
    pub fn begin_send(&mut self) -> Result<PendingTurn, SessionError> {
        let name = match self.active_session() {
            Some(session) => session.name.clone(),
            None => self.new_session().to_string(),
        };
        if !self.in_flight.insert(name.clone()) {
            return Err(SessionError::Busy(name));
        }
        let history = self
            .get(&name)
            .map(|s| s.history.clone())
            .unwrap_or_default();
        Ok(PendingTurn {
            session: name,
            history,
        })
    }

    /// Appends the finished turn. A pending session is first re-keyed under
    /// [`auto_name`]; a clash with another session gets a `#n` suffix rather
    /// than overwriting it. Returns the session's (possibly new) name.
    pub fn complete_send(
        &mut self,
        pending: PendingTurn,
        character: &str,
        message: &str,
        reply: &str,
    ) -> Result<String, SessionError> {
        self.in_flight.remove(&pending.session);
        let index = self
            .position(&pending.session)
            .ok_or_else(|| SessionError::UnknownSession(pending.session.clone()))?;

        if self.sessions[index].is_pending() {
            let derived = self.unique_name(&auto_name(character, message), Some(&pending.session));
            if self.active.as_deref() == Some(pending.session.as_str()) {
                self.active = Some(derived.clone());
            }
            self.sessions[index].name = derived;
        }

        let session = &mut self.sessions[index];
        session.history.push(Turn::new(message, reply));
        Ok(session.name.clone())
    }

    /// Releases the claim without touching the history.
    pub fn abort_send(&mut self, pending: PendingTurn) {
        self.in_flight.remove(&pending.session);
    }

    /// Records a completed exchange on the active session.
    pub fn record_turn(
        &mut self,
        character: &str,
        message: &str,
        reply: &str,
    ) -> Result<String, SessionError> {
        let pending = self.begin_send()?;
        self.complete_send(pending, character, message, reply)
    }
}
