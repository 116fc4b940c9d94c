//! Conversation state: the history sent to the backend and the visible log.

use reel_stream::{Artifact, ConversationTurn};
use serde::{Deserialize, Serialize};

/// Ordered turns sent with every generation request.
///
/// Turns are only ever appended; the whole history is discarded when a new
/// session starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a history, e.g. from a saved transcript
    pub fn from_turns(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub(crate) fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub(crate) fn clear(&mut self) {
        self.turns.clear();
    }
}

/// One entry of the visible conversation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEntry {
    /// A submitted topic
    User { content: String },
    /// A validated animation
    Artifact { topic: String, artifact: Artifact },
    /// A durable record of a failed session
    Failure { message: String },
}

/// The visible log. Unlike [`ConversationHistory`] it keeps failures.
#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    entries: Vec<LogEntry>,
}

impl ChatLog {
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent validated artifact with the topic that produced it
    pub fn last_artifact(&self) -> Option<(&str, &Artifact)> {
        self.entries.iter().rev().find_map(|entry| match entry {
            LogEntry::Artifact { topic, artifact } => Some((topic.as_str(), artifact)),
            _ => None,
        })
    }

    pub(crate) fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
