//! Session event types

use std::time::Duration;

use reel_stream::{Artifact, ErrorClassification};
use serde::Serialize;

use crate::conversation::LogEntry;
use crate::session::{SessionOutcome, SessionState};

/// Events emitted while a generation session runs
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A topic was accepted and the request is about to be sent
    SessionStart { topic: String },

    /// The state machine moved
    StateChanged { state: SessionState },

    /// The response is streaming but no code has arrived yet
    Thinking,

    /// The opening fence was seen
    CodeStart,

    /// Code region text, in arrival order
    CodeDelta { segment: String },

    /// The code region finished and passed validation
    CodeComplete,

    /// A validated artifact is ready for open, save and export
    ArtifactReady { topic: String, artifact: Artifact },

    /// Transient notice, to be hidden after `dismiss_after`
    Notice {
        classification: ErrorClassification,
        message: String,
        dismiss_after: Duration,
    },

    /// An entry was appended to the visible log
    LogAppended { entry: LogEntry },

    /// The session returned to idle
    SessionEnd { outcome: SessionOutcome },
}

impl SessionEvent {
    /// Check if this is the terminal event of a session
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::SessionEnd { .. })
    }
}
