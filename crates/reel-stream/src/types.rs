//! Wire types shared with the generation and recording backends

use serde::{Deserialize, Serialize};

/// Who authored a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Get the wire name for this role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of the conversation history sent with every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    /// Create a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Body of `POST /generate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub topic: String,
    pub history: Vec<ConversationTurn>,
}

/// Payload of a single `data: ` block in the generation stream
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct StreamPayload {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Lifecycle marker; `[DONE]` terminates the stream
    #[serde(default)]
    pub event: Option<String>,
}

/// Body of `POST /record`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRequest {
    /// Full document to load and record
    pub html_text: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Page load condition (`load`, `domcontentloaded`, `networkidle`)
    pub wait_until: String,
    /// Maximum page load wait in milliseconds
    pub timeout: u64,
    /// Name of the event the document dispatches when its animation ends
    pub end_event: String,
    /// Maximum wait for `end_event` in milliseconds
    pub end_timeout: u64,
    pub mp4: bool,
    pub headless: bool,
}

/// Response of `POST /record`.
///
/// The backend sends more fields (`ok`, `webm_url`, ...); only the ones the
/// client acts on are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mp4_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecordResponse {
    /// The media locator, if the backend returned a non-empty one
    pub fn media_locator(&self) -> Option<&str> {
        self.mp4_url.as_deref().filter(|url| !url.trim().is_empty())
    }
}
