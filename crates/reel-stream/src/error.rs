//! Error types for reel-stream

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::Rejection;

/// Result type alias using reel-stream Error
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse failure category used to pick a user-facing message.
///
/// Classifications are never used to drive retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClassification {
    /// The backend could not be reached or answered with a non-success status
    NetworkUnavailable,
    /// The backend reported quota exhaustion (HTTP 429)
    RateLimited,
    /// The stream produced no usable code region or the document was rejected
    MalformedArtifact,
    /// Anything else
    Unknown,
}

impl ErrorClassification {
    /// Stable identifier for logs and transcripts
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClassification::NetworkUnavailable => "network_unavailable",
            ErrorClassification::RateLimited => "rate_limited",
            ErrorClassification::MalformedArtifact => "malformed_artifact",
            ErrorClassification::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while talking to the generation and recording backends.
///
/// Every variant is created where the failure happens and carries its own
/// classification, see [`Error::classification`].
#[derive(Error, Debug)]
pub enum Error {
    /// The request never reached the backend
    #[error("backend unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    /// The backend answered with a non-success status
    #[error("HTTP error! status: {status}")]
    Status { status: u16, body: String },

    /// The response had a success status but no readable body
    #[error("response has no readable body")]
    MissingBody,

    /// The event stream reported an error
    #[error("stream error: {message}")]
    Stream {
        message: String,
        hint: ErrorClassification,
    },

    /// The event stream ended without a terminator
    #[error("stream ended before the terminator was received")]
    Incomplete,

    /// The stream finished without ever opening a code fence
    #[error("response did not contain a complete code block")]
    NoCodeRegion,

    /// The accumulated document failed validation
    #[error("invalid document: {0}")]
    Rejected(#[from] Rejection),

    /// The recording backend reported a failure
    #[error("{message}")]
    Record { status: Option<u16>, message: String },

    /// The recording backend succeeded but returned no media locator
    #[error("no MP4 download locator was returned; check that the backend transcoder is installed")]
    MissingMediaLocator,

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A URL could not be built from configuration or a locator
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl Error {
    /// Create a status error
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Create a stream error with a classification hint
    pub fn stream(message: impl Into<String>, hint: ErrorClassification) -> Self {
        Self::Stream {
            message: message.into(),
            hint,
        }
    }

    /// The classification this error was tagged with at the point of failure
    pub fn classification(&self) -> ErrorClassification {
        match self {
            Error::Unreachable(_) | Error::MissingBody => ErrorClassification::NetworkUnavailable,
            Error::Status { status, .. } => {
                if *status == 429 {
                    ErrorClassification::RateLimited
                } else {
                    ErrorClassification::NetworkUnavailable
                }
            }
            Error::Stream { hint, .. } => *hint,
            Error::NoCodeRegion | Error::Rejected(_) | Error::MissingMediaLocator => {
                ErrorClassification::MalformedArtifact
            }
            Error::Incomplete
            | Error::Record { .. }
            | Error::Json(_)
            | Error::Io(_)
            | Error::InvalidUrl(_) => ErrorClassification::Unknown,
        }
    }
}
