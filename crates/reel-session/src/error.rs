//! Error types for reel-session

use thiserror::Error;

/// Result type alias using reel-session Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned to the caller of a session or export job.
///
/// Generation failures are not in here: they are classified and reported
/// through the session outcome instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Nothing to submit
    #[error("topic is empty")]
    EmptyTopic,

    /// The submission control is held by a running request
    #[error("another request is already in progress")]
    Busy,

    /// No validated artifact is available to act on
    #[error("no animation has been generated yet")]
    NoArtifact,

    /// An error from the backend layer
    #[error(transparent)]
    Backend(#[from] reel_stream::Error),
}

impl Error {
    /// Classification for errors that came from the backend
    pub fn classification(&self) -> Option<reel_stream::ErrorClassification> {
        match self {
            Error::Backend(e) => Some(e.classification()),
            _ => None,
        }
    }
}
