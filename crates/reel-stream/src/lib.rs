//! reel-stream: client side of the animation generation backend
//!
//! This crate reads the incremental token stream, pulls the fenced code
//! region out of it, validates the resulting document, and talks to the
//! recording endpoint.

pub mod artifact;
pub mod backend;
pub mod error;
pub mod fence;
pub mod stream;
pub mod types;

pub use artifact::{Artifact, ArtifactValidator, Rejection};
pub use backend::{BackendClient, DEFAULT_BACKEND_URL};
pub use error::{Error, ErrorClassification, Result};
pub use fence::{FenceScanner, ScanState};
pub use reqwest::Url;
pub use stream::{StreamEvent, StreamEventReader, StreamEventStream};
pub use types::*;
