//! reel-session: generation sessions and export jobs
//!
//! This crate drives one generation request at a time against the backend,
//! keeps the conversation history, reports lifecycle events, and records
//! finished animations to video.

pub mod conversation;
pub mod error;
pub mod events;
pub mod export;
pub mod gate;
pub mod session;
pub mod transport;

pub use conversation::{ChatLog, ConversationHistory, LogEntry};
pub use error::{Error, Result};
pub use events::SessionEvent;
pub use export::{ExportConfig, ExportJob, ExportProgress, ExportedMedia};
pub use gate::{Gate, GatePermit};
pub use session::{GenerationSession, Messages, SessionConfig, SessionOutcome, SessionState};
pub use transport::{HttpTransport, RecordingService, Transport};
