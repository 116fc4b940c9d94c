//! Generation session state machine and execution

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reel_stream::{
    Artifact, ArtifactValidator, ConversationTurn, ErrorClassification, FenceScanner,
    GenerateRequest, StreamEvent, fence::DEFAULT_FENCE_TAGS,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{
    conversation::{ChatLog, ConversationHistory, LogEntry},
    error::{Error, Result},
    events::SessionEvent,
    gate::Gate,
    transport::Transport,
};

/// Where a session is in its request/response cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Sending,
    Streaming,
    Completing,
    Failed,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed { artifact: Artifact },
    Failed { classification: ErrorClassification },
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SessionOutcome::Completed { .. })
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            SessionOutcome::Completed { artifact } => Some(artifact),
            SessionOutcome::Failed { .. } => None,
        }
    }

    pub fn classification(&self) -> Option<ErrorClassification> {
        match self {
            SessionOutcome::Completed { .. } => None,
            SessionOutcome::Failed { classification } => Some(*classification),
        }
    }
}

/// User-facing failure text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    pub network_unavailable: String,
    pub rate_limited: String,
    pub malformed_artifact: String,
    pub unknown: String,
    /// Durable log entry written for every failure
    pub failure_log: String,
}

impl Default for Messages {
    fn default() -> Self {
        let unavailable = "LLM service is unavailable. Please try again later.".to_string();
        Self {
            network_unavailable: unavailable.clone(),
            rate_limited: "Too many requests today. Please try again tomorrow.".to_string(),
            malformed_artifact:
                "Failed to parse the returned animation code. Please adjust your prompt and try again."
                    .to_string(),
            unknown: unavailable,
            failure_log: "Sorry, something went wrong. Please try again later.".to_string(),
        }
    }
}

impl Messages {
    /// Transient notice text for a classification
    pub fn notice(&self, classification: ErrorClassification) -> &str {
        match classification {
            ErrorClassification::NetworkUnavailable => &self.network_unavailable,
            ErrorClassification::RateLimited => &self.rate_limited,
            ErrorClassification::MalformedArtifact => &self.malformed_artifact,
            ErrorClassification::Unknown => &self.unknown,
        }
    }
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Reject documents with any parse error
    pub strict_validation: bool,
    /// Language tags stripped after an opening fence
    pub fence_tags: Vec<String>,
    /// How long transient notices stay visible
    pub notice_duration: Duration,
    pub messages: Messages,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            strict_validation: true,
            fence_tags: DEFAULT_FENCE_TAGS.iter().map(|t| t.to_string()).collect(),
            notice_duration: Duration::from_secs(10),
            messages: Messages::default(),
        }
    }
}

/// Text accumulated from the code region of one response
#[derive(Debug, Default)]
struct PendingArtifact {
    text: String,
    /// Set once the text has been appended to the history
    recorded: bool,
}

/// Drives one request/response cycle at a time.
///
/// Every failure is caught here and turned into a single
/// [`ErrorClassification`]; callers only see submission errors.
pub struct GenerationSession {
    config: SessionConfig,
    validator: ArtifactValidator,
    history: ConversationHistory,
    log: ChatLog,
    transport: Arc<dyn Transport>,
    event_tx: broadcast::Sender<SessionEvent>,
    gate: Gate,
    state: SessionState,
}

impl GenerationSession {
    /// Create a new session
    pub fn new(config: SessionConfig, transport: Arc<dyn Transport>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            validator: ArtifactValidator::with_strict(config.strict_validation),
            config,
            history: ConversationHistory::new(),
            log: ChatLog::default(),
            transport,
            event_tx,
            gate: Gate::new(),
            state: SessionState::Idle,
        }
    }

    /// Continue from a restored history
    pub fn with_history(mut self, history: ConversationHistory) -> Self {
        self.history = history;
        self
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn log(&self) -> &ChatLog {
        &self.log
    }

    /// The submission control. Held while a request is in flight.
    pub fn gate(&self) -> Gate {
        self.gate.clone()
    }

    /// Most recent validated artifact and its topic
    pub fn last_artifact(&self) -> Option<(&str, &Artifact)> {
        self.log.last_artifact()
    }

    /// Start a new session: discard the history and the log
    pub fn reset(&mut self) {
        self.history.clear();
        self.log.clear();
        self.set_state(SessionState::Idle);
    }

    /// Submit a topic and run the session to its end.
    ///
    /// Returns `Err` only when the submission itself is refused; generation
    /// failures are reported as [`SessionOutcome::Failed`].
    pub async fn submit(&mut self, topic: &str) -> Result<SessionOutcome> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(Error::EmptyTopic);
        }
        let permit = self.gate.try_acquire().ok_or(Error::Busy)?;

        tracing::info!("Starting generation for {:?}", topic);
        let _ = self.event_tx.send(SessionEvent::SessionStart {
            topic: topic.to_string(),
        });
        self.set_state(SessionState::Sending);
        self.history.push(ConversationTurn::user(topic));
        self.append_log(LogEntry::User {
            content: topic.to_string(),
        });

        let request = GenerateRequest {
            topic: topic.to_string(),
            history: self.history.turns().to_vec(),
        };

        let outcome = match self.run(request).await {
            Ok(artifact) => {
                tracing::info!("Generation completed ({} bytes)", artifact.as_str().len());
                self.append_log(LogEntry::Artifact {
                    topic: topic.to_string(),
                    artifact: artifact.clone(),
                });
                let _ = self.event_tx.send(SessionEvent::ArtifactReady {
                    topic: topic.to_string(),
                    artifact: artifact.clone(),
                });
                SessionOutcome::Completed { artifact }
            }
            Err(e) => self.fail(e),
        };

        self.set_state(SessionState::Idle);
        permit.release();
        let _ = self.event_tx.send(SessionEvent::SessionEnd {
            outcome: outcome.clone(),
        });
        Ok(outcome)
    }

    async fn run(&mut self, request: GenerateRequest) -> reel_stream::Result<Artifact> {
        let mut events = self.transport.generate(request).await?;

        self.set_state(SessionState::Streaming);
        let _ = self.event_tx.send(SessionEvent::Thinking);

        let mut scanner = FenceScanner::new(self.config.fence_tags.iter().cloned());
        let mut pending = PendingArtifact::default();
        let mut blocks = 0usize;

        while let Some(event) = events.next().await {
            blocks += 1;
            match event {
                StreamEvent::Token { content } => {
                    let was_open = scanner.has_opened();
                    let segment = scanner.feed(&content);
                    if !was_open && scanner.has_opened() {
                        let _ = self.event_tx.send(SessionEvent::CodeStart);
                    }
                    if let Some(segment) = segment {
                        pending.text.push_str(segment);
                        let _ = self.event_tx.send(SessionEvent::CodeDelta {
                            segment: segment.to_string(),
                        });
                    }
                }
                StreamEvent::Error { message, hint } => {
                    return Err(reel_stream::Error::stream(message, hint));
                }
                StreamEvent::Done => {
                    tracing::debug!("Stream finished after {} events", blocks);
                    if !scanner.has_opened() {
                        return Err(reel_stream::Error::NoCodeRegion);
                    }
                    self.set_state(SessionState::Completing);
                    let artifact = self.complete(&mut pending)?;
                    let _ = self.event_tx.send(SessionEvent::CodeComplete);
                    return Ok(artifact);
                }
            }
        }

        Err(reel_stream::Error::Incomplete)
    }

    /// Record the finished text in the history, then validate it.
    ///
    /// Safe to call more than once for the same text.
    fn complete(&mut self, pending: &mut PendingArtifact) -> reel_stream::Result<Artifact> {
        if !pending.recorded {
            self.history
                .push(ConversationTurn::assistant(pending.text.clone()));
            pending.recorded = true;
        }
        Ok(self.validator.validate(pending.text.clone())?)
    }

    fn fail(&mut self, error: reel_stream::Error) -> SessionOutcome {
        let classification = error.classification();
        tracing::warn!("Generation failed ({}): {}", classification, error);
        self.set_state(SessionState::Failed);

        let _ = self.event_tx.send(SessionEvent::Notice {
            classification,
            message: self.config.messages.notice(classification).to_string(),
            dismiss_after: self.config.notice_duration,
        });
        self.append_log(LogEntry::Failure {
            message: self.config.messages.failure_log.clone(),
        });

        SessionOutcome::Failed { classification }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::debug!("Session state {:?} -> {:?}", self.state, state);
            self.state = state;
            let _ = self.event_tx.send(SessionEvent::StateChanged { state });
        }
    }

    fn append_log(&mut self, entry: LogEntry) {
        self.log.push(entry.clone());
        let _ = self.event_tx.send(SessionEvent::LogAppended { entry });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reel_stream::{Role, StreamEventStream};

    enum Reply {
        Events(Vec<StreamEvent>),
        Stream(StreamEventStream),
        Status(u16),
    }

    /// A mock transport that replays canned replies in order.
    struct MockTransport {
        replies: Mutex<Vec<Reply>>,
        requests: Mutex<Vec<GenerateRequest>>,
    }

    impl MockTransport {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                requests: Mutex::new(vec![]),
            })
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn generate(&self, request: GenerateRequest) -> reel_stream::Result<StreamEventStream> {
            self.requests.lock().push(request);
            let reply = {
                let mut replies = self.replies.lock();
                if replies.is_empty() {
                    Reply::Events(vec![StreamEvent::Done])
                } else {
                    replies.remove(0)
                }
            };
            match reply {
                Reply::Events(events) => Ok(Box::pin(futures::stream::iter(events))),
                Reply::Stream(stream) => Ok(stream),
                Reply::Status(status) => Err(reel_stream::Error::status(status, "")),
            }
        }
    }

    fn tokens(tokens: &[&str]) -> Reply {
        let mut events: Vec<StreamEvent> = tokens.iter().map(|t| StreamEvent::token(*t)).collect();
        events.push(StreamEvent::Done);
        Reply::Events(events)
    }

    fn make_test_session(replies: Vec<Reply>) -> (GenerationSession, Arc<MockTransport>) {
        let transport = MockTransport::new(replies);
        let session = GenerationSession::new(SessionConfig::default(), transport.clone());
        (session, transport)
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = vec![];
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    const DOC: &str = "<html><body>OK</body></html>";

    #[tokio::test]
    async fn test_bubble_sort_end_to_end() {
        let (mut session, transport) =
            make_test_session(vec![tokens(&["Sure, ```html\n", DOC, "```"])]);

        let outcome = session.submit("Bubble Sort").await.unwrap();
        assert_eq!(outcome.artifact().map(|a| a.as_str()), Some(DOC));

        let turns = session.history().turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], ConversationTurn::user("Bubble Sort"));
        assert_eq!(turns[1], ConversationTurn::assistant(DOC));

        let requests = transport.requests.lock();
        assert_eq!(requests[0].topic, "Bubble Sort");
        assert_eq!(requests[0].history, vec![ConversationTurn::user("Bubble Sort")]);

        assert_eq!(session.last_artifact().map(|(t, a)| (t, a.as_str())), Some(("Bubble Sort", DOC)));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_event_sequence() {
        let (mut session, _) = make_test_session(vec![tokens(&["Sure, ```html\n", DOC, "```"])]);
        let mut rx = session.subscribe();
        session.submit("Bubble Sort").await.unwrap();
        let events = drain(&mut rx);

        assert!(matches!(events.first(), Some(SessionEvent::SessionStart { .. })));
        assert!(events.last().is_some_and(|e| e.is_terminal()));

        let code: String = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::CodeDelta { segment } => Some(segment.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(code, DOC);

        let states: Vec<SessionState> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::StateChanged { state } => Some(*state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                SessionState::Sending,
                SessionState::Streaming,
                SessionState::Completing,
                SessionState::Idle
            ]
        );
        assert!(events.iter().any(|e| matches!(e, SessionEvent::CodeStart)));
        let complete = events
            .iter()
            .position(|e| matches!(e, SessionEvent::CodeComplete))
            .expect("code marked complete");
        let ready = events
            .iter()
            .position(|e| matches!(e, SessionEvent::ArtifactReady { .. }))
            .expect("artifact ready");
        assert!(complete < ready);
    }

    #[tokio::test]
    async fn test_done_without_tokens_is_malformed() {
        let (mut session, _) = make_test_session(vec![Reply::Events(vec![StreamEvent::Done])]);
        let mut rx = session.subscribe();

        let outcome = session.submit("Quick Sort").await.unwrap();
        assert_eq!(
            outcome.classification(),
            Some(ErrorClassification::MalformedArtifact)
        );
        assert!(session.last_artifact().is_none());

        let events = drain(&mut rx);
        let notice = events.iter().find_map(|e| match e {
            SessionEvent::Notice { message, .. } => Some(message.clone()),
            _ => None,
        });
        assert_eq!(notice.as_deref(), Some(Messages::default().malformed_artifact.as_str()));
    }

    #[tokio::test]
    async fn test_rate_limit_classification() {
        let (mut session, _) = make_test_session(vec![Reply::Status(429), Reply::Status(503)]);

        let outcome = session.submit("a").await.unwrap();
        assert_eq!(outcome.classification(), Some(ErrorClassification::RateLimited));

        let outcome = session.submit("b").await.unwrap();
        assert_eq!(
            outcome.classification(),
            Some(ErrorClassification::NetworkUnavailable)
        );
    }

    #[tokio::test]
    async fn test_server_error_event_is_malformed() {
        let (mut session, _) = make_test_session(vec![Reply::Events(vec![
            StreamEvent::token("```html\n<html>"),
            StreamEvent::Error {
                message: "model overloaded".into(),
                hint: ErrorClassification::MalformedArtifact,
            },
        ])]);
        let outcome = session.submit("a").await.unwrap();
        assert_eq!(
            outcome.classification(),
            Some(ErrorClassification::MalformedArtifact)
        );
        // Never reached completion, so only the user turn was recorded.
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_stream_exhaustion_is_unknown() {
        let (mut session, _) = make_test_session(vec![Reply::Events(vec![
            StreamEvent::token("```html\n"),
            StreamEvent::token(DOC),
        ])]);
        let outcome = session.submit("a").await.unwrap();
        assert_eq!(outcome.classification(), Some(ErrorClassification::Unknown));
    }

    #[tokio::test]
    async fn test_rejected_document_still_recorded_in_history() {
        let (mut session, _) =
            make_test_session(vec![tokens(&["```html\n", "<html><body> </body></html>", "```"])]);
        let mut rx = session.subscribe();
        let outcome = session.submit("a").await.unwrap();
        assert_eq!(
            outcome.classification(),
            Some(ErrorClassification::MalformedArtifact)
        );
        let turns = session.history().turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].role, Role::Assistant);

        // A rejected document is never marked as finished code
        let events = drain(&mut rx);
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::CodeComplete)));
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Notice { .. })));
    }

    #[tokio::test]
    async fn test_failure_leaves_durable_log_entry() {
        let (mut session, _) = make_test_session(vec![Reply::Status(500)]);
        session.submit("a").await.unwrap();

        let entries = session.log().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0],
            LogEntry::User {
                content: "a".into()
            }
        );
        assert_eq!(
            entries[1],
            LogEntry::Failure {
                message: Messages::default().failure_log
            }
        );
    }

    #[test]
    fn test_completion_is_idempotent() {
        let (mut session, _) = make_test_session(vec![]);
        let mut pending = PendingArtifact {
            text: DOC.to_string(),
            recorded: false,
        };

        let first = session.complete(&mut pending).unwrap();
        let second = session.complete(&mut pending).unwrap();
        assert_eq!(first, second);
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_gate_held_while_streaming_and_released_after() {
        let (mut session, _) = make_test_session(vec![]);
        let gate = session.gate();
        let observer = gate.clone();
        let stream: StreamEventStream = Box::pin(async_stream::stream! {
            yield StreamEvent::token("```html\n");
            let state = if observer.is_held() { "held" } else { "free" };
            yield StreamEvent::token(format!("<html><body>{}</body></html>", state));
            yield StreamEvent::token("```");
            yield StreamEvent::Done;
        });
        let transport = MockTransport::new(vec![Reply::Stream(stream), Reply::Status(429)]);
        session.transport = transport as Arc<dyn Transport>;

        let outcome = session.submit("a").await.unwrap();
        assert_eq!(
            outcome.artifact().map(|a| a.as_str()),
            Some("<html><body>held</body></html>")
        );
        assert!(!gate.is_held());

        session.submit("b").await.unwrap();
        assert!(!gate.is_held());
    }

    #[tokio::test]
    async fn test_busy_gate_refuses_submission() {
        let (mut session, transport) = make_test_session(vec![]);
        let permit = session.gate().try_acquire().unwrap();

        assert!(matches!(session.submit("a").await, Err(Error::Busy)));
        assert!(transport.requests.lock().is_empty());

        drop(permit);
        assert!(session.submit("a").await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_topic_never_takes_gate() {
        let (mut session, transport) = make_test_session(vec![]);
        assert!(matches!(session.submit("   ").await, Err(Error::EmptyTopic)));
        assert!(!session.gate().is_held());
        assert!(session.history().is_empty());
        assert!(transport.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_history_carried_across_turns() {
        let (mut session, transport) = make_test_session(vec![
            tokens(&["```html\n", DOC, "```"]),
            tokens(&["```html\n", DOC, "```"]),
        ]);
        session.submit("Bubble Sort").await.unwrap();
        session.submit("make it slower").await.unwrap();

        let requests = transport.requests.lock();
        assert_eq!(requests[1].history.len(), 3);
        assert_eq!(requests[1].history[2], ConversationTurn::user("make it slower"));
        assert_eq!(session.history().len(), 4);
    }

    #[tokio::test]
    async fn test_reset_discards_history_and_log() {
        let (mut session, _) = make_test_session(vec![tokens(&["```html\n", DOC, "```"])]);
        session.submit("a").await.unwrap();
        session.reset();
        assert!(session.history().is_empty());
        assert!(session.log().is_empty());
        assert!(session.last_artifact().is_none());
    }

    #[tokio::test]
    async fn test_resume_from_history() {
        let transport = MockTransport::new(vec![]);
        let history = ConversationHistory::from_turns(vec![
            ConversationTurn::user("old"),
            ConversationTurn::assistant(DOC),
        ]);
        let mut session =
            GenerationSession::new(SessionConfig::default(), transport.clone()).with_history(history);
        session.submit("new").await.unwrap();
        assert_eq!(transport.requests.lock()[0].history.len(), 3);
    }

    #[test]
    fn test_unknown_uses_network_notice() {
        let messages = Messages::default();
        assert_eq!(
            messages.notice(ErrorClassification::Unknown),
            messages.notice(ErrorClassification::NetworkUnavailable)
        );
        assert_ne!(
            messages.notice(ErrorClassification::RateLimited),
            messages.notice(ErrorClassification::NetworkUnavailable)
        );
    }
}
