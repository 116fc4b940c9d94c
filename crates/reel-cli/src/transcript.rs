//! Transcript persistence: one JSONL file per CLI session

use reel_stream::{ConversationTurn, ErrorClassification};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Transcript entry types for JSONL format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptEntry {
    /// Transcript metadata
    Metadata {
        id: String,
        created_at: i64,
        backend_url: String,
        working_dir: String,
    },
    /// A turn of the conversation history
    Turn {
        turn: ConversationTurn,
        timestamp: i64,
    },
    /// A failed generation
    Failure {
        topic: String,
        classification: ErrorClassification,
        timestamp: i64,
    },
}

/// Appends the history of one CLI session to disk
pub struct TranscriptManager {
    id: String,
    writer: BufWriter<File>,
}

impl TranscriptManager {
    /// Get the transcripts directory
    pub fn transcripts_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("reel")
            .join("transcripts")
    }

    /// Create a new transcript
    pub fn new(backend_url: &str) -> std::io::Result<Self> {
        Self::create_in(&Self::transcripts_dir(), backend_url)
    }

    /// Create a new transcript in `dir`
    pub fn create_in(dir: &Path, backend_url: &str) -> std::io::Result<Self> {
        let id = uuid::Uuid::new_v4().to_string();
        fs::create_dir_all(dir)?;

        let file = File::create(dir.join(format!("{}.jsonl", id)))?;
        let mut manager = Self {
            id: id.clone(),
            writer: BufWriter::new(file),
        };

        manager.append(&TranscriptEntry::Metadata {
            id,
            created_at: chrono::Utc::now().timestamp_millis(),
            backend_url: backend_url.to_string(),
            working_dir: std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| ".".to_string()),
        })?;

        Ok(manager)
    }

    /// Load an existing transcript and reopen it for appending
    pub fn load(id: &str) -> std::io::Result<(Self, Vec<ConversationTurn>)> {
        Self::load_from(&Self::transcripts_dir(), id)
    }

    /// Load transcript `id` from `dir`
    pub fn load_from(dir: &Path, id: &str) -> std::io::Result<(Self, Vec<ConversationTurn>)> {
        let path = dir.join(format!("{}.jsonl", id));
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Transcript not found: {}", id),
            ));
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut turns = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            if let Ok(TranscriptEntry::Turn { turn, .. }) = serde_json::from_str(&line) {
                turns.push(turn);
            }
        }

        let file = File::options().append(true).open(&path)?;
        Ok((
            Self {
                id: id.to_string(),
                writer: BufWriter::new(file),
            },
            turns,
        ))
    }

    /// Get transcript ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append a history turn
    pub fn append_turn(&mut self, turn: &ConversationTurn) -> std::io::Result<()> {
        self.append(&TranscriptEntry::Turn {
            turn: turn.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Append a failed generation
    pub fn append_failure(
        &mut self,
        topic: &str,
        classification: ErrorClassification,
    ) -> std::io::Result<()> {
        self.append(&TranscriptEntry::Failure {
            topic: topic.to_string(),
            classification,
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }

    fn append(&mut self, entry: &TranscriptEntry) -> std::io::Result<()> {
        writeln!(self.writer, "{}", serde_json::to_string(entry)?)?;
        self.writer.flush()
    }

    /// List all transcripts
    pub fn list() -> std::io::Result<Vec<TranscriptInfo>> {
        Self::list_in(&Self::transcripts_dir())
    }

    /// List transcripts in `dir`, newest first
    pub fn list_in(dir: &Path) -> std::io::Result<Vec<TranscriptInfo>> {
        if !dir.exists() {
            return Ok(vec![]);
        }

        let mut transcripts = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("jsonl") {
                if let Some(info) = read_transcript_info(&path) {
                    transcripts.push(info);
                }
            }
        }

        transcripts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(transcripts)
    }
}

fn read_transcript_info(path: &Path) -> Option<TranscriptInfo> {
    let reader = BufReader::new(File::open(path).ok()?);
    let mut lines = reader.lines().map_while(Result::ok);

    let TranscriptEntry::Metadata {
        id,
        created_at,
        backend_url,
        ..
    } = serde_json::from_str::<TranscriptEntry>(&lines.next()?).ok()?
    else {
        return None;
    };

    let mut turn_count = 0;
    let mut failure_count = 0;
    for line in lines {
        match serde_json::from_str::<TranscriptEntry>(&line) {
            Ok(TranscriptEntry::Turn { .. }) => turn_count += 1,
            Ok(TranscriptEntry::Failure { .. }) => failure_count += 1,
            _ => {}
        }
    }

    Some(TranscriptInfo {
        id,
        created_at,
        backend_url,
        turn_count,
        failure_count,
    })
}

/// Information about a saved transcript
#[derive(Debug, Clone)]
pub struct TranscriptInfo {
    pub id: String,
    pub created_at: i64,
    pub backend_url: String,
    pub turn_count: usize,
    pub failure_count: usize,
}

impl TranscriptInfo {
    /// Format the created_at timestamp for display
    pub fn created_at_display(&self) -> String {
        use chrono::{TimeZone, Utc};
        Utc.timestamp_millis_opt(self.created_at)
            .single()
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("reel-transcripts-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_resume_restores_turns_in_order() {
        let dir = temp_dir();
        let mut transcript = TranscriptManager::create_in(&dir, "http://127.0.0.1:8000").unwrap();
        transcript
            .append_turn(&ConversationTurn::user("Bubble Sort"))
            .unwrap();
        transcript
            .append_turn(&ConversationTurn::assistant("<html><body>OK</body></html>"))
            .unwrap();
        transcript
            .append_failure("Quick Sort", ErrorClassification::RateLimited)
            .unwrap();
        let id = transcript.id().to_string();
        drop(transcript);

        let (mut resumed, turns) = TranscriptManager::load_from(&dir, &id).unwrap();
        assert_eq!(
            turns,
            vec![
                ConversationTurn::user("Bubble Sort"),
                ConversationTurn::assistant("<html><body>OK</body></html>"),
            ]
        );
        resumed.append_turn(&ConversationTurn::user("again")).unwrap();
        drop(resumed);

        let (_, turns) = TranscriptManager::load_from(&dir, &id).unwrap();
        assert_eq!(turns.len(), 3);

        let listed = TranscriptManager::list_in(&dir).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].turn_count, 3);
        assert_eq!(listed[0].failure_count, 1);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_transcript() {
        let dir = temp_dir();
        let err = TranscriptManager::load_from(&dir, "nope").err().unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
        assert!(TranscriptManager::list_in(&dir).unwrap().is_empty());
    }
}
