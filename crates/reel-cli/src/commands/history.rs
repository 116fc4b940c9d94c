//! /history command - show the conversation log

use super::CommandResult;
use crate::utils::truncate_chars;
use reel_session::{GenerationSession, LogEntry};

pub struct HistoryCommand;

impl HistoryCommand {
    pub fn execute(args: &str, session: &GenerationSession) -> CommandResult {
        CommandResult::Message(Self::render(session, args == "full"))
    }

    fn render(session: &GenerationSession, full: bool) -> String {
        let log = session.log();
        if log.is_empty() {
            return "No messages yet. Type a topic to generate an animation.".to_string();
        }

        let mut output = String::from("Conversation\n");
        output.push_str(&"-".repeat(40));
        output.push('\n');

        for (index, entry) in log.entries().iter().enumerate() {
            let line = match entry {
                LogEntry::User { content } => format!("you:   {}", content),
                LogEntry::Artifact { topic, artifact } => {
                    let body = if full {
                        artifact.as_str().to_string()
                    } else {
                        truncate_chars(&artifact.as_str().replace('\n', " "), 60)
                    };
                    format!("reel:  [{}] {}", topic, body)
                }
                LogEntry::Failure { message } => format!("reel:  {}", message),
            };
            output.push_str(&format!("{:>3}  {}\n", index + 1, line));
        }

        output.push('\n');
        output.push_str(&format!(
            "History sent to backend: {} turns",
            session.history().len()
        ));
        output
    }
}
