//! Slash commands for interactive mode

mod history;

pub use history::HistoryCommand;

use reel_session::GenerationSession;

/// Result of executing a slash command
#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    /// Start a new session: discard history and log
    New,
    /// Save the last animation as HTML
    Save,
    /// Open the last animation in the browser
    Open,
    /// Record the last animation to video
    Export,
    /// Show a message to the user
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(input: &str, session: &GenerationSession) -> Option<CommandResult> {
    let input = input.trim();
    let command = input.strip_prefix('/')?;

    let mut parts = command.splitn(2, ' ');
    let name = parts.next().unwrap_or("").to_lowercase();
    let args = parts.next().map(str::trim).unwrap_or("");

    Some(match name.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "new" | "n" | "clear" => CommandResult::New,

        "save" | "s" => CommandResult::Save,

        "open" | "o" => CommandResult::Open,

        "export" | "e" | "record" => CommandResult::Export,

        "history" | "log" => HistoryCommand::execute(args, session),

        "quit" | "exit" | "q" => CommandResult::Exit,

        _ => CommandResult::Unknown(name),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?        Show this help message
  /new, /n             Start a new session (clears history)
  /open, /o            Open the last animation in the browser
  /save, /s            Save the last animation as <topic>.html
  /export, /e          Record the last animation to MP4 and download it
  /history [full]      Show the conversation log
  /quit, /exit, /q     Exit reel

Anything else is sent as a topic, e.g.:
  Bubble Sort
  make the bars blue"#
        .to_string()
}
