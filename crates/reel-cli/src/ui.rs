//! Terminal rendering of session events and export progress

use std::io::{self, Write};

use reel_session::{ExportProgress, LogEntry, SessionEvent};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Writes session events as they arrive.
///
/// Code goes to `out` so it can be piped; status lines go to `err`.
pub struct EventRenderer {
    show_code: bool,
    in_code: bool,
}

impl EventRenderer {
    pub fn new(show_code: bool) -> Self {
        Self {
            show_code,
            in_code: false,
        }
    }

    pub fn render(
        &mut self,
        event: &SessionEvent,
        out: &mut impl Write,
        err: &mut impl Write,
    ) -> io::Result<()> {
        match event {
            SessionEvent::SessionStart { topic } => {
                writeln!(err, "Generating animation for \"{}\"...", topic)?;
            }
            SessionEvent::StateChanged { state } => {
                tracing::debug!("Session state: {:?}", state);
            }
            SessionEvent::Thinking => writeln!(err, "Thinking...")?,
            SessionEvent::CodeStart => {
                self.in_code = true;
                writeln!(err, "Writing code...")?;
            }
            SessionEvent::CodeDelta { segment } => {
                if self.show_code {
                    write!(out, "{}", segment)?;
                    out.flush()?;
                }
            }
            SessionEvent::CodeComplete => {
                if self.show_code && self.in_code {
                    writeln!(out)?;
                }
                self.in_code = false;
                writeln!(err, "[code generated]")?;
            }
            SessionEvent::ArtifactReady { topic, .. } => {
                writeln!(
                    err,
                    "Animation ready: {}. Use /open, /save or /export.",
                    topic
                )?;
            }
            SessionEvent::Notice { message, .. } => {
                if self.in_code && self.show_code {
                    writeln!(out)?;
                }
                self.in_code = false;
                writeln!(err, "Warning: {}", message)?;
            }
            SessionEvent::LogAppended { entry } => {
                if let LogEntry::Failure { message } = entry {
                    writeln!(out, "{}", message)?;
                }
            }
            SessionEvent::SessionEnd { .. } => {}
        }
        Ok(())
    }
}

/// Render events on a background task.
///
/// With `stop_on_end` the task finishes after the first session ends.
pub fn spawn_renderer(
    mut receiver: broadcast::Receiver<SessionEvent>,
    mut renderer: EventRenderer,
    stop_on_end: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Renderer skipped {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let result = renderer.render(&event, &mut io::stdout(), &mut io::stderr());
            if let Err(e) = result {
                tracing::debug!("Failed to render event: {}", e);
            }
            if stop_on_end && event.is_terminal() {
                break;
            }
        }
    })
}

/// One status line for export progress
pub fn progress_line(progress: &ExportProgress) -> String {
    format!(
        "Recording video... {:>3}% ({}s)",
        progress.percent, progress.elapsed_seconds
    )
}

/// Show export progress on stderr until the indicator is torn down
pub fn spawn_progress(mut receiver: watch::Receiver<Option<ExportProgress>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while receiver.changed().await.is_ok() {
            let current = *receiver.borrow_and_update();
            match current {
                Some(progress) => {
                    eprint!("\r{}", progress_line(&progress));
                    let _ = io::stderr().flush();
                }
                None => {
                    eprintln!();
                    break;
                }
            }
        }
    })
}
