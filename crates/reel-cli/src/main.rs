//! reel - generate animated algorithm explainers from the terminal

mod actions;
mod commands;
mod config;
mod transcript;
mod ui;
mod utils;

use clap::Parser;
use reel_session::{
    ConversationHistory, ExportJob, GenerationSession, HttpTransport, SessionOutcome,
};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use transcript::TranscriptManager;

/// reel - animated algorithm explainers
#[derive(Parser, Debug)]
#[command(name = "reel")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend base URL (default: http://127.0.0.1:8000)
    #[arg(long)]
    backend: Option<String>,

    /// Generate one animation for this topic and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// With --command: save the animation as <topic>.html
    #[arg(long, requires = "command")]
    save: bool,

    /// With --command: open the animation in the browser
    #[arg(long, requires = "command")]
    open: bool,

    /// With --command: record the animation to video and download it
    #[arg(long, requires = "command")]
    export: bool,

    /// Directory for saved HTML and downloaded videos
    #[arg(short, long)]
    output_dir: Option<String>,

    /// Accept documents with recoverable HTML parse errors
    #[arg(long)]
    lenient: bool,

    /// Don't echo generated code
    #[arg(short, long)]
    quiet: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Resume a previous transcript by ID
    #[arg(long)]
    resume: Option<String>,

    /// List saved transcripts
    #[arg(long)]
    transcripts: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

/// Everything the front end drives
struct App {
    session: GenerationSession,
    exporter: ExportJob,
    transport: Arc<HttpTransport>,
    transcript: Option<TranscriptManager>,
    output_dir: PathBuf,
    show_code: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("reel=debug,reel_stream=debug,reel_session=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    if args.transcripts {
        return list_transcripts();
    }

    // CLI args take precedence over the config file
    let mut cfg = config::Config::load();
    if let Some(backend) = args.backend {
        cfg.backend_url = backend;
    }
    if let Some(dir) = args.output_dir {
        cfg.output_dir = Some(dir);
    }
    if args.lenient {
        cfg.strict_validation = false;
    }

    let transport = match HttpTransport::connect(&cfg.backend_url) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            eprintln!("Error: invalid backend URL {:?}: {}", cfg.backend_url, e);
            std::process::exit(1);
        }
    };
    tracing::debug!("Using backend {}", transport.client().base_url());

    let mut session = GenerationSession::new(cfg.session_config(), transport.clone());
    let exporter = ExportJob::new(cfg.export.clone(), transport.clone());

    let transcript = match args.resume {
        Some(ref id) => match TranscriptManager::load(id) {
            Ok((manager, turns)) => {
                eprintln!("Resuming transcript {} ({} turns)", id, turns.len());
                session = session.with_history(ConversationHistory::from_turns(turns));
                Some(manager)
            }
            Err(e) => {
                eprintln!("Error loading transcript: {}", e);
                std::process::exit(1);
            }
        },
        None => TranscriptManager::new(&cfg.backend_url)
            .inspect_err(|e| tracing::warn!("Transcript disabled: {}", e))
            .ok(),
    };

    let mut app = App {
        session,
        exporter,
        transport,
        transcript,
        output_dir: cfg.output_dir(),
        show_code: !args.quiet,
    };

    if let Some(topic) = args.command {
        let after = AfterGenerate {
            save: args.save,
            open: args.open,
            export: args.export,
        };
        return run_command(&mut app, &topic, after).await;
    }

    run_interactive(&mut app).await
}

/// Actions requested on the command line for a one-shot run
struct AfterGenerate {
    save: bool,
    open: bool,
    export: bool,
}

async fn run_command(app: &mut App, topic: &str, after: AfterGenerate) -> anyhow::Result<()> {
    let outcome = match generate(app, topic).await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    if !outcome.is_success() {
        std::process::exit(1);
    }

    if after.save {
        save_last(app);
    }
    if after.open {
        open_last(app);
    }
    if after.export && !export_last(app).await {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_interactive(app: &mut App) -> anyhow::Result<()> {
    if io::stderr().is_terminal() {
        match app.transcript {
            Some(ref t) => eprintln!(
                "reel ({}) transcript: {}",
                app.transport.client().base_url(),
                &t.id()[..8]
            ),
            None => eprintln!("reel ({})", app.transport.client().base_url()),
        }
        eprintln!("Type a topic to animate, or /help.");
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(result) = commands::execute_command(input, &app.session) {
            match result {
                commands::CommandResult::New => {
                    app.session.reset();
                    println!("Started a new session.");
                }
                commands::CommandResult::Save => save_last(app),
                commands::CommandResult::Open => open_last(app),
                commands::CommandResult::Export => {
                    export_last(app).await;
                }
                commands::CommandResult::Message(msg) => println!("{}", msg),
                commands::CommandResult::Exit => break,
                commands::CommandResult::Unknown(cmd) => {
                    println!("Unknown command: /{}", cmd);
                    println!("Type /help for available commands.");
                }
            }
            println!();
            continue;
        }

        if let Err(e) = generate(app, input).await {
            eprintln!("Error: {}", e);
        }
        println!();
    }

    Ok(())
}

/// Run one generation, rendering its events and recording it in the transcript
async fn generate(app: &mut App, topic: &str) -> reel_session::Result<SessionOutcome> {
    let renderer = ui::spawn_renderer(
        app.session.subscribe(),
        ui::EventRenderer::new(app.show_code),
        true,
    );

    let before = app.session.history().len();
    let result = app.session.submit(topic).await;

    match result {
        Ok(_) => {
            if let Err(e) = renderer.await {
                tracing::debug!("Renderer task failed: {}", e);
            }
        }
        // Refused before any event was sent
        Err(_) => renderer.abort(),
    }

    if let (Some(transcript), Ok(outcome)) = (app.transcript.as_mut(), &result) {
        for turn in &app.session.history().turns()[before..] {
            if let Err(e) = transcript.append_turn(turn) {
                tracing::warn!("Failed to write transcript: {}", e);
            }
        }
        if let Some(classification) = outcome.classification() {
            if let Err(e) = transcript.append_failure(topic.trim(), classification) {
                tracing::warn!("Failed to write transcript: {}", e);
            }
        }
    }

    result
}

fn save_last(app: &App) {
    let Some((topic, artifact)) = app.session.last_artifact() else {
        println!("{}", reel_session::Error::NoArtifact);
        return;
    };
    match actions::save_artifact(artifact, topic, &app.output_dir) {
        Ok(path) => println!("Saved {}", path.display()),
        Err(e) => eprintln!("Failed to save animation: {}", e),
    }
}

fn open_last(app: &App) {
    let Some((_, artifact)) = app.session.last_artifact() else {
        println!("{}", reel_session::Error::NoArtifact);
        return;
    };
    match actions::open_artifact(artifact) {
        Ok(path) => tracing::debug!("Opened preview {}", path.display()),
        Err(e) => eprintln!("Failed to open animation: {}", e),
    }
}

/// Record the last animation and download the video. Returns false on failure.
async fn export_last(app: &App) -> bool {
    let Some((_, artifact)) = app.session.last_artifact() else {
        println!("{}", reel_session::Error::NoArtifact);
        return false;
    };

    let progress = ui::spawn_progress(app.exporter.progress());
    let media = match app.exporter.run(artifact).await {
        Ok(media) => media,
        Err(reel_session::Error::Busy) => {
            progress.abort();
            println!("An export is already in progress.");
            return false;
        }
        Err(e) => {
            // Let the indicator tear down before printing
            let _ = progress.await;
            eprintln!("Export failed: {}", e);
            return false;
        }
    };
    let _ = progress.await;

    match actions::download_media(app.transport.client(), &media, &app.output_dir).await {
        Ok(path) => {
            println!("Video saved to {}", path.display());
            println!("Preview: {}", media.preview_url);
            true
        }
        Err(e) => {
            eprintln!("Download failed: {}", e);
            println!("Video is still available at {}", media.download_url);
            false
        }
    }
}

fn list_transcripts() -> anyhow::Result<()> {
    match TranscriptManager::list() {
        Ok(transcripts) => {
            if transcripts.is_empty() {
                println!("No saved transcripts found.");
                println!(
                    "Transcripts are stored in: {}",
                    TranscriptManager::transcripts_dir().display()
                );
            } else {
                println!("Saved transcripts:\n");
                println!(
                    "{:<38} {:<20} {:<7} {:<9} Backend",
                    "ID", "Created", "Turns", "Failures"
                );
                println!("{}", "-".repeat(90));
                for t in transcripts {
                    println!(
                        "{:<38} {:<20} {:<7} {:<9} {}",
                        t.id,
                        t.created_at_display(),
                        t.turn_count,
                        t.failure_count,
                        t.backend_url
                    );
                }
                println!("\nResume with: reel --resume <transcript-id>");
            }
        }
        Err(e) => {
            eprintln!("Error listing transcripts: {}", e);
        }
    }
    Ok(())
}
