//! Configuration file support

use reel_session::{ExportConfig, Messages, SessionConfig};
use reel_stream::DEFAULT_BACKEND_URL;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for reel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the generation and recording backend
    pub backend_url: String,
    /// Where saved HTML and downloaded videos go (default: current directory)
    pub output_dir: Option<String>,
    /// Reject documents with recoverable parse errors
    pub strict_validation: bool,
    /// Language tags stripped after an opening fence
    pub fence_tags: Vec<String>,
    /// How long failure notices stay visible
    pub notice_seconds: u64,
    /// Recording parameters
    pub export: ExportConfig,
    /// Failure messages
    pub messages: Messages,
}

impl Default for Config {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            output_dir: None,
            strict_validation: session.strict_validation,
            fence_tags: session.fence_tags,
            notice_seconds: session.notice_duration.as_secs(),
            export: ExportConfig::default(),
            messages: session.messages,
        }
    }
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("reel")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("REEL_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse config from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        Self::default().save()?;
        Ok(path)
    }

    /// Directory for saved artifacts and downloads
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Session settings derived from this config
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            strict_validation: self.strict_validation,
            fence_tags: self.fence_tags.clone(),
            notice_duration: Duration::from_secs(self.notice_seconds),
            messages: self.messages.clone(),
        }
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# reel configuration file
# Place at ~/.config/reel/config.toml (Linux), ~/Library/Application Support/reel/config.toml (Mac)
# or %APPDATA%\reel\config.toml (Windows). REEL_CONFIG_PATH overrides the location.

# Generation and recording backend
backend_url = "http://127.0.0.1:8000"

# Where /save and /export write files (default: current directory)
# output_dir = "~/Videos/reel"

# Reject generated documents with any HTML parse error
strict_validation = true

# Language tags stripped from the line that opens a code fence
fence_tags = ["html"]

# Seconds a failure notice stays on screen
notice_seconds = 10

[export]
width = 1280
height = 720
fps = 24
wait_until = "networkidle"
timeout_ms = 180000
end_event = "recording:finished"
end_timeout_ms = 180000
mp4 = true
headless = true
# Seconds after which the progress estimate reaches 95%
estimate_seconds = 30
# Delay before the progress indicator is removed
teardown_ms = 1500

# Failure messages (optional)
# [messages]
# network_unavailable = "LLM service is unavailable. Please try again later."
# rate_limited = "Too many requests today. Please try again tomorrow."
"#
}
