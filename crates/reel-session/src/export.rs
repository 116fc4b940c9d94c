//! Recording a validated artifact to video.
//!
//! The backend gives no progress while it records, so the job shows an
//! estimate driven by a local timer and only reports 100% once the backend
//! has answered with a media locator.

use std::sync::Arc;
use std::time::Duration;

use reel_stream::{Artifact, RecordRequest, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    gate::{Gate, GatePermit},
    transport::RecordingService,
};

/// File name used when the locator has no usable last segment
pub const DEFAULT_MEDIA_NAME: &str = "animation.mp4";

/// Recording parameters and progress estimator timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Page load condition passed to the recorder
    pub wait_until: String,
    /// Maximum page load wait
    pub timeout_ms: u64,
    /// Event the document dispatches when its animation has finished
    pub end_event: String,
    /// Maximum wait for `end_event`
    pub end_timeout_ms: u64,
    pub mp4: bool,
    pub headless: bool,
    /// Elapsed time at which the estimate reaches its cap
    pub estimate_seconds: u64,
    /// Delay before the progress indicator is torn down
    pub teardown_ms: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 24,
            wait_until: "networkidle".to_string(),
            timeout_ms: 180_000,
            end_event: "recording:finished".to_string(),
            end_timeout_ms: 180_000,
            mp4: true,
            headless: true,
            estimate_seconds: 30,
            teardown_ms: 1500,
        }
    }
}

impl ExportConfig {
    /// Build the recording request for an artifact
    pub fn request(&self, artifact: &Artifact) -> RecordRequest {
        RecordRequest {
            html_text: artifact.as_str().to_string(),
            width: self.width,
            height: self.height,
            fps: self.fps,
            wait_until: self.wait_until.clone(),
            timeout: self.timeout_ms,
            end_event: self.end_event.clone(),
            end_timeout: self.end_timeout_ms,
            mp4: self.mp4,
            headless: self.headless,
        }
    }
}

/// Estimated export progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportProgress {
    pub elapsed_seconds: u64,
    /// At most [`ExportProgress::CAP`] until the backend confirms success
    pub percent: u8,
}

impl ExportProgress {
    /// Highest percentage shown before the backend answers
    pub const CAP: u8 = 95;

    /// `min(95, floor(elapsed / estimate * 95))`
    pub fn estimate(elapsed_seconds: u64, estimate_seconds: u64) -> Self {
        let cap = u64::from(Self::CAP);
        let percent = if estimate_seconds == 0 {
            cap
        } else {
            (elapsed_seconds.saturating_mul(cap) / estimate_seconds).min(cap)
        };
        Self {
            elapsed_seconds,
            percent: percent as u8,
        }
    }

    /// Confirmed success
    pub fn complete(elapsed_seconds: u64) -> Self {
        Self {
            elapsed_seconds,
            percent: 100,
        }
    }
}

/// Result of a successful export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedMedia {
    /// Cache-busted absolute media URL
    pub download_url: Url,
    /// Suggested file name for the download
    pub file_name: String,
    /// Inline preview source; only produced on success
    pub preview_url: Url,
}

/// Submits recording jobs, one at a time.
///
/// Progress is published on a watch channel: `Some` while the indicator is
/// visible, `None` once it has been torn down.
pub struct ExportJob {
    service: Arc<dyn RecordingService>,
    config: ExportConfig,
    gate: Gate,
    progress_tx: watch::Sender<Option<ExportProgress>>,
}

impl ExportJob {
    pub fn new(config: ExportConfig, service: Arc<dyn RecordingService>) -> Self {
        let (progress_tx, _) = watch::channel(None);
        Self {
            service,
            config,
            gate: Gate::new(),
            progress_tx,
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// The export trigger. Held from submission until teardown.
    pub fn gate(&self) -> Gate {
        self.gate.clone()
    }

    /// Watch progress updates
    pub fn progress(&self) -> watch::Receiver<Option<ExportProgress>> {
        self.progress_tx.subscribe()
    }

    /// Record `artifact` and resolve its download locator.
    ///
    /// Failures are returned to the caller and never touch the generation
    /// session. Whatever the outcome, the indicator is torn down and the
    /// trigger released after the configured teardown delay.
    pub async fn run(&self, artifact: &Artifact) -> Result<ExportedMedia> {
        let permit = self.gate.try_acquire().ok_or(Error::Busy)?;
        // Dropped last, also when this future is abandoned or unwinds
        let _teardown = Teardown {
            permit: Some(permit),
            progress_tx: self.progress_tx.clone(),
            delay: Duration::from_millis(self.config.teardown_ms),
        };
        let started = Instant::now();
        self.progress_tx.send_replace(Some(ExportProgress::default()));

        let cancel = CancellationToken::new();
        let ticker = tokio::spawn(tick_progress(
            self.progress_tx.clone(),
            cancel.clone(),
            self.config.estimate_seconds,
        ));
        let stop_ticker = cancel.drop_guard();

        tracing::info!(
            "Starting export ({}x{} @ {} fps)",
            self.config.width,
            self.config.height,
            self.config.fps
        );
        let result = self.record(artifact).await;

        drop(stop_ticker);
        if let Err(e) = ticker.await {
            tracing::debug!("Progress ticker ended abnormally: {}", e);
        }

        match &result {
            Ok(media) => {
                tracing::info!("Export finished: {}", media.download_url);
                self.progress_tx
                    .send_replace(Some(ExportProgress::complete(started.elapsed().as_secs())));
            }
            Err(e) => tracing::warn!("Export failed: {}", e),
        }

        result
    }

    async fn record(&self, artifact: &Artifact) -> Result<ExportedMedia> {
        let response = self.service.record(self.config.request(artifact)).await?;
        let locator = response
            .media_locator()
            .ok_or(reel_stream::Error::MissingMediaLocator)?;

        let url = self.service.resolve(locator)?;
        let file_name = media_file_name(&url);
        let busted = cache_bust(url, chrono::Utc::now().timestamp_millis());

        Ok(ExportedMedia {
            download_url: busted.clone(),
            file_name,
            preview_url: busted,
        })
    }
}

/// Clears the indicator and releases the trigger after a delay.
///
/// Runs from `Drop`, so every exit from [`ExportJob::run`] reaches it.
struct Teardown {
    permit: Option<GatePermit>,
    progress_tx: watch::Sender<Option<ExportProgress>>,
    delay: Duration,
}

impl Drop for Teardown {
    fn drop(&mut self) {
        let Some(permit) = self.permit.take() else {
            return;
        };
        let progress_tx = self.progress_tx.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let delay = self.delay;
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    progress_tx.send_replace(None);
                    permit.release();
                });
            }
            // Runtime is gone; nothing left to wait for
            Err(_) => {
                progress_tx.send_replace(None);
                permit.release();
            }
        }
    }
}

async fn tick_progress(
    progress_tx: watch::Sender<Option<ExportProgress>>,
    cancel: CancellationToken,
    estimate_seconds: u64,
) {
    let tick = Duration::from_secs(1);
    let mut interval = interval_at(Instant::now() + tick, tick);
    let mut elapsed = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                elapsed += 1;
                progress_tx.send_replace(Some(ExportProgress::estimate(elapsed, estimate_seconds)));
            }
        }
    }
}

/// Append a `t=<millis>` query parameter so a cached response for the same
/// name is not reused.
pub fn cache_bust(mut url: Url, stamp_millis: i64) -> Url {
    url.query_pairs_mut()
        .append_pair("t", &stamp_millis.to_string());
    url
}

/// Last non-empty path segment of `url`, or [`DEFAULT_MEDIA_NAME`]
pub fn media_file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or(DEFAULT_MEDIA_NAME)
        .to_string()
}
