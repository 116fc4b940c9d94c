//! HTTP client for the generation and recording backend

use std::path::Path;

use futures::StreamExt;
use reqwest::Url;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use crate::{
    error::{Error, ErrorClassification, Result},
    stream::{StreamEventReader, StreamEventStream},
    types::{GenerateRequest, RecordRequest, RecordResponse},
};

/// Default backend address
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";

const EVENT_STREAM: &str = "text/event-stream";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Client for `POST /generate`, `POST /record` and media downloads
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: Url,
}

impl BackendClient {
    /// Create a client for the backend at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing `reqwest::Client`
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self> {
        // Relative joins only keep the base path when it ends with a slash.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", base_url, e)))?;
        Ok(Self { client, base_url })
    }

    /// Base URL every endpoint and locator is resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", path, e)))
    }

    /// Start a generation and return its event stream.
    ///
    /// Fails before any event is produced when the backend cannot be reached
    /// or answers with a non-success status.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<StreamEventStream> {
        let url = self.endpoint("generate")?;
        tracing::debug!("Generate URL: {}", url);

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(Error::Unreachable)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Generate request failed with status {}", status);
            return Err(Error::status(status.as_u16(), body));
        }

        if !has_event_body(&response) {
            tracing::warn!(
                "Generate response is not an event stream ({:?})",
                response.headers().get(reqwest::header::CONTENT_TYPE)
            );
            return Err(Error::MissingBody);
        }

        let chunks = Box::pin(response.bytes_stream());
        Ok(StreamEventReader::new(chunks).into_stream())
    }

    /// Ask the backend to record a document
    pub async fn record(&self, request: &RecordRequest) -> Result<RecordResponse> {
        let url = self.endpoint("record")?;
        tracing::debug!("Record URL: {}", url);

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Record {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| Error::Record {
            status: Some(status.as_u16()),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|body| body.error)
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(Error::Record {
                status: Some(status.as_u16()),
                message,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }

    /// Resolve a media locator, absolute or relative, against the base URL
    pub fn resolve(&self, locator: &str) -> Result<Url> {
        self.base_url
            .join(locator.trim())
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", locator, e)))
    }

    /// Download `url` into `dest`, returning the number of bytes written
    pub async fn download(&self, url: Url, dest: &Path) -> Result<u64> {
        tracing::debug!("Downloading {} to {}", url, dest.display());

        let response = self.client.get(url).send().await.map_err(Error::Unreachable)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::status(status.as_u16(), body));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk =
                chunk.map_err(|e| Error::stream(e.to_string(), ErrorClassification::Unknown))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}

/// A generation response is usable when it is non-empty and, if typed at
/// all, typed as an event stream.
fn has_event_body(response: &reqwest::Response) -> bool {
    if response.content_length() == Some(0) {
        return false;
    }
    match response.headers().get(reqwest::header::CONTENT_TYPE) {
        Some(value) => value
            .to_str()
            .map(|ct| ct.trim().to_ascii_lowercase().starts_with(EVENT_STREAM))
            .unwrap_or(false),
        None => true,
    }
}
