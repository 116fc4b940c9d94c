//! Seams between the session layer and the backend

use async_trait::async_trait;
use reel_stream::{
    BackendClient, GenerateRequest, RecordRequest, RecordResponse, Result, StreamEventStream, Url,
};

/// Source of generation event streams
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a generation request and return its event stream.
    ///
    /// Transport-level failures (unreachable backend, non-success status,
    /// missing body) are returned as `Err` before any event is produced.
    async fn generate(&self, request: GenerateRequest) -> Result<StreamEventStream>;
}

/// Backend recording endpoint
#[async_trait]
pub trait RecordingService: Send + Sync {
    /// Submit a recording job and wait for its result
    async fn record(&self, request: RecordRequest) -> Result<RecordResponse>;

    /// Turn a returned media locator into an absolute URL
    fn resolve(&self, locator: &str) -> Result<Url>;
}

/// Transport backed by the HTTP backend
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: BackendClient,
}

impl HttpTransport {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    /// Connect to the backend at `base_url`
    pub fn connect(base_url: &str) -> Result<Self> {
        Ok(Self::new(BackendClient::new(base_url)?))
    }

    pub fn client(&self) -> &BackendClient {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn generate(&self, request: GenerateRequest) -> Result<StreamEventStream> {
        self.client.generate(&request).await
    }
}

#[async_trait]
impl RecordingService for HttpTransport {
    async fn record(&self, request: RecordRequest) -> Result<RecordResponse> {
        self.client.record(&request).await
    }

    fn resolve(&self, locator: &str) -> Result<Url> {
        self.client.resolve(locator)
    }
}
