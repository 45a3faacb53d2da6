//! Transport abstraction for the chat service
//!
//! The trait seam keeps [`ChatSession`](crate::ChatSession) independent of
//! the wire so tests can script a stream. [`HttpTransport`] is the real
//! thing: a streamed chat request and a one-shot multipart upload against
//! the service's HTTP surface.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::Stream;

use crate::error::{Error, Result};

/// A stream of raw response-body chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Body of the chat request
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: String,
}

/// Server acknowledgement for an accepted document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadReceipt {
    pub filename: Option<String>,
    pub message: Option<String>,
}

/// Transport for chat turns and document uploads
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a streaming chat turn; the caller drains the byte stream.
    async fn open_chat_stream(&self, request: &ChatRequest) -> Result<ByteStream>;

    /// Upload one document. No retries; the caller decides whether the
    /// user retries manually.
    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadReceipt>;
}

/// HTTP transport against `{base_url}/chat/stream` and `{base_url}/upload`
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for a service base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Create from the `RILL_BASE_URL` environment variable
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("RILL_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::InvalidConfig("RILL_BASE_URL is not set".to_owned()))?;
        Ok(Self::new(base_url))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open_chat_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        let url = format!("{}/chat/stream", self.base_url);
        tracing::debug!(%url, session_id = %request.session_id, "opening chat stream");

        let response = self.client.post(&url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::api(status.as_u16(), text));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| Error::StreamRead(e.to_string())));
        Ok(Box::pin(stream))
    }

    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadReceipt> {
        let url = format!("{}/upload", self.base_url);
        tracing::debug!(%url, filename, size = bytes.len(), "uploading document");

        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_owned());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self.client.post(&url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::UploadRejected {
                filename: filename.to_owned(),
                status: status.as_u16(),
                message: text,
            });
        }

        let body = response.text().await?;
        let receipt: UploadReceipt = serde_json::from_str(&body)?;
        Ok(receipt)
    }
}
