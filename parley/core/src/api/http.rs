//! HTTP Backend Implementation
//!
//! [`ChatApi`] over the backend's REST endpoints.
//!
//! # Endpoints
//!
//! - `POST /api/chat` or `/api/chat/single` - chat turn, streamed response
//! - `GET /api/services/status` - service availability
//! - `POST /api/audio/transcribe` - multipart audio upload
//! - `POST /api/image/generate` - image generation
//! - `GET /api/user/stats` - usage figures
//! - `GET <ollama>/api/tags` - installed models

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};

use super::traits::{
    parse_transcription, ChatApi, ChatRequest, ImageResponse, ModelInfo, ModelsResponse,
    TranscriberProbe,
};
use crate::config::{ChatEndpoint, ClientConfig};
use crate::conversation::ImageAttachment;
use crate::dashboard::UserStats;
use crate::error::{ClientError, ClientResult};
use crate::recording::AudioPayload;
use crate::status::{ServiceStatusMap, ServicesResponse};
use crate::streaming::{ByteStream, PayloadFormat};

/// Timeout for the short status and diagnostics requests
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for establishing a connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the chat backend
#[derive(Clone, Debug)]
pub struct HttpApi {
    /// Backend base URL, without trailing slash
    base_url: String,
    /// Ollama base URL, without trailing slash
    ollama_url: String,
    /// Which chat endpoint to use
    endpoint: ChatEndpoint,
    /// Whole-request limit for uploads and image generation
    request_timeout: Option<Duration>,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpApi {
    /// Create a client for a backend URL with default settings
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Network`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, endpoint: ChatEndpoint) -> ClientResult<Self> {
        let mut config = ClientConfig::default();
        config.base_url = base_url.into();
        config.endpoint = endpoint;
        Self::from_config(&config)
    }

    /// Create a client from resolved configuration
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Network`] if the HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        // No whole-request timeout on the client: a streamed reply may run
        // for as long as the server keeps sending.
        let mut builder = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);
        if let Some(timeout) = config.request_timeout {
            builder = builder.read_timeout(timeout);
        }
        let http_client = builder.build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            ollama_url: config.ollama_url.trim_end_matches('/').to_string(),
            endpoint: config.endpoint,
            request_timeout: config.request_timeout,
            http_client,
        })
    }

    /// Backend base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Apply the whole-request limit to a bounded call
    fn bounded(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.request_timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    /// Fail on non-success status, keeping a bit of the body for the log
    async fn check_status(response: reqwest::Response) -> ClientResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let body: String = body.chars().take(200).collect();
        Err(ClientError::Network(format!("server returned {status}: {body}")))
    }
}

#[async_trait]
impl ChatApi for HttpApi {
    fn name(&self) -> &str {
        "http"
    }

    fn payload_format(&self) -> PayloadFormat {
        match self.endpoint {
            ChatEndpoint::Simple => PayloadFormat::Raw,
            ChatEndpoint::Single => PayloadFormat::Envelope,
        }
    }

    async fn open_chat_stream(&self, request: &ChatRequest) -> ClientResult<ByteStream> {
        let url = self.url(self.endpoint.path());
        tracing::debug!(url = %url, chars = request.message.chars().count(), "Sending chat message");

        let response = self
            .http_client
            .post(&url)
            .json(&request.body(self.endpoint))
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ClientError::from))
            .boxed())
    }

    async fn service_status(&self) -> ClientResult<ServiceStatusMap> {
        let response = self
            .http_client
            .get(self.url("/api/services/status"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let body: ServicesResponse = response.json().await?;
        Ok(body.services)
    }

    async fn transcribe(&self, audio: AudioPayload) -> ClientResult<String> {
        let bytes = audio.bytes.len();
        let part = Part::bytes(audio.bytes)
            .file_name(audio.file_name)
            .mime_str(&audio.mime_type)?;
        let form = Form::new().part(AudioPayload::FIELD, part);

        tracing::debug!(bytes, "Uploading recording for transcription");
        let response = self
            .bounded(self.http_client.post(self.url("/api/audio/transcribe")))
            .multipart(form)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let body: Value = response.json().await?;
        parse_transcription(&body)
    }

    async fn generate_image(&self, prompt: &str) -> ClientResult<ImageAttachment> {
        tracing::debug!(chars = prompt.chars().count(), "Requesting image generation");
        let response = self
            .bounded(self.http_client.post(self.url("/api/image/generate")))
            .json(&json!({ "prompt": prompt }))
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let body: ImageResponse = response.json().await?;
        body.into_attachment(prompt)
    }

    async fn user_stats(&self) -> ClientResult<UserStats> {
        let response = self
            .http_client
            .get(self.url("/api/user/stats"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn probe_transcriber(&self) -> ClientResult<TranscriberProbe> {
        let response = self
            .http_client
            .post(self.url("/api/audio/transcribe"))
            .multipart(Form::new())
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "Transcriber probe answered");
        if status == reqwest::StatusCode::BAD_REQUEST {
            Ok(TranscriberProbe::Available)
        } else {
            Ok(TranscriberProbe::Responded(status.as_u16()))
        }
    }

    async fn list_models(&self) -> ClientResult<Vec<ModelInfo>> {
        let response = self
            .http_client
            .get(format!("{}/api/tags", self.ollama_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let body: ModelsResponse = response.json().await?;
        Ok(body.models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_api_creation() {
        let api = HttpApi::new("http://localhost:8000/", ChatEndpoint::Single).unwrap();
        assert_eq!(api.base_url(), "http://localhost:8000");
        assert_eq!(api.url("/api/chat"), "http://localhost:8000/api/chat");
        assert_eq!(api.payload_format(), PayloadFormat::Envelope);
    }

    #[test]
    fn test_simple_endpoint_uses_raw_payloads() {
        let api = HttpApi::new("http://localhost:8000", ChatEndpoint::Simple).unwrap();
        assert_eq!(api.payload_format(), PayloadFormat::Raw);
    }

    #[test]
    fn test_from_config() {
        let mut config = ClientConfig::default();
        config.ollama_url = "http://gpu:11434/".to_string();
        config.request_timeout = None;
        let api = HttpApi::from_config(&config).unwrap();
        assert_eq!(api.ollama_url, "http://gpu:11434");
        assert_eq!(api.request_timeout, None);
    }
}
