//! HTTP client for the knowledge-base backend: chat, health and document calls.
//! Each call is one request, fully awaited. No retries, no caching.

use std::path::Path;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;

use crate::config::{join_url, Config, Endpoints};
use crate::messages::{
    ChatReply, ChatRequest, DeleteReceipt, Document, HealthStatus, UploadReceipt,
};

/// Client call error.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No response was obtained (connection refused, DNS failure, transport timeout).
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    /// The server answered with a non-2xx status.
    #[error("{operation} failed: HTTP {status}")]
    Request {
        operation: &'static str,
        status: reqwest::StatusCode,
    },
    /// A 2xx response whose body was not the expected JSON.
    #[error("invalid response body: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    /// HTTP status of a `Request` error.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            ApiError::Request { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Anything a chat session can send a question to.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// POST `question` to `endpoint` and return the decoded reply.
    async fn ask(&self, endpoint: &str, question: &str) -> Result<ChatReply, ApiError>;
}

/// Typed REST client bound to one base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    endpoints: Endpoints,
}

impl ApiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url().to_string(),
            endpoints: config.api.endpoints.clone(),
        }
    }

    /// Client with default endpoint paths.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            endpoints: Endpoints::default(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn url(&self, endpoint: &str) -> String {
        join_url(&self.base_url, endpoint)
    }

    /// Ask a question on the configured chat endpoint.
    pub async fn chat(&self, question: &str) -> Result<ChatReply, ApiError> {
        self.ask(&self.endpoints.chat, question).await
    }

    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        let req = self.http.get(self.url(&self.endpoints.health));
        self.execute("health check", req).await
    }

    /// Upload a local file as multipart field `file`.
    pub async fn upload_document(&self, path: &Path) -> Result<UploadReceipt, ApiError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ApiError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".into());
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);
        let req = self
            .http
            .post(self.url(&self.endpoints.upload))
            .multipart(form);
        self.execute("document upload", req).await
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>, ApiError> {
        let req = self.http.get(self.url(&self.endpoints.documents));
        self.execute("document listing", req).await
    }

    /// Delete a document by id. The id is encoded as a single path segment.
    pub async fn delete_document(&self, id: &str) -> Result<DeleteReceipt, ApiError> {
        let mut url = Url::parse(&self.url(&self.endpoints.documents))
            .map_err(|e| ApiError::Url(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Url(format!("cannot append a path to {}", self.base_url)))?
            .pop_if_empty()
            .push(id);
        let req = self.http.request(Method::DELETE, url);
        self.execute("document deletion", req).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        req: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = req.send().await.map_err(|e| {
            if e.is_builder() {
                ApiError::Url(e.to_string())
            } else {
                ApiError::Network(e)
            }
        })?;
        let status = response.status();
        tracing::debug!(operation, %status, url = %response.url(), "backend responded");
        if !status.is_success() {
            return Err(ApiError::Request { operation, status });
        }
        response.json::<T>().await.map_err(ApiError::Decode)
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn ask(&self, endpoint: &str, question: &str) -> Result<ChatReply, ApiError> {
        let req = self
            .http
            .post(self.url(endpoint))
            .json(&ChatRequest { question });
        self.execute("chat request", req).await
    }
}
