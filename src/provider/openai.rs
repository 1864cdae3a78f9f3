//! HTTP client for the OpenAI (and Azure OpenAI) Batch API.
//!
//! ## Retry Strategy
//!
//! Only idempotent calls are retried: status queries, file downloads and
//! deletes. Transient failures (connection errors, timeouts, 408, 429, 5xx)
//! back off exponentially (`retry_backoff_ms * 2^attempt`). Uploads and batch
//! creation run exactly once; repeating them would create duplicate files or
//! duplicate jobs that are billed separately.

use super::{format, BatchProvider, CreateBatchRequest};
use crate::batch::{BatchJob, BatchStatus, RemoteFile};
use crate::error::{ParallexError, ProviderError};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Default public API root.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Azure OpenAI API version for the Batch API.
pub const AZURE_API_VERSION: &str = "2024-10-21";

/// Upper bound on a single retry wait.
const MAX_BACKOFF_MS: u64 = 60_000;

/// How the API key is presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>` (api.openai.com and compatible servers).
    Bearer,
    /// `api-key: <key>` plus an `api-version` query parameter (Azure OpenAI).
    Azure { api_version: String },
}

/// Batch API client. Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct OpenAiBatchClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    auth: AuthStyle,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl std::fmt::Debug for OpenAiBatchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBatchClient")
            .field("base_url", &self.base_url)
            .field("auth", &self.auth)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl OpenAiBatchClient {
    /// Client for api.openai.com or any server speaking the same API.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ParallexError> {
        Self::build(base_url.into(), api_key.into(), AuthStyle::Bearer)
    }

    /// Client for an Azure OpenAI resource, e.g. `https://my-res.openai.azure.com`.
    pub fn azure(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Result<Self, ParallexError> {
        let endpoint = endpoint.into();
        let base_url = format!("{}/openai", endpoint.trim_end_matches('/'));
        Self::build(
            base_url,
            api_key.into(),
            AuthStyle::Azure {
                api_version: api_version.into(),
            },
        )
    }

    /// Build a client from the environment.
    ///
    /// Azure wins when `AZURE_OPENAI_API_KEY` and `AZURE_OPENAI_ENDPOINT` are
    /// both set; otherwise `OPENAI_API_KEY` (and optional `OPENAI_BASE_URL`).
    pub fn from_env() -> Result<Self, ParallexError> {
        if let (Some(key), Some(endpoint)) = (
            non_empty_env("AZURE_OPENAI_API_KEY"),
            non_empty_env("AZURE_OPENAI_ENDPOINT"),
        ) {
            let version =
                non_empty_env("AZURE_OPENAI_API_VERSION").unwrap_or_else(|| AZURE_API_VERSION.into());
            return Self::azure(endpoint, key, version);
        }

        if let Some(key) = non_empty_env("OPENAI_API_KEY") {
            let base = non_empty_env("OPENAI_BASE_URL").unwrap_or_else(|| OPENAI_BASE_URL.into());
            return Self::new(base, key);
        }

        Err(ParallexError::InvalidConfig(
            "No batch provider configured.\n\
             Set OPENAI_API_KEY, or AZURE_OPENAI_API_KEY + AZURE_OPENAI_ENDPOINT."
                .into(),
        ))
    }

    fn build(base_url: String, api_key: String, auth: AuthStyle) -> Result<Self, ParallexError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| ParallexError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            auth,
            max_retries: 3,
            retry_backoff_ms: 500,
        })
    }

    /// Override retry behaviour for idempotent calls.
    pub fn with_retries(mut self, max_retries: u32, retry_backoff_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff_ms = retry_backoff_ms;
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.http.request(method, url);
        match &self.auth {
            AuthStyle::Bearer => builder.bearer_auth(&self.api_key),
            AuthStyle::Azure { api_version } => builder
                .header("api-key", &self.api_key)
                .query(&[("api-version", api_version.as_str())]),
        }
    }

    /// Send a non-idempotent request exactly once.
    async fn send_once(&self, builder: RequestBuilder) -> Result<Response, ProviderError> {
        let response = builder.send().await.map_err(transport_error)?;
        check_status(response).await
    }

    /// Send an idempotent request, retrying transient failures.
    async fn send_idempotent(
        &self,
        operation: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<Response, ProviderError> {
        let mut last_err: Option<ProviderError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    operation, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            let result = match build().send().await {
                Ok(response) => check_status(response).await,
                Err(e) => Err(transport_error(e)),
            };

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.transient => {
                    warn!("{}: attempt {} failed: {}", operation, attempt + 1, e);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| ProviderError::new(format!("{operation}: no attempts made"))))
    }
}

#[async_trait]
impl BatchProvider for OpenAiBatchClient {
    fn name(&self) -> &str {
        match self.auth {
            AuthStyle::Bearer => "openai",
            AuthStyle::Azure { .. } => "azure-openai",
        }
    }

    fn default_endpoint(&self) -> &str {
        match self.auth {
            AuthStyle::Bearer => format::DEFAULT_ENDPOINT,
            AuthStyle::Azure { .. } => format::AZURE_ENDPOINT,
        }
    }

    async fn upload_batch_input(
        &self,
        filename: &str,
        jsonl: Vec<u8>,
    ) -> Result<RemoteFile, ProviderError> {
        let size = jsonl.len();
        let part = Part::bytes(jsonl)
            .file_name(filename.to_string())
            .mime_str("application/jsonl")
            .map_err(|e| ProviderError::new(format!("Invalid upload part: {e}")))?;
        let form = Form::new().text("purpose", "batch").part("file", part);

        let response = self
            .send_once(self.request(reqwest::Method::POST, "/files").multipart(form))
            .await?;
        let file: FileObject = parse_json(response).await?;
        debug!("Uploaded {} ({} bytes) as {}", filename, size, file.id);

        Ok(RemoteFile {
            id: file.id,
            filename: file.filename.unwrap_or_else(|| filename.to_string()),
        })
    }

    async fn create_batch(&self, request: &CreateBatchRequest) -> Result<BatchJob, ProviderError> {
        let body = CreateBatchBody {
            input_file_id: &request.input_file_id,
            endpoint: &request.endpoint,
            completion_window: &request.completion_window,
            metadata: &request.metadata,
        };
        let response = self
            .send_once(self.request(reqwest::Method::POST, "/batches").json(&body))
            .await?;
        let batch: BatchObject = parse_json(response).await?;
        Ok(batch.into_job())
    }

    async fn retrieve_batch(&self, job_id: &str) -> Result<BatchJob, ProviderError> {
        let path = format!("/batches/{job_id}");
        let response = self
            .send_idempotent("retrieve_batch", || {
                self.request(reqwest::Method::GET, &path)
            })
            .await?;
        let batch: BatchObject = parse_json(response).await?;
        Ok(batch.into_job())
    }

    async fn file_content(&self, file_id: &str) -> Result<String, ProviderError> {
        let path = format!("/files/{file_id}/content");
        let response = self
            .send_idempotent("file_content", || self.request(reqwest::Method::GET, &path))
            .await?;
        response
            .text()
            .await
            .map_err(|e| ProviderError::transient(format!("Error reading file content: {e}")))
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), ProviderError> {
        let path = format!("/files/{file_id}");
        self.send_idempotent("delete_file", || {
            self.request(reqwest::Method::DELETE, &path)
        })
        .await?;
        Ok(())
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, serde::Serialize)]
struct CreateBatchBody<'a> {
    input_file_id: &'a str,
    endpoint: &'a str,
    completion_window: &'a str,
    metadata: &'a BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FileObject {
    id: String,
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchObject {
    id: String,
    status: String,
    #[serde(default)]
    output_file_id: Option<String>,
    #[serde(default)]
    error_file_id: Option<String>,
    #[serde(default)]
    errors: Option<BatchErrors>,
}

#[derive(Debug, Deserialize)]
struct BatchErrors {
    #[serde(default)]
    data: Vec<BatchErrorItem>,
}

#[derive(Debug, Deserialize)]
struct BatchErrorItem {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    line: Option<u64>,
}

impl BatchObject {
    fn into_job(self) -> BatchJob {
        let status = map_status(&self.status);
        let diagnostic = self
            .errors
            .filter(|e| !e.data.is_empty())
            .map(|e| {
                e.data
                    .iter()
                    .map(|item| {
                        let mut s = format!(
                            "{}: {}",
                            item.code.as_deref().unwrap_or("error"),
                            item.message.as_deref().unwrap_or("no message")
                        );
                        if let Some(line) = item.line {
                            s.push_str(&format!(" (line {line})"));
                        }
                        s
                    })
                    .collect::<Vec<_>>()
                    .join("; ")
            });

        BatchJob {
            job_id: self.id,
            status,
            output_file_id: self.output_file_id,
            error_file_id: self.error_file_id,
            diagnostic,
        }
    }
}

/// Map the provider's status vocabulary onto [`BatchStatus`].
///
/// `cancelling` is still in flight. Unrecognised values are treated as
/// running so a new provider status never ends a poll early; the poll timeout
/// bounds the damage.
pub fn map_status(raw: &str) -> BatchStatus {
    match raw {
        "validating" => BatchStatus::Pending,
        "in_progress" | "finalizing" | "cancelling" => BatchStatus::Running,
        "completed" => BatchStatus::Succeeded,
        "failed" => BatchStatus::Failed,
        "expired" => BatchStatus::Expired,
        "cancelled" => BatchStatus::Cancelled,
        other => {
            warn!("Unrecognised batch status '{}'; treating as running", other);
            BatchStatus::Running
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() || e.is_connect() {
        ProviderError::transient(format!("Error sending request: {e}"))
    } else {
        ProviderError::new(format!("Error sending request: {e}"))
    }
}

async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable error body: {e}>"));
    Err(ProviderError::from_status(status.as_u16(), body))
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    let raw = response
        .text()
        .await
        .map_err(|e| ProviderError::transient(format!("Error reading response: {e}")))?;
    serde_json::from_str(&raw)
        .map_err(|e| ProviderError::new(format!("Error parsing JSON response: {e}: {raw}")))
}

/// Exponential backoff before retry `attempt` (1-based), capped at [`MAX_BACKOFF_MS`].
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}
