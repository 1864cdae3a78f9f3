//! The batch provider boundary.
//!
//! [`BatchProvider`] is the only seam between the batch lifecycle and the
//! outside world: upload a JSONL file, create a job, query it, download its
//! output, delete files. A provider is built once per process and passed
//! around as `Arc<dyn BatchProvider>`; it holds the HTTP connection pool, so
//! many files can share it concurrently without any other shared state.
//!
//! The JSONL line schema is also owned by the provider. The default methods
//! speak the OpenAI-compatible format from [`format`], which Azure OpenAI
//! shares; a provider with a different schema overrides
//! [`BatchProvider::encode_line`] and [`BatchProvider::decode_line`].

pub mod format;
pub mod openai;

use crate::batch::{BatchJob, RemoteFile};
use crate::error::ProviderError;
use crate::pipeline::encode::BatchRequestRecord;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub use openai::{AuthStyle, OpenAiBatchClient};

/// Parameters for creating a batch job from an uploaded input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateBatchRequest {
    pub input_file_id: String,
    /// Endpoint every line targets, e.g. `/v1/chat/completions`.
    pub endpoint: String,
    pub completion_window: String,
    pub metadata: BTreeMap<String, String>,
}

/// Per-line request parameters that are not part of the record itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineOptions {
    pub model: String,
    pub endpoint: String,
    pub max_tokens: u32,
}

/// One decoded line of a batch output (or error) file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    pub custom_id: String,
    pub outcome: RecordOutcome,
}

/// What the provider produced for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The model's text. Empty when the model could not read the page.
    Content(String),
    /// The request itself failed; carries the provider's explanation.
    Failed(String),
}

/// An asynchronous batch inference API.
#[async_trait]
pub trait BatchProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Endpoint path used when the caller does not configure one.
    fn default_endpoint(&self) -> &str {
        format::DEFAULT_ENDPOINT
    }

    /// Upload serialized batch input. Not idempotent.
    async fn upload_batch_input(
        &self,
        filename: &str,
        jsonl: Vec<u8>,
    ) -> Result<RemoteFile, ProviderError>;

    /// Create a batch job over an uploaded file. Not idempotent.
    async fn create_batch(&self, request: &CreateBatchRequest) -> Result<BatchJob, ProviderError>;

    /// Fetch the current state of a job.
    async fn retrieve_batch(&self, job_id: &str) -> Result<BatchJob, ProviderError>;

    /// Download the raw contents of a provider file.
    async fn file_content(&self, file_id: &str) -> Result<String, ProviderError>;

    /// Delete a provider file.
    async fn delete_file(&self, file_id: &str) -> Result<(), ProviderError>;

    /// Serialize one request record as a JSONL line (no trailing newline).
    fn encode_line(
        &self,
        record: &BatchRequestRecord,
        options: &LineOptions,
    ) -> Result<String, ProviderError> {
        format::encode_line(record, options)
    }

    /// Parse one non-empty line of an output or error file.
    fn decode_line(&self, line: &str) -> Result<OutputRecord, String> {
        format::decode_line(line)
    }
}
