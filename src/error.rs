//! Error types for the parallex library.
//!
//! Three error types mirror the three places things go wrong:
//!
//! * [`ParallexError`]: **Fatal** for one file: invalid pages, a failed
//!   upload, a batch job the provider gave up on, a poll timeout. Returned as
//!   `Err(ParallexError)` from the top-level entry points. Other files being
//!   processed at the same time are unaffected.
//!
//! * [`PageError`]: **Non-fatal**: one page had no usable response, or the
//!   provider returned a record nobody asked for. Stored inside
//!   [`crate::output::ParallexCallableOutput::page_errors`] so callers see
//!   exactly which pages are incomplete.
//!
//! * [`ProviderError`]: one failed call against the batch provider. Wrapped
//!   by the fatal variants that describe *which* step failed.

use std::path::PathBuf;
use thiserror::Error;

use crate::batch::BatchStatus;

/// Error type returned by a caller-supplied post-processing capability.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All fatal errors returned by the parallex library.
#[derive(Debug, Error)]
pub enum ParallexError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}' (first bytes: {magic:?})")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The PDF is encrypted and no password was configured.
    #[error("PDF '{path}' is password-protected; set a password")]
    PasswordRequired { path: PathBuf },

    /// The configured password did not open the PDF.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium could not open the document.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// pdfium or the PNG encoder failed on a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: u32, detail: String },

    // ── Batch lifecycle errors ────────────────────────────────────────────
    /// Pages or correlation ids are malformed. Raised before any network call.
    #[error("Invalid batch input: {0}")]
    Validation(String),

    /// Uploading the batch input or creating the batch job failed.
    #[error("Batch submission failed during {stage}: {source}")]
    Submission {
        stage: SubmissionStage,
        #[source]
        source: ProviderError,
    },

    /// The provider reported a terminal status other than success.
    #[error("Batch job {job_id} ended with status {status}: {diagnostic}")]
    BatchJobFailed {
        job_id: String,
        status: BatchStatus,
        diagnostic: String,
    },

    /// The configured maximum poll duration elapsed. The remote job is left running.
    #[error("Batch job {job_id} still {last_status} after {elapsed_secs}s; giving up")]
    PollTimeout {
        job_id: String,
        last_status: BatchStatus,
        elapsed_secs: u64,
    },

    /// A status query or output download failed after the network layer's retries.
    #[error("Provider call '{operation}' failed for batch job {job_id}: {source}")]
    Provider {
        operation: &'static str,
        job_id: String,
        #[source]
        source: ProviderError,
    },

    /// Pages had no response and the missing-page policy is `Fail`.
    #[error("{} page(s) received no response: {pages:?}", .pages.len())]
    MissingResponses { pages: Vec<u32> },

    /// The caller's post-processing capability returned an error.
    #[error(transparent)]
    PostProcess(BoxError),

    // ── Config & output ──────────────────────────────────────────────────
    /// Builder validation failed or no provider could be resolved.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The network step of a submission that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStage {
    Upload,
    CreateJob,
}

impl std::fmt::Display for SubmissionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmissionStage::Upload => f.write_str("upload"),
            SubmissionStage::CreateJob => f.write_str("job creation"),
        }
    }
}

/// A single failed provider call.
#[derive(Debug, Clone, Error)]
#[error("{message}{}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
pub struct ProviderError {
    /// HTTP status, when the provider answered at all.
    pub status: Option<u16>,
    pub message: String,
    /// Whether repeating the same call could plausibly succeed.
    pub transient: bool,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            transient: false,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            transient: true,
        }
    }

    /// Build from an HTTP error response. 408, 429 and 5xx are transient.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: body.into(),
            transient: status == 408 || status == 429 || status >= 500,
        }
    }

    /// Whether the provider refused the request because the payload was too large.
    pub fn is_size_rejection(&self) -> bool {
        self.status == Some(413) || self.message.to_ascii_lowercase().contains("too large")
    }
}

/// A non-fatal error for a single page or output record.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageError {
    /// No output record referenced this page.
    #[error("Page {page}: no response in batch output")]
    MissingResponse { page: u32 },

    /// The provider answered this page's request with an error.
    #[error("Page {page}: request failed: {detail}")]
    RequestFailed { page: u32, detail: String },

    /// An output record whose custom_id matches no submitted page.
    #[error("Orphan response with custom_id '{custom_id}': {reason}")]
    OrphanResponse { custom_id: String, reason: String },

    /// An output line that is not a valid batch record.
    #[error("Malformed output record on line {line}: {detail}")]
    MalformedRecord { line: usize, detail: String },
}

impl PageError {
    /// The page this error refers to, when it can be attributed to one.
    pub fn page(&self) -> Option<u32> {
        match self {
            PageError::MissingResponse { page } | PageError::RequestFailed { page, .. } => {
                Some(*page)
            }
            PageError::OrphanResponse { .. } | PageError::MalformedRecord { .. } => None,
        }
    }
}
