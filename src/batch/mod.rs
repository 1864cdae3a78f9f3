//! The batch lifecycle: submit one job per file, poll it to a terminal
//! status, and correlate its output records back to pages.
//!
//! ```text
//! records ──▶ submit ──▶ poll ──▶ correlate
//!            (upload +   (status   (custom_id →
//!             create)     loop)     page_number)
//! ```
//!
//! Every step talks to the provider through [`crate::provider::BatchProvider`],
//! so the whole lifecycle can be driven against a scripted provider in tests.

pub mod correlate;
pub mod poll;
pub mod submit;

use crate::provider::BatchProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

pub use correlate::{correlate, Correlation};
pub use poll::{ensure_succeeded, poll_once, wait_for_completion, wait_for_terminal, PollOptions};
pub use submit::{submit_batch, SubmitOptions};

/// Status of a provider batch job.
///
/// Only the provider moves a job between states; nothing in this crate infers
/// a transition locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Expired,
}

impl BatchStatus {
    /// Terminal jobs never change status again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BatchStatus::Succeeded
                | BatchStatus::Failed
                | BatchStatus::Cancelled
                | BatchStatus::Expired
        )
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Running => "running",
            BatchStatus::Succeeded => "succeeded",
            BatchStatus::Failed => "failed",
            BatchStatus::Cancelled => "cancelled",
            BatchStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// A provider batch job as last reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJob {
    pub job_id: String,
    pub status: BatchStatus,
    /// File holding the successful output records, once the job succeeded.
    pub output_file_id: Option<String>,
    /// File holding per-request failures, if the provider produced one.
    pub error_file_id: Option<String>,
    /// Provider diagnostic for failed/cancelled/expired jobs.
    pub diagnostic: Option<String>,
}

impl BatchJob {
    /// A freshly created job with no outputs yet.
    pub fn new(job_id: impl Into<String>, status: BatchStatus) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            output_file_id: None,
            error_file_id: None,
            diagnostic: None,
        }
    }
}

/// A file stored on the provider side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    pub filename: String,
}

/// Provider files created while processing one document.
///
/// Files are recorded as soon as they exist so a failure half-way through
/// still knows what to delete.
#[derive(Debug, Default)]
pub struct RemoteFiles {
    ids: Vec<String>,
}

impl RemoteFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.ids.contains(&id) {
            self.ids.push(id);
        }
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Delete every recorded file. Failures are logged and never returned.
    pub async fn delete_all(self, provider: &dyn BatchProvider) {
        for id in self.ids {
            info!("deleting - {}", id);
            if let Err(e) = provider.delete_file(&id).await {
                warn!("Failed to delete provider file {}: {}", id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!BatchStatus::Pending.is_terminal());
        assert!(!BatchStatus::Running.is_terminal());
        assert!(BatchStatus::Succeeded.is_terminal());
        assert!(BatchStatus::Failed.is_terminal());
        assert!(BatchStatus::Cancelled.is_terminal());
        assert!(BatchStatus::Expired.is_terminal());
    }

    #[test]
    fn status_serialises_snake_case() {
        let json = serde_json::to_string(&BatchStatus::Succeeded).unwrap();
        assert_eq!(json, "\"succeeded\"");
        assert_eq!(BatchStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn remote_files_dedup() {
        let mut files = RemoteFiles::new();
        files.push("file-1");
        files.push("file-2");
        files.push("file-1");
        assert_eq!(files.ids(), &["file-1".to_string(), "file-2".to_string()]);
    }
}
