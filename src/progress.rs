//! Progress-callback trait for batch lifecycle events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ParallexConfigBuilder::progress_callback`] to be told when
//! pages are rasterised, when the batch is submitted, every time the poller
//! hears back from the provider, and when the output is ready.
//!
//! A batch can sit in the provider's queue for hours, so these events are the
//! only sign of life a caller gets. Forward them to a terminal spinner, a
//! database row or a channel; the library does not care.
//!
//! # Example
//!
//! ```rust
//! use parallex::{BatchProgressCallback, BatchStatus, ParallexConfig};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl BatchProgressCallback for Printer {
//!     fn on_status(&self, job_id: &str, status: BatchStatus, polls: u32) {
//!         eprintln!("{job_id}: {status} after {polls} polls");
//!     }
//! }
//!
//! let config = ParallexConfig::builder()
//!     .model("gpt-4o")
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use crate::batch::BatchStatus;
use std::sync::Arc;

/// Called by the pipeline as a document moves through the batch lifecycle.
///
/// All methods default to no-ops. Several documents may be processed at once
/// with the same callback, so implementations must be `Send + Sync`.
pub trait BatchProgressCallback: Send + Sync {
    /// Rasterisation finished; `total_pages` pages will be submitted.
    fn on_pages_ready(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// The provider accepted the batch job.
    fn on_batch_submitted(&self, job_id: &str, total_pages: usize) {
        let _ = (job_id, total_pages);
    }

    /// A status query returned. `polls` counts queries so far, starting at 1.
    fn on_status(&self, job_id: &str, status: BatchStatus, polls: u32) {
        let _ = (job_id, status, polls);
    }

    /// The job reached a terminal status.
    fn on_batch_finished(&self, job_id: &str, status: BatchStatus) {
        let _ = (job_id, status);
    }

    /// Responses were correlated to pages.
    fn on_output_ready(&self, answered_pages: usize, missing_pages: usize) {
        let _ = (answered_pages, missing_pages);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ParallexConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
