//! # parallex
//!
//! Convert PDF documents to per-page Markdown through an LLM provider's
//! asynchronous batch API.
//!
//! ## Why batch?
//!
//! A vision model reads a rasterised page better than any text extractor
//! reads a multi-column layout, but calling it once per page, synchronously,
//! is the expensive way to do it. Batch APIs (OpenAI, Azure OpenAI) accept a
//! single JSONL file with one request per page, run it within a completion
//! window at a lower price, and hand back a file of results. This crate does
//! the bookkeeping around that: one batch job per PDF, a poller that waits
//! for it, and a correlator that maps every returned record to its page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Render     rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Encode     PNG data URL + custom_id "<trace_id>--page--<n>"
//!  ├─ 4. Submit     upload JSONL, create one batch job
//!  ├─ 5. Poll       query status until succeeded / failed / cancelled / expired
//!  ├─ 6. Correlate  custom_id → page number; unknown ids are orphans
//!  └─ 7. Output     ParallexCallableOutput, then the post-process capability
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parallex::{parallex, ParallexConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider from OPENAI_API_KEY or AZURE_OPENAI_API_KEY + AZURE_OPENAI_ENDPOINT
//!     let config = ParallexConfig::builder().model("gpt-4o").build()?;
//!     let output = parallex("document.pdf", &config).await?;
//!     println!("{}", output.markdown("\n\n"));
//!     if !output.is_complete() {
//!         eprintln!("pages without a response: {:?}", output.missing_pages);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `parallex` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! parallex = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod callback;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod provider;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{BatchJob, BatchStatus, PollOptions};
pub use callback::PostProcess;
pub use config::{LogLevel, MissingPagePolicy, ParallexConfig, ParallexConfigBuilder};
pub use convert::{
    parallex, parallex_sync, parallex_to_file, process_pages, resolve_provider, DocumentInfo,
};
pub use error::{BoxError, PageError, ParallexError, ProviderError};
pub use output::{PageResponse, ParallexCallableOutput};
pub use pipeline::encode::{ImagePayload, Page};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use provider::{BatchProvider, OpenAiBatchClient};
