//! Local stages that run before and after a batch job.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ══▶ batch::{submit, poll, correlate} ══▶ postprocess
//! (URL/path) (pdfium)  (PNG + custom_id)        (provider)             (cleanup)
//! ```
//!
//! 1. [`input`]: canonicalise the user-supplied path or URL to a local file
//! 2. [`render`]: rasterise every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`]: wrap each page as a data URL and tag it with a custom_id
//!    that carries the trace id and the page number
//! 4. [`postprocess`]: deterministic cleanup of each page's Markdown once
//!    the batch has been correlated

pub mod encode;
pub mod input;
pub mod postprocess;
pub mod render;
