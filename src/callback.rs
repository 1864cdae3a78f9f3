//! Caller-supplied post-processing of the finished output.
//!
//! The capability runs once per file, after all pages are correlated and the
//! output is assembled, and never while a batch is still being polled. An
//! error it returns aborts that file and reaches the caller unchanged as
//! [`crate::error::ParallexError::PostProcess`].
//!
//! Any `Fn(&ParallexCallableOutput) -> Result<(), BoxError>` closure works:
//!
//! ```rust
//! use parallex::{BoxError, ParallexCallableOutput, ParallexConfig};
//! use std::sync::Arc;
//!
//! let config = ParallexConfig::builder()
//!     .model("gpt-4o")
//!     .post_process(Arc::new(|out: &ParallexCallableOutput| -> Result<(), BoxError> {
//!         std::fs::write("out.md", out.markdown("\n\n"))?;
//!         Ok(())
//!     }))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::BoxError;
use crate::output::ParallexCallableOutput;

/// Something to do with each finished output: store it, index it, forward it.
pub trait PostProcess: Send + Sync {
    fn invoke(&self, output: &ParallexCallableOutput) -> Result<(), BoxError>;
}

impl<F> PostProcess for F
where
    F: Fn(&ParallexCallableOutput) -> Result<(), BoxError> + Send + Sync,
{
    fn invoke(&self, output: &ParallexCallableOutput) -> Result<(), BoxError> {
        self(output)
    }
}
