//! Configuration types for batch PDF conversion.
//!
//! All behaviour is controlled through [`ParallexConfig`], built via its
//! [`ParallexConfigBuilder`]. One config can be shared by any number of
//! concurrent conversions: it holds no per-file state, and the provider
//! handle inside it is reference-counted.

use crate::batch::PollOptions;
use crate::callback::PostProcess;
use crate::error::ParallexError;
use crate::progress::ProgressCallback;
use crate::provider::BatchProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// 150 MiB, the largest batch input file the provider accepts.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 150 * 1024 * 1024;

/// Configuration for converting one or more PDFs through a batch provider.
///
/// # Example
/// ```rust
/// use parallex::{MissingPagePolicy, ParallexConfig};
/// use std::time::Duration;
///
/// let config = ParallexConfig::builder()
///     .model("gpt-4o")
///     .concurrency(8)
///     .poll_interval(Duration::from_secs(30))
///     .poll_timeout(Duration::from_secs(6 * 3600))
///     .missing_page_policy(MissingPagePolicy::Fail)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ParallexConfig {
    /// Model (or Azure deployment) every batch line targets.
    /// If None, `AZURE_OPENAI_API_DEPLOYMENT` is used.
    pub model: Option<String>,

    /// Pre-constructed provider. If None, one is built from the environment.
    pub provider: Option<Arc<dyn BatchProvider>>,

    /// Maximum concurrent page-encoding tasks before submission. Default: 20.
    ///
    /// Only the work that prepares pages runs in parallel; each file still
    /// becomes exactly one batch job, polled by one task.
    pub concurrency: usize,

    /// Prompt sent with every page. If None, uses [`crate::prompts::DEFAULT_PROMPT`].
    pub prompt_text: Option<String>,

    /// Verbosity for the binary's log subscriber. Default: [`LogLevel::Error`].
    pub log_level: LogLevel,

    /// Called with the finished output, as the last step.
    pub post_process: Option<Arc<dyn PostProcess>>,

    /// Receives lifecycle events.
    pub progress_callback: Option<ProgressCallback>,

    /// Longest rendered page edge in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Maximum tokens the model may generate per page. Default: 2000.
    pub max_tokens: u32,

    /// Endpoint path every batch line targets. If None, the provider default.
    pub endpoint: Option<String>,

    /// Provider completion window. Default: "24h".
    pub completion_window: String,

    /// Largest JSONL upload attempted. Default: 150 MiB.
    pub max_upload_bytes: usize,

    /// Wait before the first status query. Default: 30 s.
    ///
    /// Batches never finish within seconds of submission, so the first
    /// queries would only ever see `validating`.
    pub initial_poll_delay: Duration,

    /// Wait between status queries. Default: 60 s.
    pub poll_interval: Duration,

    /// Give up polling after this long, leaving the job running. Default: None.
    pub poll_timeout: Option<Duration>,

    /// What to do with pages that get no response. Default: [`MissingPagePolicy::Partial`].
    pub missing_page_policy: MissingPagePolicy,

    /// Normalise each page's Markdown (fences, line endings). Default: true.
    pub clean_output: bool,

    /// Delete uploaded and generated provider files when done. Default: true.
    pub cleanup_remote_files: bool,

    /// Retries for idempotent provider calls on transient errors. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for ParallexConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider: None,
            concurrency: 20,
            prompt_text: None,
            log_level: LogLevel::default(),
            post_process: None,
            progress_callback: None,
            max_rendered_pixels: 2000,
            password: None,
            max_tokens: 2000,
            endpoint: None,
            completion_window: "24h".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            initial_poll_delay: Duration::from_secs(30),
            poll_interval: Duration::from_secs(60),
            poll_timeout: None,
            missing_page_policy: MissingPagePolicy::default(),
            clean_output: true,
            cleanup_remote_files: true,
            max_retries: 3,
            retry_backoff_ms: 500,
            download_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for ParallexConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallexConfig")
            .field("model", &self.model)
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("concurrency", &self.concurrency)
            .field("log_level", &self.log_level)
            .field("post_process", &self.post_process.as_ref().map(|_| "<dyn PostProcess>"))
            .field("max_tokens", &self.max_tokens)
            .field("endpoint", &self.endpoint)
            .field("completion_window", &self.completion_window)
            .field("initial_poll_delay", &self.initial_poll_delay)
            .field("poll_interval", &self.poll_interval)
            .field("poll_timeout", &self.poll_timeout)
            .field("missing_page_policy", &self.missing_page_policy)
            .field("cleanup_remote_files", &self.cleanup_remote_files)
            .finish()
    }
}

impl ParallexConfig {
    /// Create a new builder for `ParallexConfig`.
    pub fn builder() -> ParallexConfigBuilder {
        ParallexConfigBuilder {
            config: Self::default(),
        }
    }

    /// Poll loop timing derived from this config.
    pub fn poll_options(&self) -> PollOptions {
        PollOptions {
            initial_delay: self.initial_poll_delay,
            interval: self.poll_interval,
            timeout: self.poll_timeout,
        }
    }

    /// The model to put in batch lines: configured, else from the environment.
    pub fn resolve_model(&self) -> Result<String, ParallexError> {
        if let Some(ref model) = self.model {
            return Ok(model.clone());
        }
        match std::env::var("AZURE_OPENAI_API_DEPLOYMENT") {
            Ok(deployment) if !deployment.is_empty() => Ok(deployment),
            _ => Err(ParallexError::InvalidConfig(
                "No model configured. Pass a model or set AZURE_OPENAI_API_DEPLOYMENT.".into(),
            )),
        }
    }
}

/// Builder for [`ParallexConfig`].
pub struct ParallexConfigBuilder {
    config: ParallexConfig,
}

impl fmt::Debug for ParallexConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallexConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ParallexConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn BatchProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn prompt_text(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt_text = Some(prompt.into());
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = level;
        self
    }

    pub fn post_process(mut self, callable: Arc<dyn PostProcess>) -> Self {
        self.config.post_process = Some(callable);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = Some(endpoint.into());
        self
    }

    pub fn completion_window(mut self, window: impl Into<String>) -> Self {
        self.config.completion_window = window.into();
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn initial_poll_delay(mut self, delay: Duration) -> Self {
        self.config.initial_poll_delay = delay;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.config.poll_timeout = Some(timeout);
        self
    }

    pub fn missing_page_policy(mut self, policy: MissingPagePolicy) -> Self {
        self.config.missing_page_policy = policy;
        self
    }

    pub fn clean_output(mut self, v: bool) -> Self {
        self.config.clean_output = v;
        self
    }

    pub fn cleanup_remote_files(mut self, v: bool) -> Self {
        self.config.cleanup_remote_files = v;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ParallexConfig, ParallexError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(ParallexError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.poll_interval.is_zero() {
            return Err(ParallexError::InvalidConfig(
                "Poll interval must be greater than zero".into(),
            ));
        }
        if matches!(c.model.as_deref(), Some("")) {
            return Err(ParallexError::InvalidConfig("Model must not be empty".into()));
        }
        if c.max_upload_bytes == 0 {
            return Err(ParallexError::InvalidConfig(
                "Upload limit must be greater than zero".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What happens to a file when some of its pages got no response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPagePolicy {
    /// Return the answered pages; list the rest in `missing_pages`. (default)
    #[default]
    Partial,
    /// Fail the whole file with [`ParallexError::MissingResponses`].
    Fail,
}

/// Log verbosity, from quietest to loudest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ParallexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(ParallexError::InvalidConfig(format!(
                "Unknown log level '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ParallexConfig::default();
        assert_eq!(c.concurrency, 20);
        assert_eq!(c.max_tokens, 2000);
        assert_eq!(c.completion_window, "24h");
        assert_eq!(c.max_upload_bytes, 150 * 1024 * 1024);
        assert_eq!(c.log_level, LogLevel::Error);
        assert_eq!(c.missing_page_policy, MissingPagePolicy::Partial);
        assert!(c.cleanup_remote_files);
        assert!(c.poll_timeout.is_none());
    }

    #[test]
    fn builder_clamps_concurrency() {
        let c = ParallexConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn builder_rejects_zero_interval() {
        let r = ParallexConfig::builder()
            .poll_interval(Duration::ZERO)
            .build();
        assert!(matches!(r, Err(ParallexError::InvalidConfig(_))));
    }

    #[test]
    fn builder_rejects_empty_model() {
        assert!(ParallexConfig::builder().model("").build().is_err());
    }

    #[test]
    fn poll_options_follow_config() {
        let c = ParallexConfig::builder()
            .initial_poll_delay(Duration::ZERO)
            .poll_interval(Duration::from_secs(5))
            .poll_timeout(Duration::from_secs(60))
            .build()
            .unwrap();
        let p = c.poll_options();
        assert_eq!(p.initial_delay, Duration::ZERO);
        assert_eq!(p.interval, Duration::from_secs(5));
        assert_eq!(p.timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn configured_model_wins() {
        let c = ParallexConfig::builder().model("gpt-4o-mini").build().unwrap();
        assert_eq!(c.resolve_model().unwrap(), "gpt-4o-mini");
    }

    #[test]
    fn log_level_parsing() {
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Debug.as_filter(), "debug");
    }
}
