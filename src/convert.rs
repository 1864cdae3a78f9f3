//! Top-level entry points: one PDF in, one [`ParallexCallableOutput`] out.
//!
//! Each call runs as a single logical task. Rasterisation and PNG encoding fan
//! out up to `concurrency`; after that the file's one batch job is submitted,
//! polled and correlated strictly in order. Nothing is shared between calls
//! except the provider handle, so callers may run many files at once, e.g.
//! with `futures::future::join_all`.

use crate::batch::{
    correlate, ensure_succeeded, submit_batch, wait_for_terminal, BatchJob, Correlation,
    RemoteFiles, SubmitOptions,
};
use crate::config::{MissingPagePolicy, ParallexConfig};
use crate::error::ParallexError;
use crate::output::ParallexCallableOutput;
use crate::pipeline::encode::{encode_pages, BatchRequestRecord, Page};
use crate::pipeline::{input, postprocess, render};
use crate::progress::{BatchProgressCallback, NoopProgressCallback};
use crate::prompts;
use crate::provider::{BatchProvider, LineOptions, OpenAiBatchClient};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where a set of pages came from, carried into the output unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    pub file_name: String,
    pub pdf_source_url: String,
}

/// Convert a PDF file or URL into per-page Markdown through a batch job.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `pdf_source_url`: Local file path or HTTP/HTTPS URL to a PDF
/// * `config`: Conversion configuration
///
/// # Returns
/// `Ok(ParallexCallableOutput)` once the batch job succeeded. Pages without a
/// response are listed in `missing_pages` unless the policy is
/// [`MissingPagePolicy::Fail`].
///
/// # Errors
/// Returns `Err(ParallexError)` for anything fatal to this file: an unreadable
/// PDF, a rejected submission, a failed or expired job, a poll timeout, or an
/// error from the post-processing capability.
pub async fn parallex(
    pdf_source_url: impl AsRef<str>,
    config: &ParallexConfig,
) -> Result<ParallexCallableOutput, ParallexError> {
    let total_start = Instant::now();
    let source = pdf_source_url.as_ref();
    info!("Starting batch conversion: {}", source);

    // ── Step 1: Get/create provider ──────────────────────────────────────
    let provider = resolve_provider(config)?;

    // ── Step 2: Resolve input ────────────────────────────────────────────
    let resolved = input::resolve_input(source, config.download_timeout_secs).await?;

    // ── Step 3: Rasterise + encode pages ─────────────────────────────────
    let render_start = Instant::now();
    let pages = render::render_pages(resolved.path(), config).await?;
    info!(
        "Rendered {} pages in {}ms",
        pages.len(),
        render_start.elapsed().as_millis()
    );

    if resolved.is_downloaded() {
        debug!("Downloaded {} to {}", resolved.source(), resolved.path().display());
    }
    let document = DocumentInfo {
        file_name: resolved.file_name().to_string(),
        pdf_source_url: resolved.source().to_string(),
    };
    // Rendering is done; a downloaded PDF can go.
    drop(resolved);

    // ── Step 4: Batch lifecycle ──────────────────────────────────────────
    let trace_id = Uuid::new_v4();
    let output = process_pages(provider.as_ref(), document, pages, trace_id, config).await?;

    info!(
        "Conversion complete: {}/{} pages answered, {}ms total - {}",
        output.pages.len(),
        output.pages.len() + output.missing_pages.len(),
        total_start.elapsed().as_millis(),
        trace_id
    );
    Ok(output)
}

/// Run already-rasterised pages through one batch job.
///
/// Encodes every page under `trace_id`, submits a single batch, polls it to a
/// terminal status, correlates the results and assembles the output. Provider
/// files created on the way are deleted afterwards when
/// `config.cleanup_remote_files` is set, whether or not the batch succeeded.
/// After a poll timeout they are kept, since the job may still be reading them.
pub async fn process_pages(
    provider: &dyn BatchProvider,
    document: DocumentInfo,
    pages: Vec<Page>,
    trace_id: Uuid,
    config: &ParallexConfig,
) -> Result<ParallexCallableOutput, ParallexError> {
    let progress: &dyn BatchProgressCallback = match config.progress_callback {
        Some(ref cb) => cb.as_ref(),
        None => &NoopProgressCallback,
    };

    let prompt = prompts::prompt_or_default(config.prompt_text.as_deref());
    let records = encode_pages(&pages, prompt, trace_id)?;
    let model = config.resolve_model()?;
    let submitted: Vec<u32> = pages.iter().map(|p| p.page_number).collect();
    drop(pages);
    progress.on_pages_ready(submitted.len());

    let options = SubmitOptions {
        line: LineOptions {
            model,
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| provider.default_endpoint().to_string()),
            max_tokens: config.max_tokens,
        },
        completion_window: config.completion_window.clone(),
        max_upload_bytes: config.max_upload_bytes,
    };

    let mut remote_files = RemoteFiles::new();
    let result = run_batch(
        provider,
        &records,
        &submitted,
        trace_id,
        &options,
        config,
        progress,
        &mut remote_files,
    )
    .await;

    let keep_for_running_job = matches!(result, Err(ParallexError::PollTimeout { .. }));
    if config.cleanup_remote_files && !keep_for_running_job {
        remote_files.delete_all(provider).await;
    } else if !remote_files.ids().is_empty() {
        info!(
            "Keeping {} provider file(s) - {}: {:?}",
            remote_files.ids().len(),
            trace_id,
            remote_files.ids()
        );
    }

    let Correlation {
        mut responses,
        missing_pages,
        errors,
    } = result?;

    if config.clean_output {
        for response in &mut responses {
            response.output_content = postprocess::clean_output(&response.output_content);
        }
    }
    progress.on_output_ready(responses.len(), missing_pages.len());
    for error in &errors {
        if let Some(page) = error.page() {
            debug!("Page {} has no content: {} - {}", page, error, trace_id);
        }
    }

    if !missing_pages.is_empty() {
        match config.missing_page_policy {
            MissingPagePolicy::Fail => {
                return Err(ParallexError::MissingResponses {
                    pages: missing_pages,
                });
            }
            MissingPagePolicy::Partial => warn!(
                "{} of {} pages have no response - {}: {:?}",
                missing_pages.len(),
                submitted.len(),
                trace_id,
                missing_pages
            ),
        }
    }

    let output = ParallexCallableOutput {
        file_name: document.file_name,
        pdf_source_url: document.pdf_source_url,
        trace_id,
        pages: responses,
        missing_pages,
        page_errors: errors,
    };

    if let Some(ref callable) = config.post_process {
        debug!("Running post-process - {}", trace_id);
        callable.invoke(&output).map_err(ParallexError::PostProcess)?;
    }

    Ok(output)
}

/// Submit, poll and correlate. Every created file lands in `remote_files`,
/// including the outputs of a job that did not succeed.
#[allow(clippy::too_many_arguments)]
async fn run_batch(
    provider: &dyn BatchProvider,
    records: &[BatchRequestRecord],
    submitted: &[u32],
    trace_id: Uuid,
    options: &SubmitOptions,
    config: &ParallexConfig,
    progress: &dyn BatchProgressCallback,
    remote_files: &mut RemoteFiles,
) -> Result<Correlation, ParallexError> {
    let job = submit_batch(provider, records, trace_id, options, remote_files).await?;
    progress.on_batch_submitted(&job.job_id, records.len());

    let finished = wait_for_terminal(provider, job, &config.poll_options(), progress).await?;
    // Failed and expired jobs may still have produced files.
    for file_id in [&finished.output_file_id, &finished.error_file_id]
        .into_iter()
        .flatten()
    {
        remote_files.push(file_id.clone());
    }
    let job = ensure_succeeded(finished)?;
    let raw = download_results(provider, &job).await?;

    let correlation = correlate(provider, &raw, submitted, trace_id);
    if correlation.orphan_count() > 0 {
        warn!(
            "Ignored {} orphan record(s) in batch {} - {}",
            correlation.orphan_count(),
            job.job_id,
            trace_id
        );
    }
    Ok(correlation)
}

/// Fetch the output file and the error file of a finished job as one JSONL text.
async fn download_results(
    provider: &dyn BatchProvider,
    job: &BatchJob,
) -> Result<String, ParallexError> {
    let mut raw = String::new();
    for file_id in [&job.output_file_id, &job.error_file_id]
        .into_iter()
        .flatten()
    {
        let content =
            provider
                .file_content(file_id)
                .await
                .map_err(|source| ParallexError::Provider {
                    operation: "file_content",
                    job_id: job.job_id.clone(),
                    source,
                })?;
        debug!("Downloaded {} ({} bytes) for batch {}", file_id, content.len(), job.job_id);
        raw.push_str(&content);
        if !raw.ends_with('\n') {
            raw.push('\n');
        }
    }

    if job.output_file_id.is_none() {
        warn!("Batch {} succeeded without an output file", job.job_id);
    }
    Ok(raw)
}

/// Convert a PDF and write the JSON output directly to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn parallex_to_file(
    pdf_source_url: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ParallexConfig,
) -> Result<ParallexCallableOutput, ParallexError> {
    let output = parallex(pdf_source_url, config).await?;
    let path = output_path.as_ref();
    let write_failed = |e: std::io::Error| ParallexError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
        }
    }

    let json = serde_json::to_vec_pretty(&output)
        .map_err(|e| ParallexError::Internal(format!("Failed to serialise output: {e}")))?;

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json)
        .await
        .map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(write_failed)?;

    Ok(output)
}

/// Synchronous wrapper around [`parallex`].
///
/// Creates a temporary tokio runtime internally. Must not be called from
/// inside an async context.
pub fn parallex_sync(
    pdf_source_url: impl AsRef<str>,
    config: &ParallexConfig,
) -> Result<ParallexCallableOutput, ParallexError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ParallexError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(parallex(pdf_source_url, config))
}

/// The configured provider, or one built from the environment.
pub fn resolve_provider(config: &ParallexConfig) -> Result<Arc<dyn BatchProvider>, ParallexError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let client = OpenAiBatchClient::from_env()?
        .with_retries(config.max_retries, config.retry_backoff_ms);
    info!("Using {} batch provider from environment", client.name());
    Ok(Arc::new(client))
}
