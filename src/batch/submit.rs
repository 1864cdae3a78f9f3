//! Batch submission: serialize records to JSONL, upload, create the job.

use super::{BatchJob, RemoteFiles};
use crate::error::{ParallexError, SubmissionStage};
use crate::pipeline::encode::BatchRequestRecord;
use crate::provider::{BatchProvider, CreateBatchRequest, LineOptions};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything the submitter needs besides the records.
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    pub line: LineOptions,
    pub completion_window: String,
    /// Largest JSONL payload accepted before contacting the provider.
    pub max_upload_bytes: usize,
}

/// Serialize records as JSONL, one line per record.
pub fn build_jsonl(
    provider: &dyn BatchProvider,
    records: &[BatchRequestRecord],
    options: &LineOptions,
) -> Result<Vec<u8>, ParallexError> {
    let mut jsonl = Vec::new();
    for record in records {
        let line = provider
            .encode_line(record, options)
            .map_err(|e| ParallexError::Internal(e.to_string()))?;
        jsonl.extend_from_slice(line.as_bytes());
        jsonl.push(b'\n');
    }
    Ok(jsonl)
}

/// Upload the records and create one batch job for them.
///
/// The uploaded input file is recorded in `remote_files` as soon as it exists,
/// so it can still be cleaned up if job creation fails. Neither call is
/// retried: both create state on the provider.
pub async fn submit_batch(
    provider: &dyn BatchProvider,
    records: &[BatchRequestRecord],
    trace_id: Uuid,
    options: &SubmitOptions,
    remote_files: &mut RemoteFiles,
) -> Result<BatchJob, ParallexError> {
    if records.is_empty() {
        return Err(ParallexError::Validation("no records to submit".into()));
    }

    let jsonl = build_jsonl(provider, records, &options.line)?;
    if jsonl.len() > options.max_upload_bytes {
        return Err(ParallexError::Submission {
            stage: SubmissionStage::Upload,
            source: crate::error::ProviderError::new(format!(
                "batch input is {} bytes, limit is {} bytes",
                jsonl.len(),
                options.max_upload_bytes
            )),
        });
    }

    let filename = format!("image-{trace_id}.jsonl");
    let jsonl_len = jsonl.len();
    debug!("Uploading {} ({} bytes, {} records)", filename, jsonl_len, records.len());

    let file = provider
        .upload_batch_input(&filename, jsonl)
        .await
        .map_err(|source| {
            if source.is_size_rejection() {
                warn!(
                    "Provider rejected {} as too large ({} bytes) - {}",
                    filename,
                    jsonl_len,
                    trace_id
                );
            }
            ParallexError::Submission {
                stage: SubmissionStage::Upload,
                source,
            }
        })?;
    debug!("Uploaded {} as {}", file.filename, file.id);
    remote_files.push(file.id.clone());

    let mut metadata = BTreeMap::new();
    metadata.insert("trace_id".to_string(), trace_id.to_string());
    let request = CreateBatchRequest {
        input_file_id: file.id,
        endpoint: options.line.endpoint.clone(),
        completion_window: options.completion_window.clone(),
        metadata,
    };

    let job = provider
        .create_batch(&request)
        .await
        .map_err(|source| ParallexError::Submission {
            stage: SubmissionStage::CreateJob,
            source,
        })?;

    info!(
        "Submitted batch {} ({} pages, status {}) - {}",
        job.job_id,
        records.len(),
        job.status,
        trace_id
    );
    Ok(job)
}
