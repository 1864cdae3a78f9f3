//! Batch polling: query the provider until the job reaches a terminal status.
//!
//! The loop is the only place the pipeline waits on the provider, and it can
//! wait a long time: batch APIs promise completion within a window (24 h for
//! OpenAI), not a latency. Sleeps go through `tokio::time::sleep`, so dropping
//! the future (e.g. from a `tokio::select!` on a shutdown signal) stops the
//! wait immediately. The remote job is not cancelled in that case.

use super::{BatchJob, BatchStatus};
use crate::error::ParallexError;
use crate::progress::BatchProgressCallback;
use crate::provider::BatchProvider;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// Timing of the poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOptions {
    /// Wait before the first query. Zero queries immediately.
    pub initial_delay: Duration,
    /// Wait between queries while the job is not terminal.
    pub interval: Duration,
    /// Give up after this long. `None` polls forever.
    pub timeout: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(30),
            interval: Duration::from_secs(60),
            timeout: None,
        }
    }
}

/// Query the provider once for the job's current state.
///
/// A job that is already terminal is returned unchanged without a query.
pub async fn poll_once(
    provider: &dyn BatchProvider,
    job: &BatchJob,
) -> Result<BatchJob, ParallexError> {
    if job.status.is_terminal() {
        return Ok(job.clone());
    }
    provider
        .retrieve_batch(&job.job_id)
        .await
        .map_err(|source| ParallexError::Provider {
            operation: "retrieve_batch",
            job_id: job.job_id.clone(),
            source,
        })
}

/// Poll until the job is terminal and return it if it succeeded.
///
/// # Errors
/// - [`ParallexError::BatchJobFailed`] for failed, cancelled or expired jobs
/// - [`ParallexError::PollTimeout`] when `options.timeout` elapses first
/// - [`ParallexError::Provider`] when a status query fails after retries
pub async fn wait_for_completion(
    provider: &dyn BatchProvider,
    job: BatchJob,
    options: &PollOptions,
    progress: &dyn BatchProgressCallback,
) -> Result<BatchJob, ParallexError> {
    let finished = wait_for_terminal(provider, job, options, progress).await?;
    ensure_succeeded(finished)
}

/// Poll until the job reaches any terminal status and return it as reported.
///
/// Unlike [`wait_for_completion`] a failed, cancelled or expired job is
/// returned as `Ok`, so callers can still see the files it produced.
pub async fn wait_for_terminal(
    provider: &dyn BatchProvider,
    job: BatchJob,
    options: &PollOptions,
    progress: &dyn BatchProgressCallback,
) -> Result<BatchJob, ParallexError> {
    let started = Instant::now();
    let job_id = job.job_id.clone();
    let mut last_status = job.status;

    info!("waiting for batch to complete - {}", job_id);
    let poll = poll_until_terminal(provider, job, options, progress, &mut last_status);

    let finished = match options.timeout {
        Some(limit) => match tokio::time::timeout(limit, poll).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ParallexError::PollTimeout {
                    job_id,
                    last_status,
                    elapsed_secs: started.elapsed().as_secs(),
                })
            }
        },
        None => poll.await?,
    };

    progress.on_batch_finished(&finished.job_id, finished.status);
    Ok(finished)
}

/// Turn a terminal job into an error unless it succeeded.
pub fn ensure_succeeded(finished: BatchJob) -> Result<BatchJob, ParallexError> {
    match finished.status {
        BatchStatus::Succeeded => {
            info!("batch completed - {}", finished.job_id);
            Ok(finished)
        }
        status => Err(ParallexError::BatchJobFailed {
            diagnostic: finished
                .diagnostic
                .unwrap_or_else(|| format!("provider reported '{status}' without details")),
            job_id: finished.job_id,
            status,
        }),
    }
}

async fn poll_until_terminal(
    provider: &dyn BatchProvider,
    mut job: BatchJob,
    options: &PollOptions,
    progress: &dyn BatchProgressCallback,
    last_status: &mut BatchStatus,
) -> Result<BatchJob, ParallexError> {
    if job.status.is_terminal() {
        return Ok(job);
    }

    if !options.initial_delay.is_zero() {
        debug!("Batch {}: first poll in {:?}", job.job_id, options.initial_delay);
        sleep(options.initial_delay).await;
    }

    let mut polls = 0u32;
    loop {
        job = poll_once(provider, &job).await?;
        polls += 1;

        if job.status != *last_status {
            info!("Batch {}: {} → {}", job.job_id, last_status, job.status);
        } else {
            debug!("Batch {}: still {} (poll {})", job.job_id, job.status, polls);
        }
        *last_status = job.status;
        progress.on_status(&job.job_id, job.status, polls);

        if job.status.is_terminal() {
            return Ok(job);
        }
        sleep(options.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeeded_job_passes_through() {
        let mut job = BatchJob::new("batch-1", BatchStatus::Succeeded);
        job.output_file_id = Some("file-out".into());
        assert_eq!(ensure_succeeded(job.clone()).unwrap(), job);
    }

    #[test]
    fn cancelled_job_keeps_provider_diagnostic() {
        let mut job = BatchJob::new("batch-1", BatchStatus::Cancelled);
        job.diagnostic = Some("cancelled by user".into());
        match ensure_succeeded(job) {
            Err(ParallexError::BatchJobFailed { status, diagnostic, .. }) => {
                assert_eq!(status, BatchStatus::Cancelled);
                assert_eq!(diagnostic, "cancelled by user");
            }
            other => panic!("expected BatchJobFailed, got {other:?}"),
        }
    }
}
