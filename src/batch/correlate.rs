//! Response correlation: map batch output records back to pages.
//!
//! The provider returns output lines in whatever order it finished them, and
//! may return fewer lines than were submitted (a request failed, or the job
//! expired half-way) or lines we never asked for. Correlation is therefore
//! keyed purely on `custom_id`, and every submitted page ends up in exactly
//! one of two places: [`Correlation::responses`] or
//! [`Correlation::missing_pages`].

use crate::error::PageError;
use crate::output::PageResponse;
use crate::pipeline::encode::decode_custom_id;
use crate::provider::{BatchProvider, RecordOutcome};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;
use uuid::Uuid;

/// Result of matching a batch's output against the submitted pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Correlation {
    /// One response per answered page, ascending by page number.
    pub responses: Vec<PageResponse>,
    /// Submitted pages without a usable response, ascending.
    pub missing_pages: Vec<u32>,
    /// Orphan and malformed records in encounter order, then one error per
    /// missing page.
    pub errors: Vec<PageError>,
}

impl Correlation {
    /// Number of records that matched no submitted page.
    pub fn orphan_count(&self) -> usize {
        self.errors
            .iter()
            .filter(|e| matches!(e, PageError::OrphanResponse { .. }))
            .count()
    }
}

/// Match raw JSONL output against the submitted page numbers.
///
/// `raw_output` may be the concatenation of the job's output file and error
/// file. Lines are decoded with the provider's line format. Unknown, foreign
/// or duplicate custom_ids become [`PageError::OrphanResponse`] and are
/// otherwise ignored; nothing here is fatal.
pub fn correlate(
    provider: &dyn BatchProvider,
    raw_output: &str,
    submitted: &[u32],
    trace_id: Uuid,
) -> Correlation {
    let submitted: BTreeSet<u32> = submitted.iter().copied().collect();
    let mut answered: BTreeMap<u32, String> = BTreeMap::new();
    let mut failed: BTreeMap<u32, String> = BTreeMap::new();
    let mut errors = Vec::new();

    for (idx, line) in raw_output.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record = match provider.decode_line(line) {
            Ok(record) => record,
            Err(detail) => {
                warn!("Skipping malformed output line {} - {}: {}", idx + 1, trace_id, detail);
                errors.push(PageError::MalformedRecord {
                    line: idx + 1,
                    detail,
                });
                continue;
            }
        };

        let orphan = |reason: String| {
            warn!(
                "Orphan response '{}' - {}: {}",
                record.custom_id, trace_id, reason
            );
            PageError::OrphanResponse {
                custom_id: record.custom_id.clone(),
                reason,
            }
        };

        let page = match decode_custom_id(&record.custom_id) {
            Ok((trace, _)) if trace != trace_id => {
                errors.push(orphan(format!("belongs to trace {trace}")));
                continue;
            }
            Ok((_, page)) if !submitted.contains(&page) => {
                errors.push(orphan(format!("page {page} was not submitted")));
                continue;
            }
            Ok((_, page)) => page,
            Err(e) => {
                errors.push(orphan(e.to_string()));
                continue;
            }
        };

        if answered.contains_key(&page) {
            errors.push(orphan(format!("duplicate response for page {page}")));
            continue;
        }

        match record.outcome {
            RecordOutcome::Content(content) => {
                failed.remove(&page);
                answered.insert(page, content);
            }
            RecordOutcome::Failed(detail) => {
                if failed.contains_key(&page) {
                    errors.push(orphan(format!("duplicate failure for page {page}")));
                } else {
                    failed.insert(page, detail);
                }
            }
        }
    }

    let mut missing_pages = Vec::new();
    for &page in &submitted {
        if answered.contains_key(&page) {
            continue;
        }
        missing_pages.push(page);
        match failed.remove(&page) {
            Some(detail) => {
                warn!("Page {} request failed - {}: {}", page, trace_id, detail);
                errors.push(PageError::RequestFailed { page, detail });
            }
            None => {
                warn!("Page {} has no response - {}", page, trace_id);
                errors.push(PageError::MissingResponse { page });
            }
        }
    }

    let responses = answered
        .into_iter()
        .map(|(page_number, output_content)| PageResponse {
            page_number,
            output_content,
        })
        .collect();

    Correlation {
        responses,
        missing_pages,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchJob, RemoteFile};
    use crate::error::ProviderError;
    use crate::pipeline::encode::encode_custom_id;
    use crate::provider::CreateBatchRequest;
    use async_trait::async_trait;

    /// Speaks the default line format; every network call fails.
    struct FormatOnly;

    #[async_trait]
    impl BatchProvider for FormatOnly {
        fn name(&self) -> &str {
            "format-only"
        }
        async fn upload_batch_input(&self, _: &str, _: Vec<u8>) -> Result<RemoteFile, ProviderError> {
            Err(ProviderError::new("offline"))
        }
        async fn create_batch(&self, _: &CreateBatchRequest) -> Result<BatchJob, ProviderError> {
            Err(ProviderError::new("offline"))
        }
        async fn retrieve_batch(&self, _: &str) -> Result<BatchJob, ProviderError> {
            Err(ProviderError::new("offline"))
        }
        async fn file_content(&self, _: &str) -> Result<String, ProviderError> {
            Err(ProviderError::new("offline"))
        }
        async fn delete_file(&self, _: &str) -> Result<(), ProviderError> {
            Err(ProviderError::new("offline"))
        }
    }

    fn ok_line(custom_id: &str, content: &str) -> String {
        serde_json::json!({
            "id": "req",
            "custom_id": custom_id,
            "response": {"status_code": 200, "body": {"choices": [{"message": {"content": content}}]}},
            "error": null
        })
        .to_string()
    }

    fn err_line(custom_id: &str) -> String {
        serde_json::json!({
            "custom_id": custom_id,
            "response": null,
            "error": {"code": "server_error", "message": "boom"}
        })
        .to_string()
    }

    #[test]
    fn out_of_order_output_is_sorted() {
        let trace = Uuid::new_v4();
        let raw = [3, 1, 2]
            .iter()
            .map(|&p| ok_line(&encode_custom_id(trace, p), &format!("page {p}")))
            .collect::<Vec<_>>()
            .join("\n");

        let c = correlate(&FormatOnly, &raw, &[1, 2, 3], trace);
        let pages: Vec<u32> = c.responses.iter().map(|r| r.page_number).collect();
        assert_eq!(pages, vec![1, 2, 3]);
        assert_eq!(c.responses[2].output_content, "page 3");
        assert!(c.missing_pages.is_empty());
        assert!(c.errors.is_empty());
    }

    #[test]
    fn empty_content_is_a_response_not_missing() {
        let trace = Uuid::new_v4();
        let raw = ok_line(&encode_custom_id(trace, 1), "");
        let c = correlate(&FormatOnly, &raw, &[1], trace);
        assert_eq!(c.responses.len(), 1);
        assert_eq!(c.responses[0].output_content, "");
        assert!(c.missing_pages.is_empty());
    }

    #[test]
    fn failed_request_counts_as_missing_with_reason() {
        let trace = Uuid::new_v4();
        let raw = format!(
            "{}\n{}",
            ok_line(&encode_custom_id(trace, 1), "one"),
            err_line(&encode_custom_id(trace, 2))
        );
        let c = correlate(&FormatOnly, &raw, &[1, 2], trace);
        assert_eq!(c.missing_pages, vec![2]);
        assert_eq!(
            c.errors,
            vec![PageError::RequestFailed {
                page: 2,
                detail: "server_error: boom".into()
            }]
        );
    }

    #[test]
    fn foreign_trace_and_duplicates_are_orphans() {
        let trace = Uuid::new_v4();
        let other = Uuid::new_v4();
        let raw = [
            ok_line(&encode_custom_id(trace, 1), "first"),
            ok_line(&encode_custom_id(trace, 1), "second"),
            ok_line(&encode_custom_id(other, 1), "foreign"),
            ok_line(&encode_custom_id(trace, 9), "unsubmitted"),
            ok_line("garbage-id", "?"),
        ]
        .join("\n");

        let c = correlate(&FormatOnly, &raw, &[1], trace);
        assert_eq!(c.responses.len(), 1);
        assert_eq!(c.responses[0].output_content, "first");
        assert_eq!(c.orphan_count(), 4);
    }

    #[test]
    fn malformed_lines_are_reported_with_line_numbers() {
        let trace = Uuid::new_v4();
        let raw = format!("\n{{not json\n{}\n", ok_line(&encode_custom_id(trace, 1), "x"));
        let c = correlate(&FormatOnly, &raw, &[1], trace);
        assert_eq!(c.responses.len(), 1);
        assert!(matches!(
            c.errors.as_slice(),
            [PageError::MalformedRecord { line: 2, .. }]
        ));
    }

    #[test]
    fn success_supersedes_earlier_failure() {
        let trace = Uuid::new_v4();
        let id = encode_custom_id(trace, 1);
        let raw = format!("{}\n{}", err_line(&id), ok_line(&id, "recovered"));
        let c = correlate(&FormatOnly, &raw, &[1], trace);
        assert_eq!(c.responses[0].output_content, "recovered");
        assert!(c.missing_pages.is_empty());
        assert!(c.errors.is_empty());
    }
}
