//! Output types returned to callers.

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The model's answer for one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResponse {
    pub page_number: u32,
    /// Markdown for the page. Empty when the model could not read it.
    pub output_content: String,
}

/// Everything produced for one PDF.
///
/// `pages` holds every answered page in ascending order. Pages that were
/// submitted but got no usable response are listed in `missing_pages`, with
/// the reason in `page_errors`; they are never silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallexCallableOutput {
    pub file_name: String,
    pub pdf_source_url: String,
    /// Generated once per file; embedded in every custom_id of its batch.
    pub trace_id: Uuid,
    pub pages: Vec<PageResponse>,
    #[serde(default)]
    pub missing_pages: Vec<u32>,
    #[serde(default)]
    pub page_errors: Vec<PageError>,
}

impl ParallexCallableOutput {
    /// Whether every submitted page has a response.
    pub fn is_complete(&self) -> bool {
        self.missing_pages.is_empty()
    }

    /// Join page contents in page order.
    ///
    /// Empty pages keep their slot, so the separators still line up with
    /// the answered pages.
    pub fn markdown(&self, separator: &str) -> String {
        self.pages
            .iter()
            .map(|p| p.output_content.trim_end())
            .collect::<Vec<_>>()
            .join(separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(contents: &[&str]) -> ParallexCallableOutput {
        ParallexCallableOutput {
            file_name: "doc.pdf".into(),
            pdf_source_url: "https://example.com/doc.pdf".into(),
            trace_id: Uuid::new_v4(),
            pages: contents
                .iter()
                .enumerate()
                .map(|(i, c)| PageResponse {
                    page_number: i as u32 + 1,
                    output_content: c.to_string(),
                })
                .collect(),
            missing_pages: vec![],
            page_errors: vec![],
        }
    }

    #[test]
    fn markdown_joins_every_page_in_order() {
        let out = output(&["# One\n", "", "Two"]);
        assert_eq!(out.markdown("\n---\n"), "# One\n---\n\n---\nTwo");
    }

    #[test]
    fn serialises_page_errors_tagged() {
        let mut out = output(&["a"]);
        out.missing_pages = vec![2];
        out.page_errors = vec![PageError::MissingResponse { page: 2 }];
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["page_errors"][0]["kind"], "missing_response");
        assert_eq!(json["page_errors"][0]["page"], 2);
        assert!(!out.is_complete());

        let back: ParallexCallableOutput = serde_json::from_value(json).unwrap();
        assert_eq!(back, out);
    }
}
