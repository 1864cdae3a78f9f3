//! Upload encoding: rasterised pages → batch request records.
//!
//! Every record carries a `custom_id` built from the file's trace id and the
//! page number. The provider echoes it back untouched on each output line, so
//! it is the only thing that ties a response to its page. The encoding is
//! `"{trace_id}--page--{page_number}"`: a hyphenated UUID never contains a
//! double hyphen and a page number is all digits, so the delimiter can appear
//! exactly once and decoding is unambiguous.

use crate::error::ParallexError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::collections::HashSet;
use std::io::Cursor;
use tracing::debug;
use uuid::Uuid;

/// Separator between the trace id and the page number in a custom_id.
pub const CUSTOM_ID_DELIMITER: &str = "--page--";

/// Encoded image bytes for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            mime_type: "image/png".to_string(),
            bytes,
        }
    }

    /// `data:` URL carrying the base64 image, as vision endpoints expect.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }
}

/// One rasterised PDF page. Page numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub page_number: u32,
    pub image: ImagePayload,
}

/// One line of batch input: a prompt plus a page image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequestRecord {
    /// Correlation key; see [`encode_custom_id`].
    pub custom_id: String,
    pub prompt: String,
    /// Image as a `data:` URL.
    pub image_payload: String,
}

/// Build the correlation key for a page.
pub fn encode_custom_id(trace_id: Uuid, page_number: u32) -> String {
    format!("{}{}{}", trace_id.hyphenated(), CUSTOM_ID_DELIMITER, page_number)
}

/// Recover `(trace_id, page_number)` from a correlation key.
pub fn decode_custom_id(custom_id: &str) -> Result<(Uuid, u32), ParallexError> {
    let (trace, page) = custom_id.split_once(CUSTOM_ID_DELIMITER).ok_or_else(|| {
        ParallexError::Validation(format!("custom_id '{custom_id}' has no page delimiter"))
    })?;

    let trace_id = Uuid::parse_str(trace).map_err(|e| {
        ParallexError::Validation(format!("custom_id '{custom_id}' has a bad trace id: {e}"))
    })?;

    if page.is_empty() || !page.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParallexError::Validation(format!(
            "custom_id '{custom_id}' has a non-numeric page number"
        )));
    }
    let page_number: u32 = page.parse().map_err(|e| {
        ParallexError::Validation(format!("custom_id '{custom_id}' page number: {e}"))
    })?;
    if page_number == 0 {
        return Err(ParallexError::Validation(format!(
            "custom_id '{custom_id}' has page number 0"
        )));
    }

    Ok((trace_id, page_number))
}

/// Check that a page set can be submitted: non-empty, positive and unique page numbers.
pub fn validate_pages(pages: &[Page]) -> Result<(), ParallexError> {
    if pages.is_empty() {
        return Err(ParallexError::Validation("no pages to submit".into()));
    }
    let mut seen = HashSet::with_capacity(pages.len());
    for page in pages {
        if page.page_number == 0 {
            return Err(ParallexError::Validation(
                "page numbers are 1-based; got page 0".into(),
            ));
        }
        if !seen.insert(page.page_number) {
            return Err(ParallexError::Validation(format!(
                "page {} appears more than once",
                page.page_number
            )));
        }
    }
    Ok(())
}

/// Turn pages into batch records, one per page, in input order.
pub fn encode_pages(
    pages: &[Page],
    prompt: &str,
    trace_id: Uuid,
) -> Result<Vec<BatchRequestRecord>, ParallexError> {
    validate_pages(pages)?;

    let records: Vec<BatchRequestRecord> = pages
        .iter()
        .map(|page| BatchRequestRecord {
            custom_id: encode_custom_id(trace_id, page.page_number),
            prompt: prompt.to_string(),
            image_payload: page.image.to_data_url(),
        })
        .collect();

    debug!("Encoded {} batch records for {}", records.len(), trace_id);
    Ok(records)
}

/// PNG-encode a rendered page.
///
/// PNG is lossless; JPEG artefacts around glyph edges hurt OCR accuracy far
/// more than the larger upload costs.
pub fn encode_png(img: &DynamicImage) -> Result<ImagePayload, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded page image → {} bytes PNG", buf.len());
    Ok(ImagePayload::png(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn page(n: u32) -> Page {
        Page {
            page_number: n,
            image: ImagePayload::png(vec![1, 2, 3]),
        }
    }

    #[test]
    fn custom_id_round_trips() {
        let trace = Uuid::new_v4();
        for n in [1, 2, 10, 999, u32::MAX] {
            let id = encode_custom_id(trace, n);
            assert_eq!(decode_custom_id(&id).unwrap(), (trace, n));
        }
    }

    #[test]
    fn custom_id_rejects_malformed() {
        let trace = Uuid::new_v4();
        assert!(decode_custom_id("nothing-here").is_err());
        assert!(decode_custom_id(&format!("{trace}--page--0")).is_err());
        assert!(decode_custom_id(&format!("{trace}--page--")).is_err());
        assert!(decode_custom_id(&format!("{trace}--page--+3")).is_err());
        assert!(decode_custom_id(&format!("{trace}--page--3.jsonl")).is_err());
        assert!(decode_custom_id("not-a-uuid--page--3").is_err());
    }

    #[test]
    fn encode_pages_builds_one_record_per_page() {
        let trace = Uuid::new_v4();
        let records = encode_pages(&[page(1), page(2), page(3)], "prompt", trace).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].custom_id, encode_custom_id(trace, 2));
        assert_eq!(records[0].prompt, "prompt");
        assert_eq!(records[0].image_payload, "data:image/png;base64,AQID");
    }

    #[test]
    fn encode_pages_validation() {
        let trace = Uuid::new_v4();
        assert!(matches!(
            encode_pages(&[], "p", trace),
            Err(ParallexError::Validation(_))
        ));
        assert!(matches!(
            encode_pages(&[page(0)], "p", trace),
            Err(ParallexError::Validation(_))
        ));
        assert!(matches!(
            encode_pages(&[page(1), page(2), page(1)], "p", trace),
            Err(ParallexError::Validation(_))
        ));
    }

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let payload = encode_png(&img).expect("encode should succeed");
        assert_eq!(payload.mime_type, "image/png");
        assert_eq!(&payload.bytes[1..4], b"PNG");
        let url = payload.to_data_url();
        let b64 = url.strip_prefix("data:image/png;base64,").unwrap();
        assert_eq!(STANDARD.decode(b64).unwrap(), payload.bytes);
    }
}
