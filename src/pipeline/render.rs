//! PDF rasterisation: render every page to a PNG [`Page`] via pdfium.
//!
//! pdfium keeps thread-local state and is CPU-bound, so the whole document is
//! rendered inside one `spawn_blocking` task. PNG encoding is independent per
//! page and fans out over the blocking pool, bounded by `concurrency`.
//!
//! `max_rendered_pixels` caps the longest edge regardless of physical page
//! size, keeping request lines well under the provider's upload limit.

use crate::config::ParallexConfig;
use crate::error::ParallexError;
use crate::pipeline::encode::{encode_png, Page};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Render and PNG-encode every page of the PDF, numbered from 1.
pub async fn render_pages(
    pdf_path: &Path,
    config: &ParallexConfig,
) -> Result<Vec<Page>, ParallexError> {
    let path = pdf_path.to_path_buf();
    let max_pixels = config.max_rendered_pixels;
    let password = config.password.clone();

    let images = tokio::task::spawn_blocking(move || {
        rasterise_blocking(&path, max_pixels, password.as_deref())
    })
    .await
    .map_err(|e| ParallexError::Internal(format!("Render task panicked: {}", e)))??;

    encode_all(images, config.concurrency).await
}

/// PNG-encode rendered images with at most `concurrency` encoders in flight.
pub async fn encode_all(
    images: Vec<(u32, DynamicImage)>,
    concurrency: usize,
) -> Result<Vec<Page>, ParallexError> {
    let mut pages: Vec<Page> = stream::iter(images)
        .map(|(page_number, image)| async move {
            let payload = tokio::task::spawn_blocking(move || encode_png(&image))
                .await
                .map_err(|e| ParallexError::Internal(format!("Encode task panicked: {}", e)))?
                .map_err(|e| ParallexError::RasterisationFailed {
                    page: page_number,
                    detail: e.to_string(),
                })?;
            Ok::<_, ParallexError>(Page {
                page_number,
                image: payload,
            })
        })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<_, _>>()?;

    pages.sort_by_key(|p| p.page_number);
    Ok(pages)
}

fn rasterise_blocking(
    pdf_path: &Path,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<Vec<(u32, DynamicImage)>, ParallexError> {
    let pdfium = Pdfium::default();

    let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                ParallexError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                ParallexError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            ParallexError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    let total_pages = pages.len();
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(total_pages as usize);

    for idx in 0..total_pages {
        let page_number = idx as u32 + 1;
        let rasterisation_failed = |e: PdfiumError| ParallexError::RasterisationFailed {
            page: page_number,
            detail: format!("{:?}", e),
        };

        let page = pages.get(idx).map_err(rasterisation_failed)?;
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(rasterisation_failed)?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_number,
            image.width(),
            image.height()
        );

        results.push((page_number, image));
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[tokio::test]
    async fn encode_all_restores_page_order() {
        let images = (1..=5u32)
            .rev()
            .map(|n| (n, DynamicImage::ImageRgb8(RgbImage::new(n, n))))
            .collect();

        let pages = encode_all(images, 2).await.unwrap();
        let numbers: Vec<u32> = pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        assert!(pages.iter().all(|p| p.image.mime_type == "image/png"));
    }

    #[tokio::test]
    async fn encode_all_of_nothing_is_empty() {
        let pages = encode_all(Vec::new(), 4).await.unwrap();
        assert!(pages.is_empty());
    }
}
