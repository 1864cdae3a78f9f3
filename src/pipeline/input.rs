//! Input resolution: normalise a user-supplied path or URL to a local file.
//!
//! pdfium requires a file-system path, so URL inputs are downloaded into a
//! `TempDir` that lives as long as the [`ResolvedInput`]. The `%PDF` magic
//! bytes are checked before returning so a bad input fails here, before any
//! page is rendered or any batch is submitted.

use crate::error::ParallexError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// A PDF that is ready to render.
#[derive(Debug)]
pub struct ResolvedInput {
    path: PathBuf,
    /// Display name carried into the output.
    file_name: String,
    /// The string the caller passed in, URL or path.
    source: String,
    /// Keeps a downloaded file alive until rendering is done.
    _temp_dir: Option<TempDir>,
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_downloaded(&self) -> bool {
        self._temp_dir.is_some()
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local PDF file path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, ParallexError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, ParallexError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(ParallexError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            match f.read_exact(&mut magic) {
                Ok(()) if &magic != b"%PDF" => {
                    return Err(ParallexError::NotAPdf { path, magic });
                }
                Ok(()) => {}
                Err(_) => {
                    return Err(ParallexError::CorruptPdf {
                        path,
                        detail: "file is shorter than a PDF header".into(),
                    });
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ParallexError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(ParallexError::FileNotFound { path });
        }
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput {
        path,
        file_name,
        source: path_str.to_string(),
        _temp_dir: None,
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, ParallexError> {
    info!("Downloading PDF from: {}", url);

    let download_failed = |reason: String| ParallexError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| download_failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ParallexError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            download_failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(download_failed(format!("HTTP {}", response.status())));
    }

    let file_name = filename_from_url(url);
    let bytes = response
        .bytes()
        .await
        .map_err(|e| download_failed(e.to_string()))?;

    let temp_dir = TempDir::new().map_err(|e| ParallexError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&file_name);

    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(ParallexError::NotAPdf {
            path: file_path,
            magic,
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| ParallexError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(ResolvedInput {
        path: file_path,
        file_name,
        source: url.to_string(),
        _temp_dir: Some(temp_dir),
    })
}

/// Last path segment of the URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_comes_from_last_segment() {
        assert_eq!(filename_from_url("https://x.org/a/b/report.pdf?dl=1"), "report.pdf");
        assert_eq!(filename_from_url("https://x.org/a/b/"), "downloaded.pdf");
        assert_eq!(filename_from_url("https://x.org/download"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn local_pdf_resolves_with_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.pdf");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"%PDF-1.7\n")
            .unwrap();

        let resolved = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(resolved.file_name(), "paper.pdf");
        assert_eq!(resolved.path(), path.as_path());
        assert!(!resolved.is_downloaded());
    }

    #[tokio::test]
    async fn non_pdf_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, b"hello world").unwrap();

        let err = resolve_input(path.to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, ParallexError::NotAPdf { magic, .. } if &magic == b"hell"));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, ParallexError::FileNotFound { .. }));
    }
}
