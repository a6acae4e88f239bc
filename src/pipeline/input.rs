//! Input resolution: normalise a path, URL or uploaded bytes to a local file.
//!
//! ## Why always a file?
//!
//! pdfium opens documents by path. URLs are downloaded and uploads are
//! spilled into temp storage owned by [`ResolvedInput`], so cleanup happens
//! when it is dropped. Every source is checked for the `%PDF` magic before
//! it reaches the rasterizer so callers get [`Pdf2HandError::NotAPdf`]
//! rather than a backend parse error.

use crate::error::Pdf2HandError;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// The resolved input: a local path, a downloaded file or a spilled upload.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the `TempDir` keeps the download alive.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
    /// Input was an in-memory upload written to a managed temp file.
    Uploaded(NamedTempFile),
}

impl ResolvedInput {
    /// Path to the PDF file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
            ResolvedInput::Uploaded(f) => f.path(),
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local PDF file path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2HandError> {
    if input.trim().is_empty() {
        return Err(Pdf2HandError::InvalidInput {
            input: input.to_string(),
            reason: "no input given".into(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Spill uploaded bytes into a temp file.
///
/// An upload too short to hold the PDF magic is an input error, as is
/// anything without it.
pub fn resolve_bytes(bytes: &[u8]) -> Result<ResolvedInput, Pdf2HandError> {
    if bytes.is_empty() {
        return Err(Pdf2HandError::InvalidInput {
            input: "<upload>".into(),
            reason: "uploaded file is empty".into(),
        });
    }
    if bytes.len() < PDF_MAGIC.len() {
        return Err(Pdf2HandError::InvalidInput {
            input: "<upload>".into(),
            reason: format!("uploaded file is only {} bytes", bytes.len()),
        });
    }
    check_magic(bytes, Path::new("<upload>"))?;

    let mut tmp = tempfile::Builder::new()
        .prefix("pdf2hand-upload-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| Pdf2HandError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.flush())
        .map_err(|e| Pdf2HandError::Internal(format!("tempfile write: {e}")))?;

    debug!("Upload spilled to {}", tmp.path().display());
    Ok(ResolvedInput::Uploaded(tmp))
}

fn check_magic(bytes: &[u8], path: &Path) -> Result<(), Pdf2HandError> {
    if bytes.len() >= 4 && &bytes[..4] != PDF_MAGIC {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(Pdf2HandError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

/// Resolve a local file path, validating existence and PDF magic bytes.
fn resolve_local(path_str: &str) -> Result<ResolvedInput, Pdf2HandError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(Pdf2HandError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() {
                check_magic(&magic, &path)?;
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2HandError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(Pdf2HandError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2HandError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| Pdf2HandError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Pdf2HandError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let filename = filename_from_url(url);
    let temp_dir = TempDir::new().map_err(|e| Pdf2HandError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    check_magic(&bytes, &file_path)?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| Pdf2HandError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
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

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_falls_back_without_extension() {
        assert_eq!(filename_from_url("https://x.org/files/a.pdf"), "a.pdf");
        assert_eq!(filename_from_url("https://x.org/download"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn missing_local_file() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.err().unwrap();
        assert!(matches!(err, Pdf2HandError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn local_non_pdf_is_rejected() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"hello world").unwrap();
        let err = resolve_input(f.path().to_str().unwrap(), 5)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Pdf2HandError::NotAPdf { magic, .. } if &magic == b"hell"));
    }

    #[test]
    fn empty_upload_is_rejected() {
        let err = resolve_bytes(&[]).err().unwrap();
        assert!(matches!(err, Pdf2HandError::InvalidInput { .. }));
    }

    #[test]
    fn truncated_upload_is_rejected() {
        for bytes in [&b"a"[..], &b"ab"[..], &b"%PD"[..]] {
            let err = resolve_bytes(bytes).err().unwrap();
            assert!(
                matches!(err, Pdf2HandError::InvalidInput { ref reason, .. } if reason.contains("bytes")),
                "{bytes:?}: {err}"
            );
        }
    }

    #[test]
    fn upload_is_spilled_to_disk() {
        let resolved = resolve_bytes(b"%PDF-1.7\n%%EOF\n").unwrap();
        let on_disk = std::fs::read(resolved.path()).unwrap();
        assert!(on_disk.starts_with(b"%PDF"));
    }
}
