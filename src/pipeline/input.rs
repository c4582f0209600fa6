//! Source resolution: turn a [`SourceLocation`] into a local PDF path.
//!
//! Local paths pass through after an existence/permission/magic-byte check.
//! URLs are downloaded whole into a temp file in the scratch directory; that
//! file is handed to the [`ResourceJanitor`] before the body is written, so
//! a failed or cancelled download leaves nothing behind.

use crate::error::IngestError;
use crate::output::SourceLocation;
use crate::pipeline::janitor::ResourceJanitor;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A PDF ready for splitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub path: PathBuf,
    /// True when the file is a janitor-owned download.
    pub downloaded: bool,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a source location to a local PDF.
pub async fn resolve_source(
    location: &SourceLocation,
    timeout_secs: u64,
    scratch_dir: &Path,
    janitor: &ResourceJanitor,
) -> Result<ResolvedSource, IngestError> {
    match location {
        SourceLocation::Url(url) => {
            download_url(url, timeout_secs, scratch_dir, janitor).await
        }
        SourceLocation::Path(path) => resolve_local(path),
    }
}

/// Validate a local file: exists, readable, starts with `%PDF`.
fn resolve_local(path: &Path) -> Result<ResolvedSource, IngestError> {
    if path.as_os_str().is_empty() {
        return Err(IngestError::InvalidInput {
            input: String::new(),
        });
    }
    if !path.exists() {
        return Err(IngestError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(IngestError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(IngestError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(IngestError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedSource {
        path: path.to_path_buf(),
        downloaded: false,
    })
}

/// Download a URL into a janitor-tracked temp file.
async fn download_url(
    url: &str,
    timeout_secs: u64,
    scratch_dir: &Path,
    janitor: &ResourceJanitor,
) -> Result<ResolvedSource, IngestError> {
    info!("Downloading PDF from: {}", url);

    if reqwest::Url::parse(url).is_err() {
        return Err(IngestError::InvalidInput {
            input: url.to_string(),
        });
    }

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| IngestError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            IngestError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            IngestError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_err)?;

    if !response.status().is_success() {
        return Err(IngestError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_send_err)?;

    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(IngestError::NotAPdf {
            path: PathBuf::from(url),
            magic,
        });
    }

    let temp = tempfile::Builder::new()
        .prefix("source-")
        .suffix(".pdf")
        .tempfile_in(scratch_dir)
        .map_err(|e| IngestError::Internal(format!("Failed to create temp file: {e}")))?
        .into_temp_path();
    let path = janitor
        .track(temp)
        .ok_or_else(|| IngestError::Internal("run already cleaned up".into()))?;

    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| IngestError::Internal(format!("Failed to write temp file: {e}")))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), path.display());

    Ok(ResolvedSource {
        path,
        downloaded: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[tokio::test]
    async fn local_pdf_passes_through() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"%PDF-1.5\n").unwrap();
        let janitor = ResourceJanitor::new();
        let resolved = resolve_source(
            &SourceLocation::Path(f.path().to_path_buf()),
            5,
            &std::env::temp_dir(),
            &janitor,
        )
        .await
        .unwrap();
        assert_eq!(resolved.path, f.path());
        assert!(!resolved.downloaded);
        assert_eq!(janitor.tracked_count(), 0);
    }

    #[tokio::test]
    async fn missing_local_file_is_reported() {
        let janitor = ResourceJanitor::new();
        let err = resolve_source(
            &SourceLocation::Path("/definitely/not/here.pdf".into()),
            5,
            &std::env::temp_dir(),
            &janitor,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IngestError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn non_pdf_local_file_is_rejected() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"PK\x03\x04zip").unwrap();
        let janitor = ResourceJanitor::new();
        let err = resolve_source(
            &SourceLocation::Path(f.path().to_path_buf()),
            5,
            &std::env::temp_dir(),
            &janitor,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IngestError::NotAPdf { magic, .. } if &magic == b"PK\x03\x04"));
    }

    #[tokio::test]
    async fn failed_download_leaves_no_temp_file() {
        let scratch = TempDir::new().unwrap();
        let janitor = ResourceJanitor::new();
        // Port 9 (discard) on localhost refuses connections on test hosts.
        let err = resolve_source(
            &SourceLocation::Url("http://127.0.0.1:9/doc.pdf".into()),
            2,
            scratch.path(),
            &janitor,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            IngestError::DownloadFailed { .. } | IngestError::DownloadTimeout { .. }
        ));
        assert_eq!(janitor.tracked_count(), 0);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }
}
