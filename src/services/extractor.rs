//! Content extraction
//!
//! Reads the text the index embeds. Any failure here means "skip this file".

use std::panic;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::utils::extension_lower;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Unsupported file type: {0}")]
    Unsupported(PathBuf),

    #[error("Failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },
}

/// Produces the text content of a file
pub trait ContentExtractor: Send {
    fn extract(&self, path: &Path) -> Result<String, ExtractError>;
}

/// Plain text and PDF extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct FileContentExtractor;

impl ContentExtractor for FileContentExtractor {
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        if !path.is_file() {
            return Err(ExtractError::NotFound(path.to_path_buf()));
        }

        let read_error = |message: String| ExtractError::Read {
            path: path.to_path_buf(),
            message,
        };

        match extension_lower(path).as_deref() {
            Some("txt") | Some("md") => {
                let bytes = std::fs::read(path).map_err(|e| read_error(e.to_string()))?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            Some("pdf") => extract_pdf(path).map_err(read_error),
            _ => Err(ExtractError::Unsupported(path.to_path_buf())),
        }
    }
}

/// PDF text, with parser panics on malformed input turned into errors
fn extract_pdf(path: &Path) -> Result<String, String> {
    match panic::catch_unwind(|| pdf_extract::extract_text(path)) {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(format!("PDF parser panicked: {}", detail))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_extract_text_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("note.txt");
        fs::write(&path, "hello world").unwrap();

        assert_eq!(FileContentExtractor.extract(&path).unwrap(), "hello world");
    }

    #[test]
    fn test_extract_invalid_utf8_is_lossy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bytes.txt");
        fs::write(&path, [b'o', b'k', 0xff, b'!']).unwrap();

        assert_eq!(FileContentExtractor.extract(&path).unwrap(), "ok\u{fffd}!");
    }

    #[test]
    fn test_extract_missing_and_unsupported() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            FileContentExtractor.extract(&dir.path().join("gone.txt")),
            Err(ExtractError::NotFound(_))
        ));

        let image = dir.path().join("image.png");
        fs::write(&image, [0u8; 4]).unwrap();
        assert!(matches!(FileContentExtractor.extract(&image), Err(ExtractError::Unsupported(_))));
    }

    #[test]
    fn test_extract_broken_pdf_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        fs::write(&path, "not really a pdf").unwrap();

        assert!(matches!(FileContentExtractor.extract(&path), Err(ExtractError::Read { .. })));
    }

    #[test]
    fn test_truncated_pdf_never_panics() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("truncated.pdf");
        // Valid header and an object that references a missing trailer
        fs::write(&path, "%PDF-1.4\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\nxref\n0 1\n").unwrap();

        assert!(matches!(FileContentExtractor.extract(&path), Err(ExtractError::Read { .. })));
    }
}
