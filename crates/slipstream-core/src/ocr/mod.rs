//! OCR backends turning receipt images into raw text.

mod vision;

pub use vision::{VisionCredential, VisionOcrEngine};

use std::path::Path;

use crate::error::OcrError;

/// Blocking text extraction from a local image or PDF.
///
/// Implementations are called from the blocking thread pool and may be
/// invoked concurrently for different files.
pub trait OcrBackend: Send + Sync {
    /// Extract all text from the file at `path`.
    ///
    /// An image without detectable text yields an empty string, not an error.
    fn extract_text(&self, path: &Path) -> Result<String, OcrError>;
}

/// Fail with [`OcrError::FileNotFound`] unless `path` is an existing regular file.
pub(crate) fn ensure_regular_file(path: &Path) -> Result<(), OcrError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(OcrError::FileNotFound(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("receipt.jpg");
        std::fs::write(&file, b"jpeg").unwrap();

        assert!(ensure_regular_file(&file).is_ok());
        assert!(matches!(
            ensure_regular_file(dir.path()),
            Err(OcrError::FileNotFound(_))
        ));
        assert!(matches!(
            ensure_regular_file(&dir.path().join("missing.jpg")),
            Err(OcrError::FileNotFound(_))
        ));
    }
}
