//! Per-item processing: OCR on the blocking pool, then extraction.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::debug;

use crate::error::{panic_message, OcrError};
use crate::extract::ReceiptExtractor;
use crate::models::outcome::{DownloadOutcome, OutcomeBuilder, ProcessingOutcome};
use crate::ocr::OcrBackend;

use super::progress::{ProgressKind, ProgressReporter};

/// Drive one downloaded item to its terminal [`ProcessingOutcome`].
///
/// Never fails: every error is recorded in the outcome. Extraction runs only
/// after OCR succeeded, and its failure keeps the OCR text.
pub async fn process_download(
    download: DownloadOutcome,
    ocr: Arc<dyn OcrBackend>,
    extractor: Option<Arc<dyn ReceiptExtractor>>,
    progress: &ProgressReporter,
) -> ProcessingOutcome {
    let mut outcome = OutcomeBuilder::from_download(&download);
    if !download.is_success() {
        return outcome.finish();
    }

    let name = download.item_name();
    let text = match run_ocr(ocr, &download).await {
        Ok(text) => {
            progress.emit(
                ProgressKind::OcrSuccess,
                format!("Extracted text from {}: {} characters", name, text.chars().count()),
            );
            outcome.ocr_succeeded(text.clone());
            text
        }
        Err(e) => {
            progress.emit(ProgressKind::OcrError, format!("Failed to process {}: {}", name, e));
            outcome.ocr_failed(e.to_string());
            return outcome.finish();
        }
    };

    let Some(extractor) = extractor else {
        debug!(item = download.item_id(), "No extractor configured, stopping after OCR");
        return outcome.finish();
    };

    let extraction = AssertUnwindSafe(extractor.extract(&text, Some(download.item_id())))
        .catch_unwind()
        .await;

    match extraction {
        Ok(Ok(result)) => {
            progress.emit(
                ProgressKind::ExtractionSuccess,
                format!("Structured data extracted for {}: {}", name, result.receipt.summary()),
            );
            outcome.extraction_succeeded(result);
        }
        Ok(Err(e)) => {
            progress.emit(
                ProgressKind::ExtractionError,
                format!("Failed to extract structured data from {}: {}", name, e),
            );
            outcome.extraction_failed(e.to_string());
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            progress.emit(
                ProgressKind::ExtractionError,
                format!("Failed to extract structured data from {}: {}", name, message),
            );
            outcome.extraction_failed(message);
        }
    }

    outcome.finish()
}

async fn run_ocr(ocr: Arc<dyn OcrBackend>, download: &DownloadOutcome) -> Result<String, OcrError> {
    let path = download.local_path().to_path_buf();
    match tokio::task::spawn_blocking(move || ocr.extract_text(&path)).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(OcrError::Worker(panic_message(e.into_panic().as_ref()))),
        Err(e) => Err(OcrError::Worker(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{downloaded, failed_download, MockExtractor, MockOcr};

    #[tokio::test]
    async fn test_without_extractor_stops_after_ocr() {
        let ocr = Arc::new(MockOcr::default());
        let outcome = process_download(downloaded("a"), ocr.clone(), None, &ProgressReporter::disabled()).await;

        assert_eq!(outcome.ocr_text(), Some("text of a.jpg"));
        assert!(outcome.extraction().is_none());
        assert!(outcome.extraction_error().is_none());
        assert_eq!(ocr.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_download_emits_nothing() {
        let (progress, mut events) = ProgressReporter::channel();
        let outcome = process_download(
            failed_download("a"),
            Arc::new(MockOcr::default()),
            Some(Arc::new(MockExtractor::default())),
            &progress,
        )
        .await;

        assert!(!outcome.download_success());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_extraction_receives_item_id_and_text() {
        let extractor = Arc::new(MockExtractor::default().with_provenance());
        let outcome = process_download(
            downloaded("file9"),
            Arc::new(MockOcr::default()),
            Some(extractor.clone()),
            &ProgressReporter::disabled(),
        )
        .await;

        assert_eq!(extractor.calls(), vec!["file9".to_string()]);
        let receipt = outcome.receipt().unwrap();
        assert_eq!(receipt.raw_text, "text of file9.jpg");
        assert_eq!(receipt.file_id.as_deref(), Some("file9"));
        assert_eq!(outcome.extraction().unwrap().input_tokens, 10);
    }
}
