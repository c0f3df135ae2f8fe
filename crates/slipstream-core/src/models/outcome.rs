//! Per-item outcomes flowing through the pipeline.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::receipt::ExtractionResult;

/// Result of retrieving one remote file.
///
/// Created once by the download fan-out and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadOutcome {
    item_id: String,
    item_name: String,
    local_path: PathBuf,
    error: Option<String>,
}

impl DownloadOutcome {
    /// A download that wrote the file to `local_path`.
    pub fn succeeded(
        item_id: impl Into<String>,
        item_name: impl Into<String>,
        local_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            item_name: item_name.into(),
            local_path: local_path.into(),
            error: None,
        }
    }

    /// A download that failed with `error`.
    pub fn failed(
        item_id: impl Into<String>,
        item_name: impl Into<String>,
        local_path: impl Into<PathBuf>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            item_name: item_name.into(),
            local_path: local_path.into(),
            error: Some(error.into()),
        }
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn item_name(&self) -> &str {
        &self.item_name
    }

    /// Where the bytes were written. Only meaningful when the download
    /// succeeded.
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Failure description, present iff the download failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Terminal result of processing one item end to end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingOutcome {
    item_id: String,
    item_name: String,
    download_success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    download_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ocr_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ocr_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    extraction: Option<ExtractionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    extraction_error: Option<String>,
}

impl ProcessingOutcome {
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn item_name(&self) -> &str {
        &self.item_name
    }

    pub fn download_success(&self) -> bool {
        self.download_success
    }

    pub fn download_error(&self) -> Option<&str> {
        self.download_error.as_deref()
    }

    /// OCR text, present iff OCR succeeded.
    pub fn ocr_text(&self) -> Option<&str> {
        self.ocr_text.as_deref()
    }

    /// OCR failure, present iff OCR was attempted and failed.
    pub fn ocr_error(&self) -> Option<&str> {
        self.ocr_error.as_deref()
    }

    /// Extraction result with usage metadata, present iff extraction succeeded.
    pub fn extraction(&self) -> Option<&ExtractionResult> {
        self.extraction.as_ref()
    }

    /// Shortcut to the extracted receipt.
    pub fn receipt(&self) -> Option<&super::receipt::Receipt> {
        self.extraction.as_ref().map(|e| &e.receipt)
    }

    /// Extraction failure, present iff extraction was attempted and failed.
    pub fn extraction_error(&self) -> Option<&str> {
        self.extraction_error.as_deref()
    }

    /// True when no stage recorded an error.
    pub fn is_clean(&self) -> bool {
        self.download_error.is_none() && self.ocr_error.is_none() && self.extraction_error.is_none()
    }
}

/// Accumulates a [`ProcessingOutcome`] as the item's sub-steps complete.
///
/// Each recording method fills one side of a text/error pair, so the
/// mutual-exclusion invariants hold by construction.
#[derive(Debug)]
pub(crate) struct OutcomeBuilder {
    outcome: ProcessingOutcome,
}

impl OutcomeBuilder {
    pub(crate) fn from_download(download: &DownloadOutcome) -> Self {
        Self {
            outcome: ProcessingOutcome {
                item_id: download.item_id.clone(),
                item_name: download.item_name.clone(),
                download_success: download.is_success(),
                download_error: download.error.clone(),
                ocr_text: None,
                ocr_error: None,
                extraction: None,
                extraction_error: None,
            },
        }
    }

    pub(crate) fn ocr_succeeded(&mut self, text: String) {
        self.outcome.ocr_error = None;
        self.outcome.ocr_text = Some(text);
    }

    pub(crate) fn ocr_failed(&mut self, error: String) {
        self.outcome.ocr_text = None;
        self.outcome.ocr_error = Some(error);
    }

    pub(crate) fn extraction_succeeded(&mut self, result: ExtractionResult) {
        self.outcome.extraction_error = None;
        self.outcome.extraction = Some(result);
    }

    pub(crate) fn extraction_failed(&mut self, error: String) {
        self.outcome.extraction = None;
        self.outcome.extraction_error = Some(error);
    }

    pub(crate) fn finish(self) -> ProcessingOutcome {
        self.outcome
    }
}
