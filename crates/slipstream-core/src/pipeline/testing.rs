//! In-memory backends for pipeline tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::drive::{RemoteFile, RemoteStore};
use crate::error::{DriveError, ExtractionError, OcrError, SinkError};
use crate::extract::ReceiptExtractor;
use crate::models::outcome::DownloadOutcome;
use crate::models::receipt::{ExtractionResult, Receipt};
use crate::ocr::OcrBackend;
use crate::sink::{ReceiptSink, SheetRow};

/// Returns the file content when the path exists, otherwise a canned text
/// derived from the file name.
#[derive(Default)]
pub(crate) struct MockOcr {
    failing: HashSet<String>,
    panicking: HashSet<String>,
    slow: HashMap<String, Duration>,
    calls: Mutex<Vec<PathBuf>>,
}

impl MockOcr {
    pub(crate) fn failing_on(mut self, file_name: &str) -> Self {
        self.failing.insert(file_name.to_string());
        self
    }

    pub(crate) fn panicking_on(mut self, file_name: &str) -> Self {
        self.panicking.insert(file_name.to_string());
        self
    }

    /// Block the calling thread for `delay` before reading `file_name`.
    pub(crate) fn sleeping_on(mut self, file_name: &str, delay: Duration) -> Self {
        self.slow.insert(file_name.to_string(), delay);
        self
    }

    pub(crate) fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }
}

impl OcrBackend for MockOcr {
    fn extract_text(&self, path: &Path) -> Result<String, OcrError> {
        self.calls.lock().unwrap().push(path.to_path_buf());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Some(delay) = self.slow.get(&name) {
            std::thread::sleep(*delay);
        }
        if self.panicking.contains(&name) {
            panic!("vision client crashed on {}", name);
        }
        if self.failing.contains(&name) {
            return Err(OcrError::Api {
                status: 400,
                message: format!("Bad image data: {}", name),
            });
        }
        if path.is_file() {
            return Ok(std::fs::read_to_string(path)?);
        }
        Ok(format!("text of {}", name))
    }
}

/// Builds a receipt per item id. Merchants default to the item id.
#[derive(Default)]
pub(crate) struct MockExtractor {
    merchants: HashMap<String, String>,
    refusing: HashSet<String>,
    stamp_provenance: bool,
    calls: Mutex<Vec<String>>,
}

impl MockExtractor {
    pub(crate) fn with_merchant(mut self, item_id: &str, merchant: &str) -> Self {
        self.merchants.insert(item_id.to_string(), merchant.to_string());
        self
    }

    pub(crate) fn refusing(mut self, item_id: &str) -> Self {
        self.refusing.insert(item_id.to_string());
        self
    }

    pub(crate) fn with_provenance(mut self) -> Self {
        self.stamp_provenance = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReceiptExtractor for MockExtractor {
    async fn extract(
        &self,
        ocr_text: &str,
        source_id: Option<&str>,
    ) -> Result<ExtractionResult, ExtractionError> {
        let id = source_id.unwrap_or_default().to_string();
        self.calls.lock().unwrap().push(id.clone());

        if self.refusing.contains(&id) {
            return Err(ExtractionError::Refused);
        }

        let merchant = self.merchants.get(&id).cloned().unwrap_or_else(|| id.clone());
        let mut receipt = Receipt::new(
            merchant,
            NaiveDate::from_ymd_opt(2024, 12, 28).unwrap(),
            Decimal::from(100),
            0.9,
            ocr_text,
        )?;
        if self.stamp_provenance {
            receipt = receipt.with_file_id(id);
        }

        let mut result = ExtractionResult::new(receipt);
        result.input_tokens = 10;
        result.output_tokens = 5;
        Ok(result)
    }
}

/// Records every batch it receives; optionally fails every write.
#[derive(Default)]
pub(crate) struct MockSink {
    failing: bool,
    batches: Mutex<Vec<Vec<SheetRow>>>,
}

impl MockSink {
    pub(crate) fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub(crate) fn batches(&self) -> Vec<Vec<SheetRow>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReceiptSink for MockSink {
    fn name(&self) -> &str {
        "mock sink"
    }

    async fn append_batch(&self, rows: &[SheetRow]) -> Result<(), SinkError> {
        self.batches.lock().unwrap().push(rows.to_vec());
        if self.failing {
            return Err(SinkError::Http {
                status: 403,
                message: "The caller does not have permission".into(),
            });
        }
        Ok(())
    }
}

/// Serves file bodies from memory.
#[derive(Default)]
pub(crate) struct MockStore {
    pub(crate) bodies: HashMap<String, String>,
    pub(crate) delays: HashMap<String, Duration>,
}

impl MockStore {
    pub(crate) fn with_file(mut self, file_id: &str, body: &str, delay: Duration) -> Self {
        self.bodies.insert(file_id.to_string(), body.to_string());
        self.delays.insert(file_id.to_string(), delay);
        self
    }
}

#[async_trait]
impl RemoteStore for MockStore {
    async fn list_files(&self, _: &str, _: &[String]) -> Result<Vec<RemoteFile>, DriveError> {
        Ok(Vec::new())
    }

    async fn download(&self, file_id: &str, dest: &Path) -> Result<u64, DriveError> {
        if let Some(delay) = self.delays.get(file_id) {
            tokio::time::sleep(*delay).await;
        }
        let body = self.bodies.get(file_id).ok_or_else(|| DriveError::Http {
            status: 404,
            message: format!("File not found: {}", file_id),
        })?;
        tokio::fs::write(dest, body).await?;
        Ok(body.len() as u64)
    }
}

/// Successful download of `<id>.jpg` under a fake directory.
pub(crate) fn downloaded(item_id: &str) -> DownloadOutcome {
    let name = format!("{}.jpg", item_id);
    DownloadOutcome::succeeded(item_id, name.clone(), PathBuf::from("/nonexistent").join(name))
}

pub(crate) fn failed_download(item_id: &str) -> DownloadOutcome {
    let name = format!("{}.jpg", item_id);
    DownloadOutcome::failed(
        item_id,
        name.clone(),
        PathBuf::from("/nonexistent").join(name),
        "HTTP 403: insufficient permissions",
    )
}
