//! Streaming batch orchestrator.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::join_all;
use futures_util::{FutureExt, Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::error::panic_message;
use crate::extract::ReceiptExtractor;
use crate::models::outcome::{DownloadOutcome, OutcomeBuilder, ProcessingOutcome};
use crate::ocr::OcrBackend;
use crate::sink::{ReceiptSink, SheetRow};

use super::progress::{ProgressKind, ProgressReporter};
use super::stage::process_download;

/// Runs a batch of downloads through OCR, extraction and the sinks.
pub struct Pipeline {
    ocr: Arc<dyn OcrBackend>,
    extractor: Option<Arc<dyn ReceiptExtractor>>,
    sinks: Vec<Arc<dyn ReceiptSink>>,
    progress: ProgressReporter,
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    ocr: Arc<dyn OcrBackend>,
    extractor: Option<Arc<dyn ReceiptExtractor>>,
    sinks: Vec<Arc<dyn ReceiptSink>>,
    progress: ProgressReporter,
}

impl PipelineBuilder {
    pub fn new(ocr: Arc<dyn OcrBackend>) -> Self {
        Self {
            ocr,
            extractor: None,
            sinks: Vec::new(),
            progress: ProgressReporter::disabled(),
        }
    }

    /// Enable structured extraction after OCR.
    pub fn with_extractor(mut self, extractor: Arc<dyn ReceiptExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Add a sink. Sinks are written in the order they were added.
    pub fn with_sink(mut self, sink: Arc<dyn ReceiptSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            ocr: self.ocr,
            extractor: self.extractor,
            sinks: self.sinks,
            progress: self.progress,
        }
    }
}

impl Pipeline {
    pub fn builder(ocr: Arc<dyn OcrBackend>) -> PipelineBuilder {
        PipelineBuilder::new(ocr)
    }

    /// Process every download from `downloads` and return one outcome per
    /// item, in the order the items arrived.
    ///
    /// Each item is handed to its own task as soon as it arrives, so early
    /// downloads are processed while later ones are still in flight. Once
    /// all tasks finish, successful receipts are written to each sink in a
    /// single batch. Sink failures are only reported as progress events.
    pub async fn run<S>(&self, mut downloads: S) -> Vec<ProcessingOutcome>
    where
        S: Stream<Item = DownloadOutcome> + Unpin,
    {
        let mut launched = Vec::new();

        while let Some(download) = downloads.next().await {
            match download.error() {
                None => self.progress.emit(
                    ProgressKind::DownloadSuccess,
                    format!("Downloaded {}", download.item_name()),
                ),
                Some(error) => self.progress.emit(
                    ProgressKind::DownloadError,
                    format!("Failed to download {}: {}", download.item_name(), error),
                ),
            }

            let fallback = download.clone();
            let ocr = Arc::clone(&self.ocr);
            let extractor = self.extractor.clone();
            let progress = self.progress.clone();
            let task = tokio::spawn(async move {
                process_download(download, ocr, extractor, &progress).await
            });
            launched.push((fallback, task));
        }

        debug!(items = launched.len(), "Download stream exhausted, awaiting processing");
        let (fallbacks, tasks): (Vec<_>, Vec<_>) = launched.into_iter().unzip();
        let results = join_all(tasks).await;

        let outcomes: Vec<ProcessingOutcome> = fallbacks
            .into_iter()
            .zip(results)
            .map(|(download, result)| match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    let message = if e.is_panic() {
                        panic_message(e.into_panic().as_ref())
                    } else {
                        e.to_string()
                    };
                    self.recover(&download, message)
                }
            })
            .collect();

        let extracted = outcomes.iter().filter(|o| o.receipt().is_some()).count();
        info!(items = outcomes.len(), extracted, "Batch processed");

        self.write_sinks(&outcomes).await;
        outcomes
    }

    /// Outcome for an item whose processing task died.
    fn recover(&self, download: &DownloadOutcome, message: String) -> ProcessingOutcome {
        warn!(item = download.item_id(), error = %message, "Processing task failed");
        let mut outcome = OutcomeBuilder::from_download(download);
        if download.is_success() {
            self.progress.emit(
                ProgressKind::OcrError,
                format!("Failed to process {}: {}", download.item_name(), message),
            );
            outcome.ocr_failed(message);
        }
        outcome.finish()
    }

    async fn write_sinks(&self, outcomes: &[ProcessingOutcome]) {
        if self.sinks.is_empty() {
            return;
        }

        let rows: Vec<SheetRow> = outcomes
            .iter()
            .filter_map(ProcessingOutcome::receipt)
            .map(SheetRow::from_receipt)
            .collect();
        if rows.is_empty() {
            debug!("No receipts to write");
            return;
        }

        for sink in &self.sinks {
            let result = AssertUnwindSafe(sink.append_batch(&rows))
                .catch_unwind()
                .await;

            match result {
                Ok(Ok(())) => self.progress.emit(
                    ProgressKind::SinkSuccess,
                    format!("Appended {} receipts to {}", rows.len(), sink.name()),
                ),
                Ok(Err(e)) => self.progress.emit(
                    ProgressKind::SinkError,
                    format!("Failed to append receipts to {}: {}", sink.name(), e),
                ),
                Err(payload) => self.progress.emit(
                    ProgressKind::SinkError,
                    format!(
                        "Failed to append receipts to {}: {}",
                        sink.name(),
                        panic_message(payload.as_ref())
                    ),
                ),
            }
        }
    }
}
