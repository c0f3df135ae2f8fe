//! Core library for receipt ingestion.
//!
//! This crate provides:
//! - Google Drive listing and bounded parallel downloads
//! - OCR through Google Cloud Vision
//! - Structured receipt extraction through the Anthropic Messages API
//! - A streaming pipeline that overlaps downloads, OCR and extraction
//! - Append-only sinks (Google Sheets, local CSV)

pub mod error;
pub mod handle;
pub mod models;
pub mod retry;
pub mod drive;
pub mod ocr;
pub mod extract;
pub mod sink;
pub mod pipeline;

pub use error::{SlipstreamError, Result};
pub use models::receipt::{Receipt, ReceiptItem, ExtractionResult};
pub use models::outcome::{DownloadOutcome, ProcessingOutcome};
pub use models::config::SlipstreamConfig;
pub use drive::{DriveClient, RemoteFile, RemoteStore, download_all, DownloadStream};
pub use ocr::{OcrBackend, VisionOcrEngine, VisionCredential};
pub use extract::{AnthropicExtractor, ReceiptExtractor};
pub use sink::{LocalExporter, ReceiptSink, SheetRow, SheetsClient};
pub use pipeline::{Pipeline, PipelineBuilder, ProgressEvent, ProgressKind, ProgressReporter};
