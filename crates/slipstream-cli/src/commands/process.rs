//! Process command - OCR and extract every receipt in a Drive folder.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::info;

use slipstream_core::{
    download_all, AnthropicExtractor, DriveClient, LocalExporter, Pipeline, ProcessingOutcome,
    ProgressEvent, ProgressKind, ProgressReporter, ReceiptExtractor, RemoteStore, SheetsClient,
    VisionCredential, VisionOcrEngine,
};

use super::load_config;

const ACCESS_TOKEN_VAR: &str = "GOOGLE_ACCESS_TOKEN";
const VISION_KEY_VAR: &str = "GOOGLE_VISION_API_KEY";
const ANTHROPIC_KEY_VAR: &str = "ANTHROPIC_API_KEY";

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Google Drive folder ID
    #[arg(short, long)]
    folder: String,

    /// Number of parallel download workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Google Sheets spreadsheet ID to append receipts to
    #[arg(short, long)]
    sheet: Option<String>,

    /// Append receipts to a local CSV file
    #[arg(long)]
    save_local: Option<PathBuf>,

    /// Write every processing outcome to a JSON report
    #[arg(long)]
    report: Option<PathBuf>,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    validate_id("folder", &args.folder)?;
    if let Some(sheet) = &args.sheet {
        validate_id("spreadsheet", sheet)?;
    }

    let config = load_config(config_path)?;
    let workers = args.workers.unwrap_or(config.drive.workers);
    if workers == 0 {
        anyhow::bail!("--workers must be at least 1");
    }

    let token = required_env(ACCESS_TOKEN_VAR)?;

    let drive = Arc::new(DriveClient::new(token.clone(), config.drive.clone()));
    let files = drive
        .list_files(&args.folder, &config.drive.mime_types)
        .await
        .map_err(|e| anyhow::anyhow!("Error communicating with Google Drive: {}", e))?;

    if files.is_empty() {
        println!("No supported files found in folder.");
        return Ok(());
    }

    println!(
        "{} Found {} files, processing with {} workers",
        style("ℹ").blue(),
        files.len(),
        workers
    );

    let credential = match std::env::var(VISION_KEY_VAR) {
        Ok(key) if !key.is_empty() => VisionCredential::ApiKey(key),
        _ => VisionCredential::Bearer(token.clone()),
    };
    let ocr = Arc::new(VisionOcrEngine::new(credential, config.ocr.clone()));
    ocr.warm_up().context("Failed to initialize Vision OCR")?;

    let extractor: Option<Arc<dyn ReceiptExtractor>> = match std::env::var(ANTHROPIC_KEY_VAR) {
        Ok(key) if !key.is_empty() => {
            let anthropic = AnthropicExtractor::new(key, config.extraction.clone());
            info!(model = anthropic.model(), "Structured extraction enabled");
            let extractor: Arc<dyn ReceiptExtractor> = Arc::new(anthropic);
            Some(extractor)
        }
        _ => {
            eprintln!(
                "{} {} not set, structured extraction disabled.",
                style("!").yellow(),
                ANTHROPIC_KEY_VAR
            );
            None
        }
    };

    let (progress, events) = ProgressReporter::channel();
    let mut builder = Pipeline::builder(ocr).with_progress(progress);
    if let Some(extractor) = &extractor {
        builder = builder.with_extractor(extractor.clone());
    }
    if let Some(sheet) = &args.sheet {
        builder = builder.with_sink(Arc::new(SheetsClient::new(
            token.clone(),
            sheet.clone(),
            config.sheets.clone(),
        )));
    }
    if let Some(path) = &args.save_local {
        builder = builder.with_sink(Arc::new(LocalExporter::new(path.clone())));
    }
    let pipeline = builder.build();

    let download_dir = tempfile::Builder::new()
        .prefix("slipstream-")
        .tempdir()
        .context("Failed to create download directory")?;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files",
            )?
            .progress_chars("=>-"),
    );
    let printer = spawn_printer(events, pb.clone(), extractor.is_some());

    let store: Arc<dyn RemoteStore> = drive;
    let downloads = download_all(store, files, download_dir.path(), workers);
    let outcomes = pipeline.run(downloads).await;

    // Closing the last sender ends the printer.
    drop(pipeline);
    printer.await.context("Progress printer failed")?;
    pb.finish_and_clear();

    let summary = BatchSummary::from_outcomes(&outcomes);
    summary.print(extractor.is_some());

    if let Some(report) = &args.report {
        let json = serde_json::to_string_pretty(&outcomes)?;
        std::fs::write(report, json)
            .with_context(|| format!("Failed to write report {}", report.display()))?;
        println!("{} Report written to {}", style("✓").green(), report.display());
    }

    Ok(())
}

/// Drive IDs are opaque tokens of letters, digits, `-` and `_`.
fn validate_id(what: &str, id: &str) -> anyhow::Result<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        anyhow::bail!("Invalid {} ID: {:?}", what, id);
    }
    Ok(())
}

fn required_env(name: &str) -> anyhow::Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => anyhow::bail!("{} is not set", name),
    }
}

/// Whether `kind` is the last per-item event for an item.
fn is_terminal(kind: ProgressKind, extraction_enabled: bool) -> bool {
    match kind {
        ProgressKind::DownloadError | ProgressKind::OcrError => true,
        ProgressKind::OcrSuccess => !extraction_enabled,
        ProgressKind::ExtractionSuccess | ProgressKind::ExtractionError => true,
        ProgressKind::DownloadSuccess | ProgressKind::SinkSuccess | ProgressKind::SinkError => {
            false
        }
    }
}

fn spawn_printer(
    mut events: UnboundedReceiver<ProgressEvent>,
    pb: ProgressBar,
    extraction_enabled: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if event.kind.is_error() {
                pb.suspend(|| {
                    eprintln!("{} [{}] {}", style("✗").red(), event.kind, event.message)
                });
            } else {
                pb.suspend(|| {
                    println!("{} [{}] {}", style("✓").green(), event.kind, event.message)
                });
            }
            if is_terminal(event.kind, extraction_enabled) {
                pb.inc(1);
            }
        }
    })
}

/// Per-stage counts over a finished batch.
#[derive(Debug, Default, PartialEq, Eq)]
struct BatchSummary {
    total: usize,
    downloaded: usize,
    download_failed: usize,
    ocr_succeeded: usize,
    ocr_failed: usize,
    extracted: usize,
    extraction_failed: usize,
}

impl BatchSummary {
    fn from_outcomes(outcomes: &[ProcessingOutcome]) -> Self {
        let mut summary = BatchSummary {
            total: outcomes.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            if !outcome.download_success() {
                summary.download_failed += 1;
                continue;
            }
            summary.downloaded += 1;
            if outcome.ocr_error().is_some() {
                summary.ocr_failed += 1;
                continue;
            }
            summary.ocr_succeeded += 1;
            if outcome.extraction().is_some() {
                summary.extracted += 1;
            } else if outcome.extraction_error().is_some() {
                summary.extraction_failed += 1;
            }
        }
        summary
    }

    fn print(&self, extraction_enabled: bool) {
        println!();
        println!("{} Processed {} files", style("✓").green(), self.total);
        println!(
            "  Download:   {} succeeded, {} failed",
            style(self.downloaded).green(),
            style(self.download_failed).red()
        );
        println!(
            "  OCR:        {} succeeded, {} failed",
            style(self.ocr_succeeded).green(),
            style(self.ocr_failed).red()
        );
        if extraction_enabled {
            println!(
                "  Extraction: {} succeeded, {} failed",
                style(self.extracted).green(),
                style(self.extraction_failed).red()
            );
        }
    }
}
