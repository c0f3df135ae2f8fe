//! Local CSV export.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::error::SinkError;

use super::{ReceiptSink, SheetRow, SHEET_HEADER};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Appends rows to a CSV file with the same columns as the spreadsheet.
///
/// Safe for concurrent appends from several processes: an exclusive lock
/// covers the size check and the write. A new file starts with a UTF-8 BOM
/// and the header row.
#[derive(Debug, Clone)]
pub struct LocalExporter {
    path: PathBuf,
}

impl LocalExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocking append. An empty batch leaves the filesystem untouched.
    pub fn export(&self, rows: &[SheetRow]) -> Result<(), SinkError> {
        if rows.is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.lock()?;
        let written = write_locked(&mut file, rows);
        let unlocked = file.unlock();
        written?;
        unlocked?;

        info!(path = %self.path.display(), rows = rows.len(), "Exported rows");
        Ok(())
    }
}

fn write_locked(file: &mut File, rows: &[SheetRow]) -> Result<(), SinkError> {
    // Size is read under the lock so only the first writer adds the preamble
    let is_new = file.metadata()?.len() == 0;
    if is_new {
        file.write_all(UTF8_BOM)?;
    }

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(&mut *file);
    if is_new {
        writer.write_record(SHEET_HEADER)?;
    }
    for row in rows {
        writer.write_record(row.to_record())?;
    }
    writer.flush()?;
    Ok(())
}

#[async_trait]
impl ReceiptSink for LocalExporter {
    fn name(&self) -> &str {
        "local CSV"
    }

    async fn append_batch(&self, rows: &[SheetRow]) -> Result<(), SinkError> {
        if rows.is_empty() {
            return Ok(());
        }

        let exporter = self.clone();
        let rows = rows.to_vec();
        tokio::task::spawn_blocking(move || exporter.export(&rows))
            .await
            .map_err(|e| SinkError::Worker(e.to_string()))?
    }
}
