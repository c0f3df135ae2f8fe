//! Configuration structures for the ingestion pipeline.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SlipstreamError};
use crate::retry::RetryPolicy;

/// Main configuration for the slipstream pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlipstreamConfig {
    /// Remote file store configuration.
    pub drive: DriveConfig,

    /// OCR configuration.
    pub ocr: OcrConfig,

    /// Structured extraction configuration.
    pub extraction: ExtractionConfig,

    /// Spreadsheet sink configuration.
    pub sheets: SheetsConfig,
}

/// Google Drive configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Base URL of the Drive v3 API.
    pub api_base: String,

    /// MIME types that are listed for processing.
    pub mime_types: Vec<String>,

    /// Number of parallel download workers.
    pub workers: usize,

    /// Files requested per listing page.
    pub page_size: u32,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base: "https://www.googleapis.com/drive/v3".to_string(),
            mime_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "application/pdf".to_string(),
            ],
            workers: 4,
            page_size: 100,
            timeout_secs: 300,
        }
    }
}

/// Google Cloud Vision configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// `images:annotate` endpoint.
    pub endpoint: String,

    /// Vision feature type requested.
    pub feature: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://vision.googleapis.com/v1/images:annotate".to_string(),
            feature: "TEXT_DETECTION".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Anthropic extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Messages API endpoint.
    pub api_url: String,

    /// Model identifier.
    pub model: String,

    /// Maximum tokens for the response.
    pub max_tokens: u32,

    /// Sampling temperature (0.0 for deterministic output).
    pub temperature: f32,

    /// Attempts for transient failures, including the first.
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds.
    pub initial_backoff_ms: u64,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.anthropic.com/v1/messages".to_string(),
            model: "claude-haiku-4-5".to_string(),
            max_tokens: 2048,
            temperature: 0.0,
            max_attempts: 3,
            initial_backoff_ms: 1000,
            timeout_secs: 120,
        }
    }
}

impl ExtractionConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_secs(10),
        )
    }
}

/// Google Sheets configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    /// Base URL of the Sheets v4 API.
    pub api_base: String,

    /// A1 range rows are appended after.
    pub range: String,

    /// Attempts for rate-limit and availability failures.
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds.
    pub initial_backoff_ms: u64,

    /// Upper bound on a single retry delay in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            api_base: "https://sheets.googleapis.com/v4".to_string(),
            range: "Sheet1!A1".to_string(),
            max_attempts: 5,
            initial_backoff_ms: 1000,
            max_backoff_ms: 10_000,
        }
    }
}

impl SheetsConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

impl SlipstreamConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| SlipstreamError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| SlipstreamError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SlipstreamConfig::default();
        assert_eq!(config.drive.workers, 4);
        assert_eq!(config.drive.mime_types.len(), 3);
        assert_eq!(config.extraction.model, "claude-haiku-4-5");
        assert_eq!(config.extraction.max_tokens, 2048);
        assert_eq!(config.sheets.range, "Sheet1!A1");
        assert_eq!(config.sheets.retry_policy().max_attempts, 5);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: SlipstreamConfig =
            serde_json::from_str(r#"{"drive": {"workers": 8}, "extraction": {"max_attempts": 1}}"#).unwrap();

        assert_eq!(config.drive.workers, 8);
        assert_eq!(config.drive.page_size, 100);
        assert_eq!(config.extraction.max_attempts, 1);
        assert_eq!(config.extraction.model, "claude-haiku-4-5");
        assert_eq!(config.ocr.feature, "TEXT_DETECTION");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = SlipstreamConfig::default();
        config.sheets.range = "Receipts!A1".to_string();
        config.save(&path).unwrap();

        let loaded = SlipstreamConfig::from_file(&path).unwrap();
        assert_eq!(loaded.sheets.range, "Receipts!A1");
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"drive": {"workers": "many"}}"#).unwrap();

        let err = SlipstreamConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, SlipstreamError::Config(_)));
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SlipstreamConfig::from_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, SlipstreamError::Io(_)));
    }
}
