//! Google Sheets `values:append` sink.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use crate::error::{api_error_message, SinkError};
use crate::handle::LazyHandle;
use crate::models::config::SheetsConfig;
use crate::retry::RetryPolicy;

use super::{ReceiptSink, SheetRow};

/// Appends rows to a spreadsheet with an OAuth access token.
///
/// Rate limiting (429), unavailability (503) and network failures are
/// retried with exponential backoff; other HTTP errors fail at once.
pub struct SheetsClient {
    access_token: String,
    spreadsheet_id: String,
    config: SheetsConfig,
    retry: RetryPolicy,
    http: LazyHandle<reqwest::Client>,
}

impl SheetsClient {
    pub fn new(
        access_token: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        config: SheetsConfig,
    ) -> Self {
        let retry = config.retry_policy();
        Self {
            access_token: access_token.into(),
            spreadsheet_id: spreadsheet_id.into(),
            config,
            retry,
            http: LazyHandle::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    fn http(&self) -> Result<Arc<reqwest::Client>, SinkError> {
        self.http.get_or_try_init(|| {
            debug!("Creating Sheets HTTP client");
            reqwest::Client::builder()
                .build()
                .map_err(|e| SinkError::Transport(e.to_string()))
        })
    }

    fn append_url(&self) -> String {
        format!(
            "{}/spreadsheets/{}/values/{}:append",
            self.config.api_base, self.spreadsheet_id, self.config.range
        )
    }

    async fn append_once(&self, body: &serde_json::Value) -> Result<(), SinkError> {
        let http = self.http()?;
        let response = http
            .post(self.append_url())
            .bearer_auth(&self.access_token)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(body)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(SinkError::Http {
            status: status.as_u16(),
            message: api_error_message(&text),
        })
    }
}

#[async_trait]
impl ReceiptSink for SheetsClient {
    fn name(&self) -> &str {
        "Google Sheets"
    }

    async fn append_batch(&self, rows: &[SheetRow]) -> Result<(), SinkError> {
        if rows.is_empty() {
            return Ok(());
        }

        let values: Vec<_> = rows.iter().map(SheetRow::to_json_values).collect();
        let body = json!({ "values": values });

        self.retry
            .run("Sheets append", SinkError::is_retryable, || self.append_once(&body))
            .await?;

        info!(spreadsheet = %self.spreadsheet_id, rows = rows.len(), "Appended rows");
        Ok(())
    }
}
