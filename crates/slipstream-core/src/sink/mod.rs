//! Append-only persistence of extracted receipts.

mod local;
mod sheets;

pub use local::LocalExporter;
pub use sheets::SheetsClient;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use crate::drive::file_url;
use crate::error::SinkError;
use crate::models::receipt::Receipt;

/// Column titles shared by the spreadsheet and the CSV export:
/// merchant, date, currency, total, image link.
pub const SHEET_HEADER: [&str; 5] = ["商家", "日期", "幣別", "總計", "圖片連結"];

/// One sink row: `[merchant, date, currency, total, link]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetRow {
    pub merchant: String,
    pub date: NaiveDate,
    pub currency: String,
    pub total: Decimal,
    /// Link to the source file, empty when the receipt has no provenance.
    pub link: String,
}

impl SheetRow {
    pub fn from_receipt(receipt: &Receipt) -> Self {
        Self {
            merchant: receipt.merchant_name.clone(),
            date: receipt.date,
            currency: receipt.currency.clone(),
            total: receipt.total_amount(),
            link: receipt.file_id.as_deref().map(file_url).unwrap_or_default(),
        }
    }

    /// Text cells in column order.
    pub fn to_record(&self) -> [String; 5] {
        [
            self.merchant.clone(),
            self.date.format("%Y-%m-%d").to_string(),
            self.currency.clone(),
            self.total.to_string(),
            self.link.clone(),
        ]
    }

    /// JSON cells in column order; the total is sent as a number.
    pub fn to_json_values(&self) -> Vec<Value> {
        let total = self
            .total
            .to_f64()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(self.total.to_string()));

        vec![
            Value::String(self.merchant.clone()),
            Value::String(self.date.format("%Y-%m-%d").to_string()),
            Value::String(self.currency.clone()),
            total,
            Value::String(self.link.clone()),
        ]
    }
}

/// A destination that accepts batches of rows.
#[async_trait]
pub trait ReceiptSink: Send + Sync {
    /// Human-readable name used in progress messages.
    fn name(&self) -> &str;

    /// Append all rows in one operation. An empty batch is a no-op.
    async fn append_batch(&self, rows: &[SheetRow]) -> Result<(), SinkError>;
}
