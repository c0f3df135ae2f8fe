//! Receipt data model produced by structured extraction.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Currency assumed when the receipt does not state one.
pub const DEFAULT_CURRENCY: &str = "TWD";

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

/// A single line item on a receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptItem {
    /// Item description as printed.
    pub description: String,

    /// Quantity purchased.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,

    /// Price per unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Decimal>,

    /// Line total.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
}

impl ReceiptItem {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            quantity: None,
            unit_price: None,
            amount: None,
        }
    }
}

/// Structured receipt data extracted from OCR text.
///
/// The confidence score is validated on every construction path, including
/// deserialization, so a `Receipt` value always satisfies `0 <= confidence <= 1`
/// and a nonnegative total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ReceiptData")]
pub struct Receipt {
    /// Merchant or store name.
    pub merchant_name: String,

    /// Purchase date.
    pub date: NaiveDate,

    /// Total amount paid.
    total_amount: Decimal,

    /// ISO 4217 currency code.
    pub currency: String,

    /// Line items in printed order.
    #[serde(default)]
    pub items: Vec<ReceiptItem>,

    /// Tax amount, when printed separately.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax: Option<Decimal>,

    /// Payment method as printed (cash, card, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,

    /// Invoice or receipt number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,

    /// Model confidence in the extraction (0.0 - 1.0).
    confidence_score: f64,

    /// OCR text the receipt was extracted from.
    pub raw_text: String,

    /// Remote file the receipt came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

/// Unvalidated receipt fields, as they arrive from the model.
#[derive(Debug, Deserialize)]
pub(crate) struct ReceiptData {
    merchant_name: String,
    date: NaiveDate,
    total_amount: Decimal,
    #[serde(default = "default_currency")]
    currency: String,
    #[serde(default)]
    items: Vec<ReceiptItem>,
    #[serde(default)]
    tax: Option<Decimal>,
    #[serde(default)]
    payment_method: Option<String>,
    #[serde(default)]
    invoice_number: Option<String>,
    confidence_score: f64,
    raw_text: String,
    #[serde(default)]
    file_id: Option<String>,
}

impl TryFrom<ReceiptData> for Receipt {
    type Error = ValidationError;

    fn try_from(data: ReceiptData) -> Result<Self, Self::Error> {
        let mut receipt = Receipt::new(
            data.merchant_name,
            data.date,
            data.total_amount,
            data.confidence_score,
            data.raw_text,
        )?
        .with_currency(data.currency)
        .with_items(data.items);

        if let Some(tax) = data.tax {
            receipt = receipt.with_tax(tax)?;
        }
        receipt.payment_method = data.payment_method;
        receipt.invoice_number = data.invoice_number;
        receipt.file_id = data.file_id;
        Ok(receipt)
    }
}

impl Receipt {
    /// Create a receipt with the required fields, validating the total and
    /// the confidence score.
    pub fn new(
        merchant_name: impl Into<String>,
        date: NaiveDate,
        total_amount: Decimal,
        confidence_score: f64,
        raw_text: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        if !(0.0..=1.0).contains(&confidence_score) {
            return Err(ValidationError::ConfidenceOutOfRange(confidence_score));
        }
        if total_amount.is_sign_negative() && !total_amount.is_zero() {
            return Err(ValidationError::NegativeTotal(total_amount));
        }

        Ok(Self {
            merchant_name: merchant_name.into(),
            date,
            total_amount,
            currency: default_currency(),
            items: Vec::new(),
            tax: None,
            payment_method: None,
            invoice_number: None,
            confidence_score,
            raw_text: raw_text.into(),
            file_id: None,
        })
    }

    /// Set the currency code.
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Set the line items.
    pub fn with_items(mut self, items: Vec<ReceiptItem>) -> Self {
        self.items = items;
        self
    }

    /// Set the tax amount.
    pub fn with_tax(mut self, tax: Decimal) -> Result<Self, ValidationError> {
        if tax.is_sign_negative() && !tax.is_zero() {
            return Err(ValidationError::NegativeTax(tax));
        }
        self.tax = Some(tax);
        Ok(self)
    }

    /// Set the payment method.
    pub fn with_payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    /// Set the invoice number.
    pub fn with_invoice_number(mut self, number: impl Into<String>) -> Self {
        self.invoice_number = Some(number.into());
        self
    }

    /// Link the receipt to the remote file it was extracted from.
    pub fn with_file_id(mut self, file_id: impl Into<String>) -> Self {
        self.file_id = Some(file_id.into());
        self
    }

    pub fn total_amount(&self) -> Decimal {
        self.total_amount
    }

    pub fn confidence_score(&self) -> f64 {
        self.confidence_score
    }

    /// One-line summary used in progress messages.
    pub fn summary(&self) -> String {
        format!(
            "{}, {}, ${:.2} {}",
            self.merchant_name, self.date, self.total_amount, self.currency
        )
    }
}

/// A receipt together with the cost and timing of the extraction call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Extracted receipt.
    pub receipt: Receipt,

    /// Prompt tokens billed.
    pub input_tokens: u64,

    /// Completion tokens billed.
    pub output_tokens: u64,

    /// Prompt tokens written to the cache.
    #[serde(default)]
    pub cache_creation_input_tokens: u64,

    /// Prompt tokens served from the cache.
    #[serde(default)]
    pub cache_read_input_tokens: u64,

    /// Wall-clock duration of the call in milliseconds.
    pub processing_time_ms: u64,

    /// When the extraction finished.
    pub timestamp: DateTime<Utc>,
}

impl ExtractionResult {
    /// Wrap a receipt with zeroed usage counters, stamped now.
    pub fn new(receipt: Receipt) -> Self {
        Self {
            receipt,
            input_tokens: 0,
            output_tokens: 0,
            cache_creation_input_tokens: 0,
            cache_read_input_tokens: 0,
            processing_time_ms: 0,
            timestamp: Utc::now(),
        }
    }
}
