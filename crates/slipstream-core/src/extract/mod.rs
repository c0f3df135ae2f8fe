//! Structured receipt extraction from OCR text.

mod anthropic;
mod schema;

pub use anthropic::{AnthropicExtractor, ANTHROPIC_VERSION, STRUCTURED_OUTPUTS_BETA};
pub use schema::{receipt_schema, user_prompt, SYSTEM_PROMPT};

use async_trait::async_trait;

use crate::error::ExtractionError;
use crate::models::receipt::ExtractionResult;

/// Converts raw OCR text into a validated receipt.
///
/// Expected failures (refusal, truncation, transport) come back as
/// [`ExtractionError`] variants. Implementations must tolerate concurrent
/// calls.
#[async_trait]
pub trait ReceiptExtractor: Send + Sync {
    /// Extract a receipt from `ocr_text`. When `source_id` is given, the
    /// returned receipt carries it as its provenance id.
    async fn extract(
        &self,
        ocr_text: &str,
        source_id: Option<&str>,
    ) -> Result<ExtractionResult, ExtractionError>;
}
