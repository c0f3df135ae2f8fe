//! Error types for the slipstream-core library.

use std::path::PathBuf;

use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the slipstream library.
#[derive(Error, Debug)]
pub enum SlipstreamError {
    /// Remote file store error.
    #[error("Drive error: {0}")]
    Drive(#[from] DriveError),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Structured extraction error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Sink write error.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Receipt validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors from the remote file store (listing and downloads).
#[derive(Error, Debug)]
pub enum DriveError {
    /// The API answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The request never produced a response.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The remote name cannot be used as a local file name.
    #[error("invalid destination name: {0:?}")]
    InvalidName(String),

    /// The listing response could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),

    /// Writing the downloaded bytes failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// The input path does not exist or is not a regular file.
    #[error("image file not found: {0}")]
    FileNotFound(PathBuf),

    /// The Vision API reported an error.
    #[error("Vision API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The request never produced a response.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),

    /// The blocking worker running the OCR call did not complete.
    #[error("OCR worker failed: {0}")]
    Worker(String),

    /// I/O error while reading the image.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal failures of the structured-extraction boundary.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The model declined to process the request.
    #[error("model refused to process the request")]
    Refused,

    /// The output was cut off by the token limit.
    #[error("response truncated due to token limit, try increasing max_tokens")]
    Incomplete,

    /// The API answered with a non-success status.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The request never produced a response.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The model output did not match the receipt schema.
    #[error("invalid model output: {0}")]
    InvalidOutput(String),

    /// The decoded receipt violated a field constraint.
    #[error("invalid receipt: {0}")]
    Validation(#[from] ValidationError),
}

impl ExtractionError {
    /// Whether another attempt could succeed.
    ///
    /// Refusals, truncations and malformed output are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExtractionError::Transport(_) => true,
            ExtractionError::Api { status, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504 | 529)
            }
            _ => false,
        }
    }
}

/// Errors from persistence sinks.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The API answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The request never produced a response.
    #[error("transport failure: {0}")]
    Transport(String),

    /// CSV encoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The blocking writer did not complete.
    #[error("writer failed: {0}")]
    Worker(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SinkError {
    /// Rate limiting, unavailability and network failures are retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SinkError::Transport(_) => true,
            SinkError::Http { status, .. } => matches!(status, 429 | 503),
            _ => false,
        }
    }
}

/// Receipt field constraint violations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Confidence must lie in [0.0, 1.0].
    #[error("confidence score {0} is outside [0.0, 1.0]")]
    ConfidenceOutOfRange(f64),

    /// Totals cannot be negative.
    #[error("total amount {0} is negative")]
    NegativeTotal(Decimal),

    /// Tax cannot be negative.
    #[error("tax {0} is negative")]
    NegativeTax(Decimal),
}

/// Result type for the slipstream library.
pub type Result<T> = std::result::Result<T, SlipstreamError>;

/// Pull the human-readable message out of a JSON API error body.
///
/// Google and Anthropic both nest it under `error.message`.
pub(crate) fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Describe a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_retry_classification() {
        assert!(ExtractionError::Transport("reset".into()).is_retryable());
        assert!(ExtractionError::Api { status: 529, message: "overloaded".into() }.is_retryable());
        assert!(!ExtractionError::Api { status: 400, message: "bad".into() }.is_retryable());
        assert!(!ExtractionError::Refused.is_retryable());
        assert!(!ExtractionError::Incomplete.is_retryable());
        assert!(!ExtractionError::InvalidOutput("x".into()).is_retryable());
    }

    #[test]
    fn test_sink_retry_classification() {
        assert!(SinkError::Http { status: 429, message: String::new() }.is_retryable());
        assert!(SinkError::Http { status: 503, message: String::new() }.is_retryable());
        assert!(!SinkError::Http { status: 404, message: String::new() }.is_retryable());
        assert!(!SinkError::Http { status: 403, message: String::new() }.is_retryable());
    }

    #[test]
    fn test_api_error_message() {
        let google = r#"{"error": {"code": 404, "message": "File not found: abc.", "status": "NOT_FOUND"}}"#;
        assert_eq!(api_error_message(google), "File not found: abc.");

        let anthropic = r#"{"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}"#;
        assert_eq!(api_error_message(anthropic), "Overloaded");

        assert_eq!(api_error_message(" plain failure "), "plain failure");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "panicked: boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "panicked");
    }

    #[test]
    fn test_refusal_message_mentions_refusal() {
        assert!(ExtractionError::Refused.to_string().contains("refused"));
    }
}
