//! Anthropic Messages API client with structured outputs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{api_error_message, ExtractionError};
use crate::handle::LazyHandle;
use crate::models::config::ExtractionConfig;
use crate::models::receipt::{ExtractionResult, Receipt, ReceiptData};
use crate::retry::RetryPolicy;

use super::schema::{receipt_schema, user_prompt, SYSTEM_PROMPT};
use super::ReceiptExtractor;

/// Required API version header value.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Beta flag enabling `output_format`.
pub const STRUCTURED_OUTPUTS_BETA: &str = "structured-outputs-2025-11-13";

// ── Request / Response types ─────────────────────────────────────────────────

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: [SystemBlock<'a>; 1],
    messages: [Message; 1],
    output_format: OutputFormat<'a>,
}

#[derive(Serialize)]
struct SystemBlock<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
    cache_control: CacheControl,
}

#[derive(Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct OutputFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    schema: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    cache_creation_input_tokens: Option<u64>,
    cache_read_input_tokens: Option<u64>,
}

// ── Extractor ────────────────────────────────────────────────────────────────

/// Receipt extractor backed by Claude structured outputs.
///
/// Transient failures are retried per the configured [`RetryPolicy`];
/// refusals and truncated responses are returned immediately.
pub struct AnthropicExtractor {
    api_key: String,
    config: ExtractionConfig,
    retry: RetryPolicy,
    schema: serde_json::Value,
    http: LazyHandle<reqwest::Client>,
}

impl AnthropicExtractor {
    pub fn new(api_key: impl Into<String>, config: ExtractionConfig) -> Self {
        let retry = config.retry_policy();
        Self {
            api_key: api_key.into(),
            config,
            retry,
            schema: receipt_schema(),
            http: LazyHandle::new(),
        }
    }

    /// Override the retry policy taken from the configuration.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn http(&self) -> Result<Arc<reqwest::Client>, ExtractionError> {
        self.http.get_or_try_init(|| {
            debug!("Creating Anthropic HTTP client");
            reqwest::Client::builder()
                .timeout(Duration::from_secs(self.config.timeout_secs))
                .build()
                .map_err(|e| ExtractionError::Transport(e.to_string()))
        })
    }

    fn request<'a>(&'a self, ocr_text: &str) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: [SystemBlock {
                kind: "text",
                text: SYSTEM_PROMPT,
                cache_control: CacheControl { kind: "ephemeral" },
            }],
            messages: [Message {
                role: "user",
                content: user_prompt(ocr_text),
            }],
            output_format: OutputFormat {
                kind: "json_schema",
                schema: &self.schema,
            },
        }
    }

    /// Make a single API call (no retry).
    async fn send_once(&self, ocr_text: &str) -> Result<MessagesResponse, ExtractionError> {
        let http = self.http()?;
        let response = http
            .post(&self.config.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("anthropic-beta", STRUCTURED_OUTPUTS_BETA)
            .json(&self.request(ocr_text))
            .send()
            .await
            .map_err(|e| ExtractionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        response
            .json::<MessagesResponse>()
            .await
            .map_err(|e| ExtractionError::InvalidOutput(e.to_string()))
    }
}

#[async_trait]
impl ReceiptExtractor for AnthropicExtractor {
    async fn extract(
        &self,
        ocr_text: &str,
        source_id: Option<&str>,
    ) -> Result<ExtractionResult, ExtractionError> {
        let start = Instant::now();

        let response = self
            .retry
            .run("Anthropic extraction", ExtractionError::is_retryable, || {
                self.send_once(ocr_text)
            })
            .await?;

        let mut result = interpret_response(response)?;
        if let Some(id) = source_id {
            result.receipt = result.receipt.with_file_id(id);
        }
        result.processing_time_ms = start.elapsed().as_millis() as u64;

        debug!(
            input_tokens = result.input_tokens,
            output_tokens = result.output_tokens,
            cache_read = result.cache_read_input_tokens,
            elapsed_ms = result.processing_time_ms,
            "Extraction complete"
        );
        Ok(result)
    }
}

/// Map a successful HTTP response onto the extraction outcome.
fn interpret_response(response: MessagesResponse) -> Result<ExtractionResult, ExtractionError> {
    match response.stop_reason.as_deref() {
        Some("refusal") => return Err(ExtractionError::Refused),
        Some("max_tokens") => return Err(ExtractionError::Incomplete),
        _ => {}
    }

    let text = response
        .content
        .iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text.as_deref())
        .ok_or_else(|| ExtractionError::InvalidOutput("response contained no text content".into()))?;

    let data: ReceiptData =
        serde_json::from_str(text).map_err(|e| ExtractionError::InvalidOutput(e.to_string()))?;
    let receipt = Receipt::try_from(data)?;

    let usage = response.usage;
    let mut result = ExtractionResult::new(receipt);
    result.input_tokens = usage.input_tokens;
    result.output_tokens = usage.output_tokens;
    result.cache_creation_input_tokens = usage.cache_creation_input_tokens.unwrap_or(0);
    result.cache_read_input_tokens = usage.cache_read_input_tokens.unwrap_or(0);
    Ok(result)
}
