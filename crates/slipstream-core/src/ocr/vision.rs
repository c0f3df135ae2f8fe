//! Google Cloud Vision text detection.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{api_error_message, OcrError};
use crate::handle::LazyHandle;
use crate::models::config::OcrConfig;

use super::{ensure_regular_file, OcrBackend};

/// How requests to the Vision API are authenticated.
#[derive(Clone)]
pub enum VisionCredential {
    /// API key sent as the `key` query parameter.
    ApiKey(String),
    /// OAuth access token sent as a bearer token.
    Bearer(String),
}

impl std::fmt::Debug for VisionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisionCredential::ApiKey(_) => f.write_str("ApiKey(..)"),
            VisionCredential::Bearer(_) => f.write_str("Bearer(..)"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    #[serde(default)]
    text_annotations: Vec<TextAnnotation>,
    error: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

/// OCR engine backed by the Vision `images:annotate` endpoint.
///
/// Blocking. The HTTP agent is created on first use and shared across
/// worker threads.
pub struct VisionOcrEngine {
    credential: VisionCredential,
    config: OcrConfig,
    agent: LazyHandle<ureq::Agent>,
}

impl VisionOcrEngine {
    pub fn new(credential: VisionCredential, config: OcrConfig) -> Self {
        Self {
            credential,
            config,
            agent: LazyHandle::new(),
        }
    }

    /// Create the HTTP agent ahead of the first request.
    pub fn warm_up(&self) -> Result<(), OcrError> {
        self.agent().map(|_| ())
    }

    fn agent(&self) -> Result<Arc<ureq::Agent>, OcrError> {
        self.agent.get_or_try_init(|| {
            debug!("Creating Vision HTTP agent");
            let config = ureq::Agent::config_builder()
                .timeout_global(Some(Duration::from_secs(self.config.timeout_secs)))
                .http_status_as_error(false)
                .build();
            Ok(ureq::Agent::new_with_config(config))
        })
    }

    fn request_body(&self, content: &[u8]) -> serde_json::Value {
        json!({
            "requests": [{
                "image": { "content": BASE64.encode(content) },
                "features": [{ "type": self.config.feature }],
            }]
        })
    }
}

impl OcrBackend for VisionOcrEngine {
    fn extract_text(&self, path: &Path) -> Result<String, OcrError> {
        ensure_regular_file(path)?;

        let start = Instant::now();
        let content = std::fs::read(path)?;
        let body = self.request_body(&content);
        let agent = self.agent()?;

        let mut request = agent.post(&self.config.endpoint);
        request = match &self.credential {
            VisionCredential::ApiKey(key) => request.query("key", key),
            VisionCredential::Bearer(token) => {
                request.header("authorization", &format!("Bearer {}", token))
            }
        };

        let response = request
            .send_json(&body)
            .map_err(|e| OcrError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let mut body = response.into_body();
        if !(200..300).contains(&status) {
            let text = body.read_to_string().unwrap_or_default();
            return Err(OcrError::Api {
                status,
                message: api_error_message(&text),
            });
        }

        let parsed: AnnotateResponse = body
            .read_json()
            .map_err(|e| OcrError::Decode(e.to_string()))?;
        let text = first_annotation(parsed)?;

        debug!(
            path = %path.display(),
            chars = text.chars().count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Vision OCR complete"
        );
        Ok(text)
    }
}

/// The first annotation holds the full detected text.
fn first_annotation(response: AnnotateResponse) -> Result<String, OcrError> {
    let Some(image) = response.responses.into_iter().next() else {
        return Ok(String::new());
    };

    if let Some(error) = image.error {
        return Err(OcrError::Api {
            status: u16::try_from(error.code).unwrap_or_default(),
            message: error.message,
        });
    }

    Ok(image
        .text_annotations
        .into_iter()
        .next()
        .map(|a| a.description)
        .unwrap_or_default())
}
