//! Client for the Gemini `generateContent` REST endpoint.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use super::config::InferenceConfig;
use super::shell::InferenceBackend;
use crate::capabilities::{GenerateRequest, InferenceError, InferenceOutput, InferenceResult};

const API_KEY_HEADER: &str = "x-goog-api-key";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY_CHARS: usize = 512;

// --- Wire format ---

#[derive(Debug, Serialize)]
struct GenerateContentBody<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

fn request_body(request: &GenerateRequest) -> GenerateContentBody<'_> {
    let data = base64::engine::general_purpose::STANDARD.encode(&request.image.data);
    GenerateContentBody {
        contents: vec![Content {
            parts: vec![
                Part::Text {
                    text: &request.prompt,
                },
                Part::InlineData {
                    inline_data: Blob {
                        mime_type: &request.image.mime_type,
                        data,
                    },
                },
            ],
        }],
    }
}

/// Joins the text parts of the first candidate.
fn extract_text(body: &str) -> Result<String, InferenceError> {
    let response: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("invalid JSON: {e}"),
        })?;

    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = match response.prompt_feedback.and_then(|f| f.block_reason) {
            Some(block_reason) => format!("prompt blocked: {block_reason}"),
            None => "response contained no candidates".to_string(),
        };
        return Err(InferenceError::MalformedResponse { reason });
    };

    let text: String = candidate
        .content
        .map(|content| content.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| part.text)
        .collect();

    if text.is_empty() {
        let reason = match candidate.finish_reason {
            Some(finish_reason) => format!("candidate has no text (finish reason {finish_reason})"),
            None => "candidate has no text".to_string(),
        };
        return Err(InferenceError::MalformedResponse { reason });
    }

    Ok(text)
}

fn parse_error(status: u16, body: &str) -> InferenceError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.status {
            Some(code) if !envelope.error.message.is_empty() => {
                format!("{code}: {}", envelope.error.message)
            }
            Some(code) => code,
            None => envelope.error.message,
        },
        Err(_) if body.trim().is_empty() => format!("HTTP error: {status}"),
        Err(_) => body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    };
    InferenceError::Api { status, message }
}

pub struct GeminiClient {
    http: Client,
    config: InferenceConfig,
    endpoint: Url,
}

impl GeminiClient {
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        let endpoint = config
            .generate_url()
            .map_err(|e| InferenceError::Network {
                message: e.to_string(),
            })?;

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("leafscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| InferenceError::Network {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            config,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    #[instrument(skip(self, request), fields(model = %self.config.model, bytes = request.image.len()))]
    pub async fn generate_content(&self, request: &GenerateRequest) -> InferenceResult {
        let timeout_ms = self.request_timeout_ms(request);
        let body = request_body(request);

        let response = self
            .http
            .post(self.endpoint.clone())
            .header(API_KEY_HEADER, self.config.api_key())
            .header(CONTENT_TYPE, "application/json")
            .timeout(Duration::from_millis(timeout_ms))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(&e, timeout_ms))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(&e, timeout_ms))?;

        if !status.is_success() {
            let error = parse_error(status.as_u16(), &text);
            warn!(status = status.as_u16(), %error, "generateContent rejected");
            return Err(error);
        }

        let text = extract_text(&text)?;
        debug!(chars = text.len(), "generateContent succeeded");
        Ok(InferenceOutput::new(text))
    }

    /// The tighter of the per-request bound and `GEMINI_TIMEOUT_SECS`.
    fn request_timeout_ms(&self, request: &GenerateRequest) -> u64 {
        request.timeout_ms.min(self.config.timeout_ms())
    }

    fn transport_error(&self, e: &reqwest::Error, timeout_ms: u64) -> InferenceError {
        if e.is_timeout() {
            warn!(timeout_ms, "generateContent timed out");
            InferenceError::Timeout { timeout_ms }
        } else {
            warn!(error = %e, model = %self.config.model, "generateContent transport failure");
            InferenceError::Network {
                message: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl InferenceBackend for GeminiClient {
    async fn generate(&self, request: GenerateRequest) -> InferenceResult {
        self.generate_content(&request).await
    }
}
