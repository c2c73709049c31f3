use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::time::Duration;

use crate::generation::{
    FailureClass, GenerationClient, GenerationRequest, GenerationResult, MissingCredential,
    resolve_credential,
};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-image";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
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
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    #[serde(alias = "inline_data")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(alias = "mime_type")]
    mime_type: Option<String>,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
}

/// Google Gemini `generateContent` backend.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
    default_api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        default_api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
            default_api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

pub fn build_instruction(prompt: &str) -> String {
    format!("Based on this image, {}", prompt.trim())
}

fn build_request_body(request: &GenerationRequest) -> serde_json::Value {
    let data = base64::engine::general_purpose::STANDARD.encode(&request.source.bytes);
    json!({
        "contents": [
            {
                "role": "user",
                "parts": [
                    {"text": build_instruction(&request.prompt)},
                    {"inline_data": {"mime_type": request.source.mime_type, "data": data}}
                ]
            }
        ],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"]
        }
    })
}

fn classify_status(status: StatusCode, body: &str) -> FailureClass {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FailureClass::AuthFailure,
        StatusCode::BAD_REQUEST if body.contains("API_KEY_INVALID") => FailureClass::AuthFailure,
        StatusCode::TOO_MANY_REQUESTS => FailureClass::QuotaExceededUpstream,
        StatusCode::REQUEST_TIMEOUT => FailureClass::Transient,
        status if status.is_server_error() => FailureClass::Transient,
        _ => FailureClass::Unknown,
    }
}

fn classify_transport(err: &reqwest::Error) -> FailureClass {
    if err.is_timeout() || err.is_connect() {
        FailureClass::Transient
    } else {
        FailureClass::Unknown
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .and_then(|error| error.message)
        .unwrap_or_else(|| body.trim().to_string());
    format!("Gemini request failed: {status} {detail}")
}

/// Turns a successful HTTP body into a [`GenerationResult`]. The first inline
/// image part wins; without one, any text parts become the diagnostic.
fn interpret_response(body: &str) -> GenerationResult {
    let payload: GenerateContentResponse = match serde_json::from_str(body) {
        Ok(payload) => payload,
        Err(err) => {
            return GenerationResult::BackendError {
                message: format!("unreadable Gemini response: {err}"),
                classification: FailureClass::Unknown,
            };
        }
    };

    let candidate = match payload.candidates.and_then(|candidates| candidates.into_iter().next()) {
        Some(candidate) => candidate,
        None => {
            let message = match payload.prompt_feedback.and_then(|feedback| feedback.block_reason) {
                Some(reason) => format!("No response from AI model (blocked: {reason})"),
                None => "No response from AI model".to_string(),
            };
            return GenerationResult::BackendError {
                message,
                classification: FailureClass::Unknown,
            };
        }
    };

    let parts = candidate
        .content
        .and_then(|content| content.parts)
        .unwrap_or_default();
    let mut texts = Vec::new();
    for part in parts {
        if let Some(inline) = part.inline_data {
            return match base64::engine::general_purpose::STANDARD.decode(inline.data.as_bytes()) {
                Ok(image_bytes) => GenerationResult::Success {
                    image_bytes,
                    mime_type: inline.mime_type.unwrap_or_else(|| "image/png".to_string()),
                },
                Err(err) => GenerationResult::BackendError {
                    message: format!("invalid inline image data: {err}"),
                    classification: FailureClass::Unknown,
                },
            };
        }
        if let Some(text) = part.text {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                texts.push(trimmed.to_string());
            }
        }
    }

    let diagnostic_text = if texts.is_empty() {
        match candidate.finish_reason {
            Some(reason) => format!("finish reason: {reason}"),
            None => String::new(),
        }
    } else {
        texts.join("\n")
    };
    GenerationResult::NoImageReturned { diagnostic_text }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, MissingCredential> {
        let api_key = resolve_credential(&request.credential, self.default_api_key.as_deref())?;
        let body = build_request_body(request);

        tracing::debug!(
            model = %self.model,
            mime_type = %request.source.mime_type,
            bytes = request.source.bytes.len(),
            "sending generateContent request"
        );
        let response = match self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let classification = classify_transport(&err);
                tracing::warn!(?classification, error = %err, "Gemini request did not complete");
                return Ok(GenerationResult::BackendError {
                    message: format!("Gemini request failed: {err}"),
                    classification,
                });
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                return Ok(GenerationResult::BackendError {
                    message: format!("reading Gemini response failed: {err}"),
                    classification: classify_transport(&err),
                });
            }
        };
        tracing::debug!(%status, "Gemini response received");

        if !status.is_success() {
            let classification = classify_status(status, &text);
            tracing::warn!(%status, ?classification, "Gemini returned an error status");
            return Ok(GenerationResult::BackendError {
                message: error_message(status, &text),
                classification,
            });
        }
        Ok(interpret_response(&text))
    }
}
