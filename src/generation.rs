use async_trait::async_trait;

use crate::image_processing::{OutputFormat, ResizeSpec};

pub const MAX_SOURCE_IMAGE_BYTES: usize = 2 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Credential {
    #[default]
    ServiceDefault,
    Supplied(String),
}

impl Credential {
    /// Blank keys count as "not supplied".
    pub fn from_optional(raw: Option<String>) -> Self {
        match raw {
            Some(value) if !value.trim().is_empty() => Self::Supplied(value.trim().to_string()),
            _ => Self::ServiceDefault,
        }
    }
}

/// A validated edit request. Built once per inbound call and never mutated.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub source: SourceImage,
    pub prompt: String,
    pub resize: ResizeSpec,
    pub output_format: OutputFormat,
    pub credential: Credential,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    AuthFailure,
    QuotaExceededUpstream,
    Transient,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenerationResult {
    Success { image_bytes: Vec<u8>, mime_type: String },
    /// The backend answered but only with commentary.
    NoImageReturned { diagnostic_text: String },
    BackendError { message: String, classification: FailureClass },
}

#[derive(Debug, thiserror::Error)]
#[error("No API key provided. Please add your Google Gemini API key in Settings.")]
pub struct MissingCredential;

/// The external image generation service.
///
/// Implementations receive already validated input and make a single round
/// trip. Credential resolution happens before any network traffic.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, MissingCredential>;
}

pub fn resolve_credential<'a>(
    credential: &'a Credential,
    default_key: Option<&'a str>,
) -> Result<&'a str, MissingCredential> {
    match credential {
        Credential::Supplied(key) if !key.trim().is_empty() => Ok(key.as_str()),
        _ => default_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(MissingCredential),
    }
}
