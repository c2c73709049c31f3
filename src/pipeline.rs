use std::sync::Arc;

use crate::error::EditError;
use crate::generation::{
    Credential, GenerationClient, GenerationRequest, GenerationResult, MAX_SOURCE_IMAGE_BYTES,
    SourceImage,
};
use crate::image_processing::{self, OutputFormat, ResizeSpec};
use crate::quota::{self, QuotaStatus, QuotaStore};

/// Raw fields of an inbound edit request, before any validation.
#[derive(Clone, Debug, Default)]
pub struct EditSubmission {
    pub image: Option<UploadedImage>,
    pub prompt: Option<String>,
    pub resize_option: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub format: Option<String>,
    pub api_key: Option<String>,
    pub custom_limit: Option<String>,
}

#[derive(Clone, Debug)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Clone, Debug)]
pub struct EditOutcome {
    pub image: Vec<u8>,
    pub format: OutputFormat,
    pub quota: QuotaStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Validating,
    QuotaChecking,
    Generating,
    PostProcessing,
    Committing,
    Responding,
}

/// A validated submission plus the daily limit that applies to it.
#[derive(Clone, Debug)]
pub struct ValidatedEdit {
    pub request: GenerationRequest,
    pub limit: u32,
}

pub struct RequestPipeline {
    quota: Arc<QuotaStore>,
    client: Arc<dyn GenerationClient>,
    default_limit: u32,
}

impl RequestPipeline {
    pub fn new(
        quota: Arc<QuotaStore>,
        client: Arc<dyn GenerationClient>,
        default_limit: u32,
    ) -> Self {
        Self {
            quota,
            client,
            default_limit,
        }
    }

    pub fn quota(&self) -> &QuotaStore {
        &self.quota
    }

    pub fn default_limit(&self) -> u32 {
        self.default_limit
    }

    /// Runs one edit request end to end. Quota is committed only after the
    /// generated image has been post-processed successfully.
    pub async fn handle(
        &self,
        user_id: &str,
        submission: EditSubmission,
    ) -> Result<EditOutcome, EditError> {
        let mut stage = Stage::Validating;
        let result = self.run(user_id, submission, &mut stage).await;
        match &result {
            Ok(outcome) => tracing::info!(
                user_id,
                format = outcome.format.as_str(),
                bytes = outcome.image.len(),
                used = outcome.quota.used,
                limit = outcome.quota.limit,
                "edit request succeeded"
            ),
            Err(err) => tracing::warn!(user_id, ?stage, error = %err, "edit request failed"),
        }
        result
    }

    async fn run(
        &self,
        user_id: &str,
        submission: EditSubmission,
        stage: &mut Stage,
    ) -> Result<EditOutcome, EditError> {
        let ValidatedEdit { request, limit } = validate(submission, self.default_limit)?;

        advance(stage, Stage::QuotaChecking);
        self.quota.check_and_reserve(user_id, limit)?;

        advance(stage, Stage::Generating);
        let (image_bytes, backend_mime) = match self.client.generate(&request).await? {
            GenerationResult::Success { image_bytes, mime_type } => (image_bytes, mime_type),
            GenerationResult::NoImageReturned { diagnostic_text } => {
                return Err(EditError::NoImageReturned {
                    diagnostic: diagnostic_text,
                });
            }
            GenerationResult::BackendError { message, classification } => {
                return Err(EditError::from_backend(message, classification));
            }
        };
        tracing::debug!(
            bytes = image_bytes.len(),
            mime_type = %backend_mime,
            "backend returned image"
        );

        advance(stage, Stage::PostProcessing);
        let resize = request.resize;
        let format = request.output_format;
        let image = tokio::task::spawn_blocking(move || {
            image_processing::transform(&image_bytes, resize, format)
        })
        .await
        .map_err(|err| EditError::Internal(format!("image worker failed: {err}")))??;

        advance(stage, Stage::Committing);
        let status = self.quota.commit(user_id, limit);

        advance(stage, Stage::Responding);
        Ok(EditOutcome {
            image,
            format,
            quota: status,
        })
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    tracing::debug!(from = ?*stage, to = ?next, "pipeline stage");
    *stage = next;
}

pub fn validate(
    submission: EditSubmission,
    default_limit: u32,
) -> Result<ValidatedEdit, EditError> {
    let image = submission
        .image
        .filter(|image| !image.bytes.is_empty())
        .ok_or(EditError::MissingInput("image"))?;
    let prompt = submission
        .prompt
        .map(|prompt| prompt.trim().to_string())
        .filter(|prompt| !prompt.is_empty())
        .ok_or(EditError::MissingInput("prompt"))?;
    if image.bytes.len() > MAX_SOURCE_IMAGE_BYTES {
        return Err(EditError::PayloadTooLarge {
            size: image.bytes.len(),
            limit: MAX_SOURCE_IMAGE_BYTES,
        });
    }

    let mime_type = resolve_source_mime(&image)?;
    let resize = parse_resize(
        submission.resize_option.as_deref(),
        submission.width.as_deref(),
        submission.height.as_deref(),
    )?;
    let output_format = parse_format(submission.format.as_deref());
    let custom_limit = parse_custom_limit(submission.custom_limit.as_deref())?;

    Ok(ValidatedEdit {
        request: GenerationRequest {
            source: SourceImage {
                bytes: image.bytes,
                mime_type,
            },
            prompt,
            resize,
            output_format,
            credential: Credential::from_optional(submission.api_key),
        },
        limit: quota::resolve_limit(custom_limit, default_limit),
    })
}

fn resolve_source_mime(image: &UploadedImage) -> Result<String, EditError> {
    let declared = image
        .content_type
        .as_deref()
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_lowercase())
        .filter(|value| value.starts_with("image/"));
    declared
        .or_else(|| image_processing::detect_mime_type(&image.bytes).map(str::to_string))
        .ok_or_else(|| EditError::InvalidInput("Unsupported image type".to_string()))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub fn parse_resize(
    option: Option<&str>,
    width: Option<&str>,
    height: Option<&str>,
) -> Result<ResizeSpec, EditError> {
    match non_blank(option) {
        None | Some("original") => Ok(ResizeSpec::Original),
        Some("resize") => {
            let (Some(width), Some(height)) = (non_blank(width), non_blank(height)) else {
                return Err(EditError::InvalidInput(
                    "width and height are required when resizing".to_string(),
                ));
            };
            let parse = |raw: &str| {
                raw.parse::<i64>()
                    .map_err(|_| EditError::InvalidInput(format!("invalid dimension: {raw}")))
            };
            let (width, height) = (parse(width)?, parse(height)?);
            match (u32::try_from(width), u32::try_from(height)) {
                (Ok(w), Ok(h)) if image_processing::dimensions_supported(w, h) => {
                    Ok(ResizeSpec::Exact { width: w, height: h })
                }
                _ => Err(EditError::UnsupportedDimensions { width, height }),
            }
        }
        Some(other) => Err(EditError::InvalidInput(format!("unknown resizeOption: {other}"))),
    }
}

pub fn parse_format(raw: Option<&str>) -> OutputFormat {
    match non_blank(raw) {
        None => OutputFormat::default(),
        Some(name) => OutputFormat::parse(name).unwrap_or_else(|| {
            tracing::warn!(format = name, "unknown output format, using webp");
            OutputFormat::default()
        }),
    }
}

fn parse_custom_limit(raw: Option<&str>) -> Result<Option<u32>, EditError> {
    match non_blank(raw) {
        None => Ok(None),
        Some(value) => value.parse::<u32>().map(Some).map_err(|_| {
            EditError::InvalidInput("customLimit must be a non-negative integer".to_string())
        }),
    }
}
