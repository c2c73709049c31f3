use axum::http::StatusCode;

use crate::generation::{FailureClass, MissingCredential};
use crate::image_processing::{MAX_OUTPUT_DIMENSION, MAX_OUTPUT_PIXELS, ProcessingError};
use crate::quota::QuotaExceeded;

/// Every way an edit request can end without an image.
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("Missing input: {0}")]
    MissingInput(&'static str),

    #[error("{0}")]
    InvalidInput(String),

    #[error("File exceeds {}MB limit", .limit / (1024 * 1024))]
    PayloadTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    QuotaExceeded(#[from] QuotaExceeded),

    #[error(transparent)]
    MissingCredential(#[from] MissingCredential),

    #[error("The image service rejected the API key. Check your credential configuration. ({0})")]
    BackendAuth(String),

    #[error("The image service quota is exhausted, try again later or use your own API key. ({0})")]
    BackendQuota(String),

    #[error("Processing failed, please try again. ({0})")]
    BackendTransient(String),

    #[error("Processing failed. ({0})")]
    BackendUnknown(String),

    /// The backend ran but only produced commentary.
    #[error("The AI model did not return an edited image")]
    NoImageReturned { diagnostic: String },

    #[error("Processing failed: the generated image could not be decoded ({0})")]
    Decode(String),

    #[error(
        "Unsupported dimensions {width}x{height}: each side must be between 1 and {} pixels, \
         at most {} pixels in total",
        MAX_OUTPUT_DIMENSION,
        MAX_OUTPUT_PIXELS
    )]
    UnsupportedDimensions { width: i64, height: i64 },

    #[error("Processing failed: {0}")]
    Encode(String),

    #[error("Processing failed: {0}")]
    Internal(String),
}

impl EditError {
    pub fn from_backend(message: String, classification: FailureClass) -> Self {
        match classification {
            FailureClass::AuthFailure => Self::BackendAuth(message),
            FailureClass::QuotaExceededUpstream => Self::BackendQuota(message),
            FailureClass::Transient => Self::BackendTransient(message),
            FailureClass::Unknown => Self::BackendUnknown(message),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingInput(_)
            | Self::InvalidInput(_)
            | Self::MissingCredential(_)
            | Self::NoImageReturned { .. }
            | Self::UnsupportedDimensions { .. } => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::BackendAuth(_)
            | Self::BackendQuota(_)
            | Self::BackendTransient(_)
            | Self::BackendUnknown(_)
            | Self::Decode(_)
            | Self::Encode(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the same request may succeed if sent again unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendTransient(_) | Self::BackendUnknown(_))
    }
}

impl From<ProcessingError> for EditError {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::Decode(message) => Self::Decode(message),
            ProcessingError::UnsupportedDimensions { width, height } => {
                Self::UnsupportedDimensions {
                    width: i64::from(width),
                    height: i64::from(height),
                }
            }
            err @ ProcessingError::Encode { .. } => Self::Encode(err.to_string()),
        }
    }
}
