pub mod auth;
pub mod edit_image;
pub mod extract;
pub mod quota;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::error::EditError;
use crate::pipeline::RequestPipeline;

pub use auth::AuthenticatedUser;

/// Transport cap for the multipart body. Kept above the image cap so an
/// oversized image is reported by validation rather than cut off mid-stream.
pub const MAX_UPLOAD_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RequestPipeline>,
    pub user_id_header: Arc<str>,
}

impl AppState {
    pub fn new(pipeline: Arc<RequestPipeline>, user_id_header: &str) -> Self {
        Self {
            pipeline,
            user_id_header: Arc::from(user_id_header.to_lowercase()),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    used: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ai_response: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,
}

pub fn json_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
            used: None,
            limit: None,
            ai_response: None,
            retryable: false,
        }),
    )
        .into_response()
}

impl IntoResponse for EditError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = ErrorResponse {
            error: self.to_string(),
            used: None,
            limit: None,
            ai_response: None,
            retryable: self.is_retryable(),
        };
        match self {
            EditError::QuotaExceeded(exceeded) => {
                body.used = Some(exceeded.used);
                body.limit = Some(exceeded.limit);
            }
            EditError::NoImageReturned { diagnostic } => {
                body.ai_response = Some(diagnostic);
            }
            _ => {}
        }
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/edit-image",
            post(edit_image::handle_edit_image)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY_BYTES)),
        )
        .route("/api/quota", get(quota::get_quota).post(quota::update_quota))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
