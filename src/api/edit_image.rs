use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use base64::Engine;
use serde::Serialize;

use crate::api::{AppState, AuthenticatedUser, extract::FormData, json_error};
use crate::pipeline::{EditSubmission, UploadedImage};
use crate::quota::QuotaStatus;

#[derive(Serialize)]
struct EditImageResponse {
    image: String,
    format: &'static str,
    quota: QuotaStatus,
}

pub async fn handle_edit_image(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    FormData(multipart): FormData,
) -> Response {
    let submission = match read_submission(multipart).await {
        Ok(submission) => submission,
        Err(response) => return response,
    };

    match state.pipeline.handle(&user_id, submission).await {
        Ok(outcome) => {
            let image = base64::engine::general_purpose::STANDARD.encode(&outcome.image);
            (
                StatusCode::OK,
                Json(EditImageResponse {
                    image,
                    format: outcome.format.as_str(),
                    quota: outcome.quota,
                }),
            )
                .into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn read_submission(mut multipart: Multipart) -> Result<EditSubmission, Response> {
    let mut submission = EditSubmission::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                let message = format!("Failed to read form: {}", err.body_text());
                return Err(json_error(err.status(), &message));
            }
        };
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(|err| {
                json_error(err.status(), &format!("Failed to read image: {}", err.body_text()))
            })?;
            submission.image = Some(UploadedImage {
                bytes: bytes.to_vec(),
                content_type,
            });
            continue;
        }

        let slot = match name.as_str() {
            "prompt" => &mut submission.prompt,
            "resizeOption" => &mut submission.resize_option,
            "width" => &mut submission.width,
            "height" => &mut submission.height,
            "format" => &mut submission.format,
            "apiKey" => &mut submission.api_key,
            "customLimit" => &mut submission.custom_limit,
            _ => continue,
        };
        let value = field.text().await.map_err(|err| {
            json_error(err.status(), &format!("Failed to read field {name}: {}", err.body_text()))
        })?;
        *slot = Some(value);
    }
    Ok(submission)
}
