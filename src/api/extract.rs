use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Multipart, Query, Request},
    http::{StatusCode, request::Parts},
    response::Response,
};
use serde::de::DeserializeOwned;

use crate::api::{AppState, json_error};

// axum's own rejections are plain text with statuses like 415 or 422. These
// wrappers report every malformed body or query as a 400 `{ error }` body.

pub struct JsonBody<T>(pub T);

impl<T> FromRequest<AppState> for JsonBody<T>
where
    T: DeserializeOwned + Send,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(bad_request(&rejection.body_text())),
        }
    }
}

pub struct QueryParams<T>(pub T);

impl<T> FromRequestParts<AppState> for QueryParams<T>
where
    T: DeserializeOwned + Send,
{
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(bad_request(&rejection.body_text())),
        }
    }
}

/// A `multipart/form-data` body; any other content type is a 400.
pub struct FormData(pub Multipart);

impl FromRequest<AppState> for FormData {
    type Rejection = Response;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        Multipart::from_request(req, state)
            .await
            .map(Self)
            .map_err(|rejection| bad_request(&rejection.body_text()))
    }
}

fn bad_request(detail: &str) -> Response {
    tracing::debug!(detail, "request body rejected");
    json_error(StatusCode::BAD_REQUEST, &format!("Invalid request: {detail}"))
}
