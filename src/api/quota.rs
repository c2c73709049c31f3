use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::api::{
    AppState, AuthenticatedUser,
    extract::{JsonBody, QueryParams},
};
use crate::error::EditError;
use crate::quota::resolve_limit;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaQuery {
    pub custom_limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaUpdate {
    #[serde(default)]
    pub custom_limit: Option<u32>,
    #[serde(default)]
    pub increment: bool,
}

/// Read-only view of today's usage.
pub async fn get_quota(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    QueryParams(query): QueryParams<QuotaQuery>,
) -> Response {
    let custom_limit = query
        .custom_limit
        .as_deref()
        .and_then(|value| value.trim().parse::<u32>().ok());
    let limit = resolve_limit(custom_limit, state.pipeline.default_limit());
    Json(state.pipeline.quota().peek(&user_id, limit)).into_response()
}

/// `increment: false` checks whether another generation is allowed,
/// `increment: true` records one.
pub async fn update_quota(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    JsonBody(update): JsonBody<QuotaUpdate>,
) -> Response {
    let limit = resolve_limit(update.custom_limit, state.pipeline.default_limit());
    let store = state.pipeline.quota();
    if update.increment {
        let status = store.commit(&user_id, limit);
        tracing::info!(user_id = %user_id, used = status.used, limit, "quota committed");
        return Json(status).into_response();
    }
    match store.check_and_reserve(&user_id, limit) {
        Ok(status) => Json(status).into_response(),
        Err(exceeded) => EditError::from(exceeded).into_response(),
    }
}
