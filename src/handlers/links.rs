use crate::{
    error::AppError,
    models::{CreateLinkRequest, LinkAnalytics, ShortenResponse},
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use std::sync::Arc;

/// POST /shorten
///
/// Body: `{"originalUrl": "...", "expirationDate": "..."?}`. A body that is
/// not valid JSON is answered with 400 like any other invalid input.
pub async fn shorten(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateLinkRequest>, JsonRejection>,
) -> Result<Json<ShortenResponse>, AppError> {
    let Json(req) = payload.map_err(|rejection| {
        tracing::debug!("Rejected shorten body: {}", rejection.body_text());
        AppError::invalid(format!("Invalid request body: {}", rejection.body_text()))
    })?;

    let link = state
        .registry
        .create(req.original_url.as_deref(), req.expiration_date.as_deref())?;

    Ok(Json(ShortenResponse {
        shortened_url: link.short_url,
    }))
}

/// GET /analytics/:code
///
/// Full snapshot of the record and its visit log. Read-only.
pub async fn analytics(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<LinkAnalytics>, AppError> {
    Ok(Json(state.registry.analytics(&code)?))
}
