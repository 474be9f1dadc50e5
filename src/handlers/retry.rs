// src/handlers/retry.rs

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError, models::retry::CreateRetryRequest, state::AppState, utils::jwt::Claims,
    utils::sanitize::clean_text,
};

/// Creates a pending retry request for the calling learner. The reason
/// text is sanitized before storage; admin review happens elsewhere.
pub async fn create_retry_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateRetryRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let reason = payload.reason.as_deref().and_then(clean_text);

    let request = state
        .store
        .insert_retry_request(claims.learner_id(), reason.as_deref())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create retry request: {}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "id": request.id,
            "status": request.status
        })),
    ))
}
