// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::retry::{
        ReviewRetryRequest, RetryListParams, STATUS_APPROVED, STATUS_PENDING, STATUS_REJECTED,
    },
    state::AppState,
};

/// Lists retry requests, optionally filtered by status.
/// Admin only.
pub async fn list_retry_requests(
    State(state): State<AppState>,
    Query(params): Query<RetryListParams>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(status) = params.status.as_deref() {
        if ![STATUS_PENDING, STATUS_APPROVED, STATUS_REJECTED].contains(&status) {
            return Err(AppError::BadRequest(format!(
                "Unknown status filter '{}'",
                status
            )));
        }
    }

    let requests = state
        .store
        .list_retry_requests(params.status.as_deref())
        .await
        .map_err(|e| {
            tracing::error!("Failed to list retry requests: {}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(requests))
}

/// Approves or rejects a pending retry request.
/// Admin only.
pub async fn review_retry_request(
    State(state): State<AppState>,
    Path(request_id): Path<i64>,
    Json(payload): Json<ReviewRetryRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.status != STATUS_APPROVED && payload.status != STATUS_REJECTED {
        return Err(AppError::BadRequest(
            "Status must be 'approved' or 'rejected'".to_string(),
        ));
    }

    let request = state
        .store
        .review_retry_request(request_id, &payload.status)
        .await
        .map_err(|e| {
            tracing::error!("Failed to review retry request {}: {}", request_id, e);
            AppError::InternalServerError(e.to_string())
        })?
        .ok_or(AppError::NotFound(
            "Retry request not found or already reviewed".to_string(),
        ))?;

    Ok(Json(request))
}
