// src/handlers/auth.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::profile::{LoginRequest, RegisterRequest},
    state::AppState,
    store::StoreError,
    utils::{
        hash::{hash_password, verify_password},
        jwt::sign_jwt,
    },
};

/// Registers a new learner profile.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created and the profile (excluding the password hash).
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let hashed_password = hash_password(&payload.password)?;

    let profile = state
        .store
        .create_profile(&payload.username, &hashed_password, "learner")
        .await
        .map_err(|e| match e {
            StoreError::UniqueViolation => {
                AppError::Conflict(format!("Username '{}' already exists", payload.username))
            }
            other => {
                tracing::error!("Failed to register profile: {}", other);
                AppError::InternalServerError(other.to_string())
            }
        })?;

    Ok((StatusCode::CREATED, Json(profile)))
}

/// Authenticates a profile and returns a JWT token.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let profile = state
        .store
        .find_profile_by_username(&payload.username)
        .await
        .map_err(|e| {
            tracing::error!("Login store error: {}", e);
            AppError::InternalServerError(e.to_string())
        })?
        .ok_or(AppError::AuthError("Profile not found".to_string()))?;

    let is_valid = verify_password(&payload.password, &profile.password)?;

    if !is_valid {
        return Err(AppError::AuthError("Invalid password".to_string()));
    }

    let token = sign_jwt(
        profile.id,
        &profile.role,
        &state.config.jwt_secret,
        state.config.jwt_expiration,
    )?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "role": profile.role
    })))
}
