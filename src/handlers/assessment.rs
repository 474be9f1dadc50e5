// src/handlers/assessment.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::assessment::{
        Assessment, RecordScoreRequest, StartAssessmentRequest, SubmitTaskRequest,
        SubmitTaskResponse, TaskId, TaskProgress,
    },
    scoring,
    state::AppState,
    utils::jwt::Claims,
};

/// Query parameters for operations that may carry a session binding.
#[derive(Debug, Deserialize)]
pub struct SessionParams {
    pub session_id: Option<String>,
}

/// Can the learner start a new assessment right now?
pub async fn eligibility(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let decision = state.assessments.can_start(claims.learner_id()).await;
    Ok(Json(decision))
}

/// Returns the learner's open assessment, creating one when the retry
/// policy allows. A policy denial is a 403 carrying the reason string.
pub async fn start(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<StartAssessmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let learner_id = claims.learner_id();
    let grade_level = payload.grade_level.unwrap_or(2);
    let session_id = payload.session_id.as_deref();

    let assessment = state
        .assessments
        .get_or_create(learner_id, grade_level, session_id)
        .await;

    match assessment {
        Some(assessment) => Ok(Json(assessment)),
        None => {
            // Distinguish a policy denial from a store failure.
            let decision = state.assessments.can_start(learner_id).await;
            if decision.allowed {
                Err(AppError::InternalServerError(
                    "Failed to create assessment".to_string(),
                ))
            } else {
                Err(AppError::Forbidden(decision.reason.unwrap_or_else(|| {
                    "Attempt limit reached".to_string()
                })))
            }
        }
    }
}

/// The learner's open assessment, if any. Never creates one.
pub async fn current(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<SessionParams>,
) -> Result<impl IntoResponse, AppError> {
    state
        .assessments
        .get_current(claims.learner_id(), params.session_id.as_deref())
        .await
        .map(Json)
        .ok_or(AppError::NotFound("No assessment in progress".to_string()))
}

/// The learner's highest-scoring assessment.
pub async fn best(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    state
        .assessments
        .get_best(claims.learner_id())
        .await
        .map(Json)
        .ok_or(AppError::NotFound("No assessments yet".to_string()))
}

/// Marks the learner's open assessment complete.
pub async fn complete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state
        .assessments
        .complete(assessment_id, claims.learner_id())
        .await
        .map(Json)
        .ok_or(AppError::NotFound(
            "No open assessment with that id".to_string(),
        ))
}

/// Grades a learner's answers for one task against the catalog's
/// question key and records the result.
pub async fn submit_task(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((assessment_id, task)): Path<(i64, String)>,
    Json(payload): Json<SubmitTaskRequest>,
) -> Result<impl IntoResponse, AppError> {
    let task = parse_task(&task)?;
    let assessment = owned_open_assessment(&state, assessment_id, claims.learner_id()).await?;

    let spec = state
        .assessments
        .catalog()
        .task(task)
        .ok_or(AppError::NotFound(format!(
            "Task {} is not in the catalog",
            task
        )))?;

    let grade = scoring::grade_task(&payload.answers, &spec.questions, spec.points);

    let recorded = state
        .assessments
        .record_score(assessment.id, task, None, grade.score)
        .await;
    if !recorded {
        return Err(AppError::InternalServerError(
            "Failed to record task score".to_string(),
        ));
    }

    Ok(Json(SubmitTaskResponse {
        task,
        score: grade.score,
        correct_count: grade.correct_count,
        question_count: grade.question_count,
        recorded,
    }))
}

/// Records a raw task/subtask score (e.g. an externally graded task).
pub async fn record_score(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((assessment_id, task)): Path<(i64, String)>,
    Json(payload): Json<RecordScoreRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let task = parse_task(&task)?;
    let assessment = owned_open_assessment(&state, assessment_id, claims.learner_id()).await?;

    let recorded = state
        .assessments
        .record_score(assessment.id, task, payload.subtask.as_deref(), payload.score)
        .await;
    if !recorded {
        return Err(AppError::InternalServerError(
            "Failed to record score".to_string(),
        ));
    }

    Ok(Json(json!({ "success": true })))
}

/// Saves the transient answer snapshot for a task.
pub async fn save_progress(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((assessment_id, task)): Path<(i64, String)>,
    Json(progress): Json<TaskProgress>,
) -> Result<impl IntoResponse, AppError> {
    let task = parse_task(&task)?;
    let assessment = owned_open_assessment(&state, assessment_id, claims.learner_id()).await?;

    let saved = state
        .assessments
        .save_progress(assessment.id, task, &progress)
        .await;
    if !saved {
        return Err(AppError::InternalServerError(
            "Failed to save progress".to_string(),
        ));
    }

    Ok(Json(json!({ "success": true })))
}

/// Loads the saved snapshot for a task. Absent or stale progress is a
/// JSON null, not an error.
pub async fn load_progress(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((assessment_id, task)): Path<(i64, String)>,
) -> Result<impl IntoResponse, AppError> {
    let task = parse_task(&task)?;
    let assessment = owned_assessment(&state, assessment_id, claims.learner_id()).await?;

    let progress = state.assessments.load_progress(assessment.id, task).await;
    Ok(Json(progress))
}

/// Clears the saved snapshot for a task.
pub async fn clear_progress(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((assessment_id, task)): Path<(i64, String)>,
) -> Result<impl IntoResponse, AppError> {
    let task = parse_task(&task)?;
    let assessment = owned_assessment(&state, assessment_id, claims.learner_id()).await?;

    let cleared = state.assessments.clear_progress(assessment.id, task).await;
    if !cleared {
        return Err(AppError::InternalServerError(
            "Failed to clear progress".to_string(),
        ));
    }

    Ok(Json(json!({ "success": true })))
}

fn parse_task(raw: &str) -> Result<TaskId, AppError> {
    TaskId::parse(raw).ok_or(AppError::BadRequest(format!(
        "Unknown task identifier '{}'",
        raw
    )))
}

/// Fetches the assessment and checks it belongs to the caller.
async fn owned_assessment(
    state: &AppState,
    assessment_id: i64,
    learner_id: i64,
) -> Result<Assessment, AppError> {
    let assessment = state
        .store
        .find_assessment(assessment_id)
        .await
        .map_err(|e| {
            tracing::error!("Error fetching assessment {}: {}", assessment_id, e);
            AppError::InternalServerError(e.to_string())
        })?
        .ok_or(AppError::NotFound("Assessment not found".to_string()))?;

    if assessment.learner_id != learner_id {
        return Err(AppError::Forbidden(
            "Assessment belongs to another learner".to_string(),
        ));
    }

    Ok(assessment)
}

/// Like `owned_assessment`, but also rejects writes to a completed attempt.
async fn owned_open_assessment(
    state: &AppState,
    assessment_id: i64,
    learner_id: i64,
) -> Result<Assessment, AppError> {
    let assessment = owned_assessment(state, assessment_id, learner_id).await?;
    if !assessment.is_open() {
        return Err(AppError::Conflict(
            "Assessment is already completed".to_string(),
        ));
    }
    Ok(assessment)
}
