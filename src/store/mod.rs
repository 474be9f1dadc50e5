// src/store/mod.rs

pub mod memory;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;

use crate::models::{
    assessment::{Assessment, NewAssessment, ScoreKey, TaskScoreRow, TaskTotals},
    profile::Profile,
    retry::RetryRequest,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors surfaced by a store backend. The only condition callers need to
/// distinguish is a uniqueness violation, which the lifecycle manager
/// recovers from; everything else is opaque.
#[derive(Debug)]
pub enum StoreError {
    UniqueViolation,
    Backend(String),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::UniqueViolation => write!(f, "unique constraint violation"),
            StoreError::Backend(msg) => write!(f, "store error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if err
            .as_database_error()
            .is_some_and(|db| db.is_unique_violation())
        {
            StoreError::UniqueViolation
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}

/// The relational store contract: collections `profiles`, `assessments`,
/// `assessment_task_scores` and `assessment_retry_requests` with
/// insert/update-with-returning, keyed upserts and filtered selects.
///
/// `insert_assessment` must fail with `StoreError::UniqueViolation` when
/// the learner already has an open assessment; that constraint is the
/// authoritative duplicate-creation guard.
#[async_trait]
pub trait Store: Send + Sync {
    // profiles
    async fn create_profile(
        &self,
        username: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<Profile, StoreError>;
    async fn find_profile_by_username(&self, username: &str)
    -> Result<Option<Profile>, StoreError>;

    // assessments
    async fn find_assessment(&self, assessment_id: i64) -> Result<Option<Assessment>, StoreError>;
    /// Most recent open assessment for the learner; when `session_id` is
    /// given, only one bound to that session qualifies.
    async fn find_open_assessment(
        &self,
        learner_id: i64,
        session_id: Option<&str>,
    ) -> Result<Option<Assessment>, StoreError>;
    async fn insert_assessment(&self, new: &NewAssessment) -> Result<Assessment, StoreError>;
    /// Completed attempts only; in-progress rows never count.
    async fn count_completed_assessments(&self, learner_id: i64) -> Result<i64, StoreError>;
    /// Highest total score; ties broken by store-defined order.
    async fn find_best_assessment(&self, learner_id: i64)
    -> Result<Option<Assessment>, StoreError>;
    async fn update_assessment_totals(
        &self,
        assessment_id: i64,
        totals: &TaskTotals,
    ) -> Result<Assessment, StoreError>;
    /// Stamps `completed_at` on the learner's open assessment with this id.
    /// Returns None when no such open assessment exists.
    async fn complete_assessment(
        &self,
        assessment_id: i64,
        learner_id: i64,
    ) -> Result<Option<Assessment>, StoreError>;

    // task score rows
    async fn upsert_task_score(&self, key: &ScoreKey, score: f64) -> Result<(), StoreError>;
    async fn list_task_scores(&self, assessment_id: i64) -> Result<Vec<TaskScoreRow>, StoreError>;
    async fn upsert_task_progress(
        &self,
        key: &ScoreKey,
        progress: &serde_json::Value,
    ) -> Result<(), StoreError>;
    async fn fetch_task_progress(
        &self,
        key: &ScoreKey,
    ) -> Result<Option<serde_json::Value>, StoreError>;
    async fn clear_task_progress(&self, key: &ScoreKey) -> Result<(), StoreError>;

    // retry requests
    async fn insert_retry_request(
        &self,
        learner_id: i64,
        reason: Option<&str>,
    ) -> Result<RetryRequest, StoreError>;
    /// Oldest approved, unused request for the learner.
    async fn find_retry_grant(&self, learner_id: i64) -> Result<Option<RetryRequest>, StoreError>;
    /// Marks the request used. Returns false when it was already consumed,
    /// so a grant can never authorize two creations.
    async fn consume_retry_grant(&self, request_id: i64) -> Result<bool, StoreError>;
    async fn list_retry_requests(
        &self,
        status: Option<&str>,
    ) -> Result<Vec<RetryRequest>, StoreError>;
    /// Approves or rejects a pending request. Returns None when the
    /// request does not exist or is no longer pending.
    async fn review_retry_request(
        &self,
        request_id: i64,
        status: &str,
    ) -> Result<Option<RetryRequest>, StoreError>;
}
