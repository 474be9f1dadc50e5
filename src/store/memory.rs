// src/store/memory.rs

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::models::{
    assessment::{Assessment, NewAssessment, ScoreKey, TaskScoreRow, TaskTotals},
    profile::Profile,
    retry::{self, RetryRequest},
};

use super::{Store, StoreError};

/// In-process store with the same contract as `PgStore`, including the
/// one-open-assessment-per-learner uniqueness violation. Backs the test
/// suite so nothing in the crate needs a running database.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    profiles: Vec<Profile>,
    assessments: Vec<Assessment>,
    scores: Vec<TaskScoreRow>,
    retries: Vec<RetryRequest>,
}

impl Inner {
    fn alloc_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of assessment rows ever inserted. Used by tests asserting
    /// that concurrent creations coalesce into a single insert.
    pub fn assessment_count(&self) -> usize {
        self.inner.lock().unwrap().assessments.len()
    }
}

fn lock_err<T>(e: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Backend(format!("memory store poisoned: {}", e))
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_profile(
        &self,
        username: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<Profile, StoreError> {
        let mut inner = self.inner.lock().map_err(lock_err)?;
        if inner.profiles.iter().any(|p| p.username == username) {
            return Err(StoreError::UniqueViolation);
        }
        let profile = Profile {
            id: inner.alloc_id(),
            username: username.to_string(),
            password: password_hash.to_string(),
            role: role.to_string(),
            created_at: Some(Utc::now()),
        };
        inner.profiles.push(profile.clone());
        Ok(profile)
    }

    async fn find_profile_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Profile>, StoreError> {
        let inner = self.inner.lock().map_err(lock_err)?;
        Ok(inner
            .profiles
            .iter()
            .find(|p| p.username == username)
            .cloned())
    }

    async fn find_assessment(&self, assessment_id: i64) -> Result<Option<Assessment>, StoreError> {
        let inner = self.inner.lock().map_err(lock_err)?;
        Ok(inner
            .assessments
            .iter()
            .find(|a| a.id == assessment_id)
            .cloned())
    }

    async fn find_open_assessment(
        &self,
        learner_id: i64,
        session_id: Option<&str>,
    ) -> Result<Option<Assessment>, StoreError> {
        let inner = self.inner.lock().map_err(lock_err)?;
        Ok(inner
            .assessments
            .iter()
            .filter(|a| a.learner_id == learner_id && a.is_open())
            .filter(|a| match session_id {
                Some(sid) => a.session_id.as_deref() == Some(sid),
                None => true,
            })
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn insert_assessment(&self, new: &NewAssessment) -> Result<Assessment, StoreError> {
        let mut inner = self.inner.lock().map_err(lock_err)?;
        // Same guarantee as the partial unique index in Postgres.
        if inner
            .assessments
            .iter()
            .any(|a| a.learner_id == new.learner_id && a.is_open())
        {
            return Err(StoreError::UniqueViolation);
        }
        let now = Utc::now();
        let assessment = Assessment {
            id: inner.alloc_id(),
            learner_id: new.learner_id,
            session_id: new.session_id.clone(),
            grade_level: new.grade_level,
            assessment_date: new.assessment_date,
            task_a_score: 0.0,
            task_b_score: 0.0,
            task_c_score: 0.0,
            task_d_score: 0.0,
            task_e_score: 0.0,
            task_f_score: 0.0,
            task_g_score: 0.0,
            task_h_score: 0.0,
            task_i_score: 0.0,
            task_j_score: 0.0,
            task_k_score: 0.0,
            task_l_score: 0.0,
            total_score: 0.0,
            overall_score: 0.0,
            completed_at: None,
            created_at: Some(now),
            updated_at: Some(now),
        };
        inner.assessments.push(assessment.clone());
        Ok(assessment)
    }

    async fn count_completed_assessments(&self, learner_id: i64) -> Result<i64, StoreError> {
        let inner = self.inner.lock().map_err(lock_err)?;
        Ok(inner
            .assessments
            .iter()
            .filter(|a| a.learner_id == learner_id && a.completed_at.is_some())
            .count() as i64)
    }

    async fn find_best_assessment(
        &self,
        learner_id: i64,
    ) -> Result<Option<Assessment>, StoreError> {
        let inner = self.inner.lock().map_err(lock_err)?;
        Ok(inner
            .assessments
            .iter()
            .filter(|a| a.learner_id == learner_id)
            .max_by(|x, y| {
                x.total_score
                    .partial_cmp(&y.total_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned())
    }

    async fn update_assessment_totals(
        &self,
        assessment_id: i64,
        totals: &TaskTotals,
    ) -> Result<Assessment, StoreError> {
        let mut inner = self.inner.lock().map_err(lock_err)?;
        let assessment = inner
            .assessments
            .iter_mut()
            .find(|a| a.id == assessment_id)
            .ok_or_else(|| StoreError::Backend("assessment not found".to_string()))?;

        let [a, b, c, d, e, f, g, h, i, j, k, l] = totals.per_task;
        assessment.task_a_score = a;
        assessment.task_b_score = b;
        assessment.task_c_score = c;
        assessment.task_d_score = d;
        assessment.task_e_score = e;
        assessment.task_f_score = f;
        assessment.task_g_score = g;
        assessment.task_h_score = h;
        assessment.task_i_score = i;
        assessment.task_j_score = j;
        assessment.task_k_score = k;
        assessment.task_l_score = l;
        assessment.total_score = totals.total;
        assessment.overall_score = totals.overall;
        assessment.updated_at = Some(Utc::now());
        Ok(assessment.clone())
    }

    async fn complete_assessment(
        &self,
        assessment_id: i64,
        learner_id: i64,
    ) -> Result<Option<Assessment>, StoreError> {
        let mut inner = self.inner.lock().map_err(lock_err)?;
        let assessment = inner
            .assessments
            .iter_mut()
            .find(|a| a.id == assessment_id && a.learner_id == learner_id && a.is_open());
        Ok(assessment.map(|a| {
            let now = Utc::now();
            a.completed_at = Some(now);
            a.updated_at = Some(now);
            a.clone()
        }))
    }

    async fn upsert_task_score(&self, key: &ScoreKey, score: f64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().map_err(lock_err)?;
        let task = key.task.as_str();
        if let Some(row) = inner.scores.iter_mut().find(|r| {
            r.assessment_id == key.assessment_id && r.task == task && r.subtask == key.subtask
        }) {
            row.score = score;
            row.updated_at = Utc::now();
            return Ok(());
        }
        let row = TaskScoreRow {
            id: inner.alloc_id(),
            assessment_id: key.assessment_id,
            task: task.to_string(),
            subtask: key.subtask.clone(),
            score,
            progress: None,
            updated_at: Utc::now(),
        };
        inner.scores.push(row);
        Ok(())
    }

    async fn list_task_scores(&self, assessment_id: i64) -> Result<Vec<TaskScoreRow>, StoreError> {
        let inner = self.inner.lock().map_err(lock_err)?;
        Ok(inner
            .scores
            .iter()
            .filter(|r| r.assessment_id == assessment_id)
            .cloned()
            .collect())
    }

    async fn upsert_task_progress(
        &self,
        key: &ScoreKey,
        progress: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().map_err(lock_err)?;
        let task = key.task.as_str();
        if let Some(row) = inner.scores.iter_mut().find(|r| {
            r.assessment_id == key.assessment_id && r.task == task && r.subtask == key.subtask
        }) {
            row.progress = Some(progress.clone());
            row.updated_at = Utc::now();
            return Ok(());
        }
        let row = TaskScoreRow {
            id: inner.alloc_id(),
            assessment_id: key.assessment_id,
            task: task.to_string(),
            subtask: key.subtask.clone(),
            score: 0.0,
            progress: Some(progress.clone()),
            updated_at: Utc::now(),
        };
        inner.scores.push(row);
        Ok(())
    }

    async fn fetch_task_progress(
        &self,
        key: &ScoreKey,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let inner = self.inner.lock().map_err(lock_err)?;
        let task = key.task.as_str();
        Ok(inner
            .scores
            .iter()
            .find(|r| {
                r.assessment_id == key.assessment_id && r.task == task && r.subtask == key.subtask
            })
            .and_then(|r| r.progress.clone()))
    }

    async fn clear_task_progress(&self, key: &ScoreKey) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().map_err(lock_err)?;
        let task = key.task.as_str();
        if let Some(row) = inner.scores.iter_mut().find(|r| {
            r.assessment_id == key.assessment_id && r.task == task && r.subtask == key.subtask
        }) {
            row.progress = None;
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_retry_request(
        &self,
        learner_id: i64,
        reason: Option<&str>,
    ) -> Result<RetryRequest, StoreError> {
        let mut inner = self.inner.lock().map_err(lock_err)?;
        let request = RetryRequest {
            id: inner.alloc_id(),
            learner_id,
            status: retry::STATUS_PENDING.to_string(),
            used: false,
            reason: reason.map(str::to_string),
            created_at: Some(Utc::now()),
            used_at: None,
        };
        inner.retries.push(request.clone());
        Ok(request)
    }

    async fn find_retry_grant(&self, learner_id: i64) -> Result<Option<RetryRequest>, StoreError> {
        let inner = self.inner.lock().map_err(lock_err)?;
        Ok(inner
            .retries
            .iter()
            .filter(|r| r.learner_id == learner_id && r.is_grant())
            .min_by_key(|r| r.created_at)
            .cloned())
    }

    async fn consume_retry_grant(&self, request_id: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().map_err(lock_err)?;
        match inner
            .retries
            .iter_mut()
            .find(|r| r.id == request_id && !r.used)
        {
            Some(request) => {
                request.used = true;
                request.used_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_retry_requests(
        &self,
        status: Option<&str>,
    ) -> Result<Vec<RetryRequest>, StoreError> {
        let inner = self.inner.lock().map_err(lock_err)?;
        let mut requests: Vec<RetryRequest> = inner
            .retries
            .iter()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        requests.sort_by_key(|r| std::cmp::Reverse(r.created_at));
        Ok(requests)
    }

    async fn review_retry_request(
        &self,
        request_id: i64,
        status: &str,
    ) -> Result<Option<RetryRequest>, StoreError> {
        let mut inner = self.inner.lock().map_err(lock_err)?;
        let request = inner
            .retries
            .iter_mut()
            .find(|r| r.id == request_id && r.status == retry::STATUS_PENDING);
        Ok(request.map(|r| {
            r.status = status.to_string();
            r.clone()
        }))
    }
}
