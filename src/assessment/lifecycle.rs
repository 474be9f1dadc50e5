// src/assessment/lifecycle.rs

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::OnceCell;

use crate::models::assessment::{Assessment, NewAssessment};
use crate::store::StoreError;

use super::AssessmentService;

impl AssessmentService {
    /// The learner's open assessment, preferring one bound to the given
    /// session id, falling back to the most recently created open one.
    pub async fn get_current(
        &self,
        learner_id: i64,
        session_id: Option<&str>,
    ) -> Option<Assessment> {
        let found = self.find_open(learner_id, session_id).await;
        if let Some(assessment) = &found {
            self.publish(assessment);
        }
        found
    }

    /// Returns the learner's open assessment, creating one if the retry
    /// policy allows. Returns None on policy denial or store failure.
    ///
    /// Creation is coalesced per (learner, session) within this process:
    /// concurrent callers share a single pending outcome instead of
    /// racing inserts. Cross-process races are left to the store's
    /// uniqueness constraint and recovered by re-fetching.
    pub async fn get_or_create(
        &self,
        learner_id: i64,
        grade_level: i32,
        session_id: Option<&str>,
    ) -> Option<Assessment> {
        if let Some(existing) = self.find_open(learner_id, session_id).await {
            tracing::debug!("Reusing open assessment {}", existing.id);
            self.publish(&existing);
            return Some(existing);
        }

        let key = (learner_id, session_id.map(str::to_string));
        let cell = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell
            .get_or_init(|| async {
                self.create_assessment(learner_id, grade_level, session_id)
                    .await
            })
            .await
            .clone();

        // Settled: drop the map entry so a later call starts fresh. Only
        // remove our own cell; a newer in-flight creation may have
        // replaced it already.
        {
            let mut inflight = self.inflight.lock().await;
            if inflight
                .get(&key)
                .is_some_and(|current| Arc::ptr_eq(current, &cell))
            {
                inflight.remove(&key);
            }
        }

        if let Some(assessment) = &result {
            self.publish(assessment);
        }
        result
    }

    /// The learner's highest-scoring assessment, completed or not.
    pub async fn get_best(&self, learner_id: i64) -> Option<Assessment> {
        match self.store().find_best_assessment(learner_id).await {
            Ok(best) => best,
            Err(e) => {
                tracing::error!("Error fetching best assessment for {}: {}", learner_id, e);
                None
            }
        }
    }

    /// Marks the learner's open assessment complete, making it count as
    /// an attempt. Returns None when there is nothing open to complete.
    pub async fn complete(&self, assessment_id: i64, learner_id: i64) -> Option<Assessment> {
        match self
            .store()
            .complete_assessment(assessment_id, learner_id)
            .await
        {
            Ok(Some(completed)) => {
                self.retract(completed.id);
                Some(completed)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::error!("Error completing assessment {}: {}", assessment_id, e);
                None
            }
        }
    }

    async fn find_open(&self, learner_id: i64, session_id: Option<&str>) -> Option<Assessment> {
        if session_id.is_some() {
            match self
                .store()
                .find_open_assessment(learner_id, session_id)
                .await
            {
                Ok(Some(bound)) => return Some(bound),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Error fetching session-bound assessment: {}", e);
                    return None;
                }
            }
        }
        match self.store().find_open_assessment(learner_id, None).await {
            Ok(found) => found,
            Err(e) => {
                tracing::error!("Error fetching current assessment: {}", e);
                None
            }
        }
    }

    /// One creation attempt: policy check, insert, grant consumption.
    /// Recovery path: a uniqueness violation on insert means another
    /// caller won the race, so the pre-existing open row is returned as
    /// success instead of surfacing an error.
    pub(crate) async fn create_assessment(
        &self,
        learner_id: i64,
        grade_level: i32,
        session_id: Option<&str>,
    ) -> Option<Assessment> {
        let decision = self.can_start(learner_id).await;
        if !decision.allowed {
            tracing::warn!(
                "Assessment creation denied for learner {}: {}",
                learner_id,
                decision.reason.as_deref().unwrap_or("no reason")
            );
            return None;
        }

        let new = NewAssessment {
            learner_id,
            session_id: session_id.map(str::to_string),
            grade_level,
            assessment_date: Utc::now().date_naive(),
        };

        let created = match self.store().insert_assessment(&new).await {
            Ok(created) => created,
            Err(StoreError::UniqueViolation) => {
                tracing::warn!(
                    "Lost creation race for learner {}; reusing existing open assessment",
                    learner_id
                );
                return self.find_open(learner_id, session_id).await;
            }
            Err(e) => {
                tracing::error!("Error creating assessment for {}: {}", learner_id, e);
                return None;
            }
        };

        if let Some(request_id) = decision.approved_request_id {
            match self.store().consume_retry_grant(request_id).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!("Retry grant {} was already consumed", request_id);
                }
                Err(e) => {
                    tracing::warn!("Failed to mark retry grant {} used: {}", request_id, e);
                }
            }
        }

        Some(created)
    }
}
