// src/assessment/progress.rs

use chrono::{Duration, Utc};

use crate::models::assessment::{ScoreKey, TaskId, TaskProgress};

use super::{AssessmentService, PROGRESS_TTL_HOURS};

impl AssessmentService {
    /// Upserts the transient answer snapshot for a task, keyed by the
    /// task-level score row.
    pub async fn save_progress(
        &self,
        assessment_id: i64,
        task: TaskId,
        progress: &TaskProgress,
    ) -> bool {
        let key = ScoreKey::task_level(assessment_id, task);
        let value = match serde_json::to_value(progress) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to serialize task progress: {}", e);
                return false;
            }
        };

        match self.store().upsert_task_progress(&key, &value).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Error saving progress for task {}: {}", task, e);
                false
            }
        }
    }

    /// Loads the snapshot if one exists and is still fresh (24h window).
    /// Stale or malformed snapshots are treated as absent, and stale ones
    /// are cleared so the row does not keep dead state around.
    pub async fn load_progress(&self, assessment_id: i64, task: TaskId) -> Option<TaskProgress> {
        let key = ScoreKey::task_level(assessment_id, task);
        let raw = match self.store().fetch_task_progress(&key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::error!("Error loading progress for task {}: {}", task, e);
                return None;
            }
        };

        let snapshot: TaskProgress = match serde_json::from_value(raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Discarding malformed progress snapshot: {}", e);
                return None;
            }
        };

        let age = Utc::now() - snapshot.updated_at;
        if age <= Duration::hours(PROGRESS_TTL_HOURS) {
            Some(snapshot)
        } else {
            if let Err(e) = self.store().clear_task_progress(&key).await {
                tracing::warn!("Failed to clear stale progress: {}", e);
            }
            None
        }
    }

    /// Nulls the stored snapshot for the task.
    pub async fn clear_progress(&self, assessment_id: i64, task: TaskId) -> bool {
        let key = ScoreKey::task_level(assessment_id, task);
        match self.store().clear_task_progress(&key).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Error clearing progress for task {}: {}", task, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{Duration, Utc};

    use crate::assessment::testutil::service;
    use crate::models::assessment::{ScoreKey, TaskId, TaskProgress};
    use crate::store::Store;

    fn snapshot(age_hours: i64) -> TaskProgress {
        TaskProgress {
            current_question_index: 2,
            time_left: 120,
            answers: HashMap::from([("a1".to_string(), "cat".to_string())]),
            updated_at: Utc::now() - Duration::hours(age_hours),
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips_fresh_progress() {
        let (svc, _store) = service();
        let assessment = svc.get_or_create(1, 2, None).await.unwrap();

        assert!(svc.save_progress(assessment.id, TaskId::A, &snapshot(1)).await);
        let loaded = svc.load_progress(assessment.id, TaskId::A).await.unwrap();
        assert_eq!(loaded.current_question_index, 2);
        assert_eq!(loaded.answers.get("a1").map(String::as_str), Some("cat"));
    }

    #[tokio::test]
    async fn stale_progress_is_absent_and_cleared() {
        let (svc, store) = service();
        let assessment = svc.get_or_create(1, 2, None).await.unwrap();

        assert!(svc.save_progress(assessment.id, TaskId::A, &snapshot(25)).await);
        assert!(svc.load_progress(assessment.id, TaskId::A).await.is_none());

        // The stale snapshot must have been nulled on read.
        let key = ScoreKey::task_level(assessment.id, TaskId::A);
        assert!(store.fetch_task_progress(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_progress_is_not_an_error() {
        let (svc, _store) = service();
        let assessment = svc.get_or_create(1, 2, None).await.unwrap();
        assert!(svc.load_progress(assessment.id, TaskId::B).await.is_none());
    }

    #[tokio::test]
    async fn clear_nulls_the_snapshot() {
        let (svc, _store) = service();
        let assessment = svc.get_or_create(1, 2, None).await.unwrap();

        assert!(svc.save_progress(assessment.id, TaskId::A, &snapshot(1)).await);
        assert!(svc.clear_progress(assessment.id, TaskId::A).await);
        assert!(svc.load_progress(assessment.id, TaskId::A).await.is_none());
    }

    #[tokio::test]
    async fn saving_progress_does_not_disturb_the_score() {
        let (svc, store) = service();
        let assessment = svc.get_or_create(1, 2, None).await.unwrap();

        assert!(svc.record_score(assessment.id, TaskId::A, None, 3.0).await);
        assert!(svc.save_progress(assessment.id, TaskId::A, &snapshot(1)).await);

        let rows = store.list_task_scores(assessment.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].score, 3.0);
        assert!(rows[0].progress.is_some());
    }
}
