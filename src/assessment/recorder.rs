// src/assessment/recorder.rs

use crate::models::assessment::{ScoreKey, TaskId, TaskScoreRow, TaskTotals};
use crate::scoring;

use super::AssessmentService;

impl AssessmentService {
    /// Upserts a score for a task (or one of its subtasks), then re-reads
    /// every score row for the assessment, recomputes per-task subtotals
    /// and the total/overall aggregates, and writes them back.
    ///
    /// Any failure aborts and returns false. A row upserted before a
    /// failed recompute is acceptable: the next successful call re-reads
    /// all rows and heals the totals.
    pub async fn record_score(
        &self,
        assessment_id: i64,
        task: TaskId,
        subtask: Option<&str>,
        score: f64,
    ) -> bool {
        let score = if score.is_finite() { score.max(0.0) } else { 0.0 };
        // Cap at the catalog's per-task maximum when the task is known.
        let score = match self.catalog().task(task) {
            Some(spec) => score.min(spec.points),
            None => score,
        };

        let key = ScoreKey {
            assessment_id,
            task,
            subtask: subtask.unwrap_or("").trim().to_string(),
        };

        if let Err(e) = self.store().upsert_task_score(&key, score).await {
            tracing::error!("Failed to upsert score row for {}: {}", key.task, e);
            return false;
        }

        let rows = match self.store().list_task_scores(assessment_id).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("Failed to read back score rows: {}", e);
                return false;
            }
        };

        let totals = compute_totals(&rows, self.catalog().max_possible_total());

        match self
            .store()
            .update_assessment_totals(assessment_id, &totals)
            .await
        {
            Ok(updated) => {
                self.publish(&updated);
                true
            }
            Err(e) => {
                tracing::error!("Failed to write assessment totals: {}", e);
                false
            }
        }
    }
}

/// Folds score rows into per-task subtotals and the overall aggregates.
/// Rows with an unrecognized task letter are ignored.
fn compute_totals(rows: &[TaskScoreRow], max_possible: f64) -> TaskTotals {
    let mut per_task = [0.0_f64; 12];
    for row in rows {
        if let Some(task) = TaskId::parse(&row.task) {
            if row.score.is_finite() {
                per_task[task.index()] += row.score;
            }
        }
    }
    let total = scoring::total_score(&per_task);
    TaskTotals {
        per_task,
        total,
        overall: scoring::overall_score(total, max_possible),
    }
}

#[cfg(test)]
mod tests {
    use crate::assessment::testutil::service;
    use crate::models::assessment::TaskId;
    use crate::store::Store;

    #[tokio::test]
    async fn totals_accumulate_across_tasks() {
        let (svc, _store) = service();
        let assessment = svc.get_or_create(1, 2, None).await.unwrap();

        assert!(svc.record_score(assessment.id, TaskId::A, None, 2.0).await);
        assert!(svc.record_score(assessment.id, TaskId::B, None, 3.0).await);

        let updated = svc.get_current(1, None).await.unwrap();
        assert_eq!(updated.task_a_score, 2.0);
        assert_eq!(updated.task_b_score, 3.0);
        assert_eq!(updated.total_score, 5.0);
        // Test catalog max is 10 points.
        assert_eq!(updated.overall_score, 50.0);
    }

    #[tokio::test]
    async fn re_recording_a_task_overwrites_instead_of_duplicating() {
        let (svc, store) = service();
        let assessment = svc.get_or_create(1, 2, None).await.unwrap();

        assert!(svc.record_score(assessment.id, TaskId::A, None, 2.0).await);
        assert!(svc.record_score(assessment.id, TaskId::A, None, 1.0).await);

        let rows = store.list_task_scores(assessment.id).await.unwrap();
        assert_eq!(rows.iter().filter(|r| r.task == "A").count(), 1);

        let updated = svc.get_current(1, None).await.unwrap();
        assert_eq!(updated.total_score, 1.0);
    }

    #[tokio::test]
    async fn subtask_rows_sum_into_the_task_column() {
        let (svc, store) = service();
        let assessment = svc.get_or_create(1, 2, None).await.unwrap();

        assert!(
            svc.record_score(assessment.id, TaskId::A, Some("a1"), 1.5)
                .await
        );
        assert!(
            svc.record_score(assessment.id, TaskId::A, Some("a2"), 2.0)
                .await
        );

        let rows = store.list_task_scores(assessment.id).await.unwrap();
        assert_eq!(rows.len(), 2);

        let updated = svc.get_current(1, None).await.unwrap();
        assert_eq!(updated.task_a_score, 3.5);
        assert_eq!(updated.total_score, 3.5);
    }

    #[tokio::test]
    async fn scores_are_clamped_to_the_task_maximum() {
        let (svc, _store) = service();
        let assessment = svc.get_or_create(1, 2, None).await.unwrap();

        // Task A is worth 4 points in the test catalog.
        assert!(svc.record_score(assessment.id, TaskId::A, None, 99.0).await);
        let updated = svc.get_current(1, None).await.unwrap();
        assert_eq!(updated.task_a_score, 4.0);

        assert!(svc.record_score(assessment.id, TaskId::A, None, -3.0).await);
        let updated = svc.get_current(1, None).await.unwrap();
        assert_eq!(updated.task_a_score, 0.0);
    }

    #[tokio::test]
    async fn fractional_scores_are_preserved() {
        let (svc, _store) = service();
        let assessment = svc.get_or_create(1, 2, None).await.unwrap();

        assert!(
            svc.record_score(assessment.id, TaskId::B, None, 4.0 / 3.0)
                .await
        );
        let updated = svc.get_current(1, None).await.unwrap();
        assert!((updated.task_b_score - 4.0 / 3.0).abs() < 1e-9);
    }
}
