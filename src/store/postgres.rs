// src/store/postgres.rs

use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::{
    assessment::{Assessment, NewAssessment, ScoreKey, TaskScoreRow, TaskTotals},
    profile::Profile,
    retry::RetryRequest,
};

use super::{Store, StoreError};

/// Postgres-backed store. Queries are runtime-checked (`query_as`) so the
/// crate builds without a reachable database; the schema lives under
/// ./migrations and is applied at startup.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_profile(
        &self,
        username: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<Profile, StoreError> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (username, password, role)
            VALUES ($1, $2, $3)
            RETURNING id, username, password, role, created_at
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .bind(role)
        .fetch_one(&self.pool)
        .await?;

        Ok(profile)
    }

    async fn find_profile_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Profile>, StoreError> {
        let profile = sqlx::query_as::<_, Profile>(
            "SELECT id, username, password, role, created_at FROM profiles WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    async fn find_assessment(&self, assessment_id: i64) -> Result<Option<Assessment>, StoreError> {
        let assessment =
            sqlx::query_as::<_, Assessment>("SELECT * FROM assessments WHERE id = $1")
                .bind(assessment_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(assessment)
    }

    async fn find_open_assessment(
        &self,
        learner_id: i64,
        session_id: Option<&str>,
    ) -> Result<Option<Assessment>, StoreError> {
        let assessment = match session_id {
            Some(sid) => {
                sqlx::query_as::<_, Assessment>(
                    r#"
                    SELECT * FROM assessments
                    WHERE learner_id = $1 AND session_id = $2 AND completed_at IS NULL
                    ORDER BY created_at DESC
                    LIMIT 1
                    "#,
                )
                .bind(learner_id)
                .bind(sid)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Assessment>(
                    r#"
                    SELECT * FROM assessments
                    WHERE learner_id = $1 AND completed_at IS NULL
                    ORDER BY created_at DESC
                    LIMIT 1
                    "#,
                )
                .bind(learner_id)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(assessment)
    }

    async fn insert_assessment(&self, new: &NewAssessment) -> Result<Assessment, StoreError> {
        let assessment = sqlx::query_as::<_, Assessment>(
            r#"
            INSERT INTO assessments (learner_id, session_id, grade_level, assessment_date)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(new.learner_id)
        .bind(new.session_id.as_deref())
        .bind(new.grade_level)
        .bind(new.assessment_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(assessment)
    }

    async fn count_completed_assessments(&self, learner_id: i64) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM assessments WHERE learner_id = $1 AND completed_at IS NOT NULL",
        )
        .bind(learner_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn find_best_assessment(
        &self,
        learner_id: i64,
    ) -> Result<Option<Assessment>, StoreError> {
        let assessment = sqlx::query_as::<_, Assessment>(
            r#"
            SELECT * FROM assessments
            WHERE learner_id = $1
            ORDER BY total_score DESC, created_at DESC
            LIMIT 1
            "#,
        )
        .bind(learner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(assessment)
    }

    async fn update_assessment_totals(
        &self,
        assessment_id: i64,
        totals: &TaskTotals,
    ) -> Result<Assessment, StoreError> {
        let [a, b, c, d, e, f, g, h, i, j, k, l] = totals.per_task;

        let assessment = sqlx::query_as::<_, Assessment>(
            r#"
            UPDATE assessments SET
                task_a_score = $2, task_b_score = $3, task_c_score = $4,
                task_d_score = $5, task_e_score = $6, task_f_score = $7,
                task_g_score = $8, task_h_score = $9, task_i_score = $10,
                task_j_score = $11, task_k_score = $12, task_l_score = $13,
                total_score = $14, overall_score = $15, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(assessment_id)
        .bind(a)
        .bind(b)
        .bind(c)
        .bind(d)
        .bind(e)
        .bind(f)
        .bind(g)
        .bind(h)
        .bind(i)
        .bind(j)
        .bind(k)
        .bind(l)
        .bind(totals.total)
        .bind(totals.overall)
        .fetch_one(&self.pool)
        .await?;

        Ok(assessment)
    }

    async fn complete_assessment(
        &self,
        assessment_id: i64,
        learner_id: i64,
    ) -> Result<Option<Assessment>, StoreError> {
        let assessment = sqlx::query_as::<_, Assessment>(
            r#"
            UPDATE assessments
            SET completed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND learner_id = $2 AND completed_at IS NULL
            RETURNING *
            "#,
        )
        .bind(assessment_id)
        .bind(learner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(assessment)
    }

    async fn upsert_task_score(&self, key: &ScoreKey, score: f64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO assessment_task_scores (assessment_id, task, subtask, score, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (assessment_id, task, subtask)
            DO UPDATE SET score = EXCLUDED.score, updated_at = NOW()
            "#,
        )
        .bind(key.assessment_id)
        .bind(key.task.as_str())
        .bind(&key.subtask)
        .bind(score)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_task_scores(&self, assessment_id: i64) -> Result<Vec<TaskScoreRow>, StoreError> {
        let rows = sqlx::query_as::<_, TaskScoreRow>(
            r#"
            SELECT id, assessment_id, task, subtask, score, progress, updated_at
            FROM assessment_task_scores
            WHERE assessment_id = $1
            ORDER BY task, subtask
            "#,
        )
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn upsert_task_progress(
        &self,
        key: &ScoreKey,
        progress: &serde_json::Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO assessment_task_scores (assessment_id, task, subtask, progress, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (assessment_id, task, subtask)
            DO UPDATE SET progress = EXCLUDED.progress, updated_at = NOW()
            "#,
        )
        .bind(key.assessment_id)
        .bind(key.task.as_str())
        .bind(&key.subtask)
        .bind(progress)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_task_progress(
        &self,
        key: &ScoreKey,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let progress = sqlx::query_scalar::<_, Option<serde_json::Value>>(
            r#"
            SELECT progress FROM assessment_task_scores
            WHERE assessment_id = $1 AND task = $2 AND subtask = $3
            "#,
        )
        .bind(key.assessment_id)
        .bind(key.task.as_str())
        .bind(&key.subtask)
        .fetch_optional(&self.pool)
        .await?;

        Ok(progress.flatten())
    }

    async fn clear_task_progress(&self, key: &ScoreKey) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE assessment_task_scores
            SET progress = NULL, updated_at = NOW()
            WHERE assessment_id = $1 AND task = $2 AND subtask = $3
            "#,
        )
        .bind(key.assessment_id)
        .bind(key.task.as_str())
        .bind(&key.subtask)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_retry_request(
        &self,
        learner_id: i64,
        reason: Option<&str>,
    ) -> Result<RetryRequest, StoreError> {
        let request = sqlx::query_as::<_, RetryRequest>(
            r#"
            INSERT INTO assessment_retry_requests (learner_id, status, reason)
            VALUES ($1, 'pending', $2)
            RETURNING id, learner_id, status, used, reason, created_at, used_at
            "#,
        )
        .bind(learner_id)
        .bind(reason)
        .fetch_one(&self.pool)
        .await?;

        Ok(request)
    }

    async fn find_retry_grant(&self, learner_id: i64) -> Result<Option<RetryRequest>, StoreError> {
        let request = sqlx::query_as::<_, RetryRequest>(
            r#"
            SELECT id, learner_id, status, used, reason, created_at, used_at
            FROM assessment_retry_requests
            WHERE learner_id = $1 AND status = 'approved' AND used = FALSE
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(learner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(request)
    }

    async fn consume_retry_grant(&self, request_id: i64) -> Result<bool, StoreError> {
        // Guarded update: only one caller can flip used = false -> true.
        let result = sqlx::query(
            r#"
            UPDATE assessment_retry_requests
            SET used = TRUE, used_at = NOW()
            WHERE id = $1 AND used = FALSE
            "#,
        )
        .bind(request_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_retry_requests(
        &self,
        status: Option<&str>,
    ) -> Result<Vec<RetryRequest>, StoreError> {
        let requests = sqlx::query_as::<_, RetryRequest>(
            r#"
            SELECT id, learner_id, status, used, reason, created_at, used_at
            FROM assessment_retry_requests
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(requests)
    }

    async fn review_retry_request(
        &self,
        request_id: i64,
        status: &str,
    ) -> Result<Option<RetryRequest>, StoreError> {
        let request = sqlx::query_as::<_, RetryRequest>(
            r#"
            UPDATE assessment_retry_requests
            SET status = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING id, learner_id, status, used, reason, created_at, used_at
            "#,
        )
        .bind(request_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;

        Ok(request)
    }
}
