// src/assessment/policy.rs

use serde::Serialize;

use super::{AssessmentService, MAX_ATTEMPTS};

/// Outcome of the retry policy check. Denial is a normal result, not an
/// error; `reason` is the human-readable explanation for the caller.
#[derive(Debug, Clone, Serialize)]
pub struct StartDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_request_id: Option<i64>,
    pub attempts: i64,
}

impl AssessmentService {
    /// May the learner start a new assessment now?
    ///
    /// Only completed assessments count against the limit; an abandoned
    /// in-progress attempt never consumes a try. Past the limit, the
    /// oldest approved and unused retry request authorizes one more
    /// attempt and its id is returned for consumption at creation time.
    ///
    /// Read-only, and reads fail open: a store error while counting is
    /// treated as zero attempts so a transient fault cannot block a
    /// legitimate start.
    pub async fn can_start(&self, learner_id: i64) -> StartDecision {
        let attempts = match self.store().count_completed_assessments(learner_id).await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!("Error counting attempts for learner {}: {}", learner_id, e);
                0
            }
        };

        if attempts < MAX_ATTEMPTS {
            return StartDecision {
                allowed: true,
                reason: None,
                approved_request_id: None,
                attempts,
            };
        }

        let grant = match self.store().find_retry_grant(learner_id).await {
            Ok(grant) => grant,
            Err(e) => {
                tracing::warn!("Retry grant lookup failed for learner {}: {}", learner_id, e);
                None
            }
        };

        match grant {
            Some(request) => StartDecision {
                allowed: true,
                reason: None,
                approved_request_id: Some(request.id),
                attempts,
            },
            None => StartDecision {
                allowed: false,
                reason: Some(format!(
                    "Attempt limit reached ({}). Request admin approval for another try.",
                    MAX_ATTEMPTS
                )),
                approved_request_id: None,
                attempts,
            },
        }
    }
}
