// src/models/retry.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_APPROVED: &str = "approved";
pub const STATUS_REJECTED: &str = "rejected";

/// Represents the 'assessment_retry_requests' table.
///
/// A learner creates a pending request; an admin approves or rejects it;
/// an approved request is consumed (used = true) at most once when it
/// authorizes an assessment creation past the attempt limit.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RetryRequest {
    pub id: i64,
    pub learner_id: i64,
    /// 'pending', 'approved' or 'rejected'.
    pub status: String,
    pub used: bool,
    pub reason: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub used_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl RetryRequest {
    /// An unconsumed grant for one extra attempt.
    pub fn is_grant(&self) -> bool {
        self.status == STATUS_APPROVED && !self.used
    }
}

/// DTO for a learner requesting an extra attempt.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRetryRequest {
    #[validate(length(max = 500, message = "Reason must be at most 500 characters."))]
    pub reason: Option<String>,
}

/// DTO for admin review of a pending request.
#[derive(Debug, Deserialize)]
pub struct ReviewRetryRequest {
    /// 'approved' or 'rejected'.
    pub status: String,
}

/// Query params for the admin listing.
#[derive(Debug, Deserialize)]
pub struct RetryListParams {
    pub status: Option<String>,
}
