// src/models/assessment.rs

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// The fixed task battery. Every assessment carries one score column per
/// task; score rows reference tasks by their canonical uppercase letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskId {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
}

impl TaskId {
    pub const ALL: [TaskId; 12] = [
        TaskId::A,
        TaskId::B,
        TaskId::C,
        TaskId::D,
        TaskId::E,
        TaskId::F,
        TaskId::G,
        TaskId::H,
        TaskId::I,
        TaskId::J,
        TaskId::K,
        TaskId::L,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskId::A => "A",
            TaskId::B => "B",
            TaskId::C => "C",
            TaskId::D => "D",
            TaskId::E => "E",
            TaskId::F => "F",
            TaskId::G => "G",
            TaskId::H => "H",
            TaskId::I => "I",
            TaskId::J => "J",
            TaskId::K => "K",
            TaskId::L => "L",
        }
    }

    /// Parses a task identifier, normalizing case and surrounding whitespace.
    pub fn parse(s: &str) -> Option<TaskId> {
        match s.trim().to_uppercase().as_str() {
            "A" => Some(TaskId::A),
            "B" => Some(TaskId::B),
            "C" => Some(TaskId::C),
            "D" => Some(TaskId::D),
            "E" => Some(TaskId::E),
            "F" => Some(TaskId::F),
            "G" => Some(TaskId::G),
            "H" => Some(TaskId::H),
            "I" => Some(TaskId::I),
            "J" => Some(TaskId::J),
            "K" => Some(TaskId::K),
            "L" => Some(TaskId::L),
            _ => None,
        }
    }

    /// Position in the fixed battery, for indexing per-task arrays.
    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|t| t == self).unwrap_or(0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents the 'assessments' table: one row per attempt.
///
/// total_score is kept equal to the sum of the task columns after every
/// mutation; overall_score is total / max possible * 100, clamped.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Assessment {
    pub id: i64,
    pub learner_id: i64,
    pub session_id: Option<String>,
    pub grade_level: i32,
    pub assessment_date: chrono::NaiveDate,
    pub task_a_score: f64,
    pub task_b_score: f64,
    pub task_c_score: f64,
    pub task_d_score: f64,
    pub task_e_score: f64,
    pub task_f_score: f64,
    pub task_g_score: f64,
    pub task_h_score: f64,
    pub task_i_score: f64,
    pub task_j_score: f64,
    pub task_k_score: f64,
    pub task_l_score: f64,
    pub total_score: f64,
    pub overall_score: f64,
    /// Null while the attempt is still in progress.
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Assessment {
    pub fn task_score(&self, task: TaskId) -> f64 {
        self.task_scores()[task.index()]
    }

    /// Per-task scores in battery order A..L.
    pub fn task_scores(&self) -> [f64; 12] {
        [
            self.task_a_score,
            self.task_b_score,
            self.task_c_score,
            self.task_d_score,
            self.task_e_score,
            self.task_f_score,
            self.task_g_score,
            self.task_h_score,
            self.task_i_score,
            self.task_j_score,
            self.task_k_score,
            self.task_l_score,
        ]
    }

    pub fn is_open(&self) -> bool {
        self.completed_at.is_none()
    }
}

/// Fields the application supplies when creating an assessment; the store
/// assigns the id and timestamps.
#[derive(Debug, Clone)]
pub struct NewAssessment {
    pub learner_id: i64,
    pub session_id: Option<String>,
    pub grade_level: i32,
    pub assessment_date: chrono::NaiveDate,
}

/// Recomputed aggregates written back to an assessment row in one update.
#[derive(Debug, Clone, Copy)]
pub struct TaskTotals {
    /// Per-task subtotals in battery order A..L.
    pub per_task: [f64; 12],
    pub total: f64,
    pub overall: f64,
}

/// Represents the 'assessment_task_scores' table: one row per
/// (assessment, task, subtask). subtask = "" is the task-level row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TaskScoreRow {
    pub id: i64,
    pub assessment_id: i64,
    pub task: String,
    pub subtask: String,
    pub score: f64,
    /// Embedded in-progress snapshot, if any (JSONB).
    pub progress: Option<serde_json::Value>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Unique key of a score row.
#[derive(Debug, Clone)]
pub struct ScoreKey {
    pub assessment_id: i64,
    pub task: TaskId,
    /// Empty string denotes the task-level row.
    pub subtask: String,
}

impl ScoreKey {
    pub fn task_level(assessment_id: i64, task: TaskId) -> Self {
        Self {
            assessment_id,
            task,
            subtask: String::new(),
        }
    }
}

/// Transient per-task answer state, kept only while fresh (24h window).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProgress {
    pub current_question_index: u32,
    /// Remaining seconds on the task timer.
    pub time_left: i64,
    pub answers: HashMap<String, String>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for starting (or resuming) an assessment.
#[derive(Debug, Deserialize, Validate)]
pub struct StartAssessmentRequest {
    #[validate(range(min = 1, max = 12))]
    pub grade_level: Option<i32>,
    #[validate(length(max = 100))]
    pub session_id: Option<String>,
}

/// DTO for recording a raw task/subtask score.
#[derive(Debug, Deserialize, Validate)]
pub struct RecordScoreRequest {
    #[validate(range(min = 0.0))]
    pub score: f64,
    #[validate(length(min = 1, max = 50))]
    pub subtask: Option<String>,
}

/// DTO for submitting a learner's answers for a task.
#[derive(Debug, Deserialize)]
pub struct SubmitTaskRequest {
    /// Question id -> submitted answer.
    pub answers: HashMap<String, String>,
}

/// Result of grading a submitted task.
#[derive(Debug, Serialize)]
pub struct SubmitTaskResponse {
    pub task: TaskId,
    pub score: f64,
    pub correct_count: usize,
    pub question_count: usize,
    pub recorded: bool,
}
