// src/scoring.rs
//
// Pure score aggregation. No I/O; everything here is deterministic and
// synchronous so it can be reused by the recorder, the handlers and tests.

use std::collections::HashMap;

use crate::catalog::CatalogQuestion;

/// Sum of per-task scores. NaN and infinite entries count as 0 so a bad
/// row can never poison the aggregate.
pub fn total_score(scores: &[f64]) -> f64 {
    scores.iter().filter(|s| s.is_finite()).sum()
}

/// Loosely-typed variant for JSON-sourced score values: anything that is
/// not a finite number (strings, nulls, objects) counts as 0.
pub fn total_score_values(values: &[serde_json::Value]) -> f64 {
    values
        .iter()
        .filter_map(|v| v.as_f64())
        .filter(|v| v.is_finite())
        .sum()
}

/// Percentage of the configured maximum, clamped to [0, 100] and rounded
/// to two decimal places for display.
pub fn overall_score(total: f64, max_possible: f64) -> f64 {
    if max_possible <= 0.0 {
        return 0.0;
    }
    let pct = (total / max_possible) * 100.0;
    (pct.clamp(0.0, 100.0) * 100.0).round() / 100.0
}

/// Outcome of grading one task submission.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskGrade {
    pub score: f64,
    pub correct_count: usize,
    pub question_count: usize,
}

/// Grades a learner's answer map against a task's question key.
///
/// Matching is case-insensitive and whitespace-trimmed on both sides;
/// numeric canonical answers compare in stringified form. The score is
/// `(correct / questions) * max_points`, fractional precision preserved,
/// and never exceeds `max_points`. An empty question set grades to 0.
pub fn grade_task(
    answers: &HashMap<String, String>,
    questions: &[CatalogQuestion],
    max_points: f64,
) -> TaskGrade {
    if questions.is_empty() {
        return TaskGrade {
            score: 0.0,
            correct_count: 0,
            question_count: 0,
        };
    }

    let correct_count = questions
        .iter()
        .filter(|q| {
            let Some(canonical) = q.answer.as_ref() else {
                return false;
            };
            let Some(submitted) = answers.get(&q.id) else {
                return false;
            };
            normalize(submitted) == normalize(&canonical_text(canonical))
        })
        .count();

    let raw = (correct_count as f64 / questions.len() as f64) * max_points;
    TaskGrade {
        score: raw.min(max_points),
        correct_count,
        question_count: questions.len(),
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Stringifies a canonical answer the way a learner would type it:
/// strings as-is, numbers without quotes.
fn canonical_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
