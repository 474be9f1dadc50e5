// src/catalog.rs

use serde::Deserialize;

use crate::models::assessment::TaskId;

/// Frozen maximum used when the catalog file is unreadable. Matches the
/// point sum of the shipped battery (data/rma.json).
pub const FALLBACK_MAX_TOTAL: f64 = 44.0;

/// One question in the catalog, with its canonical answer.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogQuestion {
    pub id: String,
    pub prompt: Option<String>,
    /// Canonical answer; strings and numbers are both accepted and
    /// compared in stringified form.
    pub answer: Option<serde_json::Value>,
}

/// One graded task of the battery.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogTask {
    pub id: String,
    pub name: Option<String>,
    /// Maximum points for this task. Per-task maxima are heterogeneous.
    pub points: f64,
    pub time_limit_seconds: Option<u64>,
    #[serde(default)]
    pub questions: Vec<CatalogQuestion>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    assessment: CatalogDocument,
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[allow(dead_code)]
    title: Option<String>,
    #[allow(dead_code)]
    grade_level: Option<i32>,
    tasks: Vec<CatalogTask>,
}

/// The static task catalog. `max_possible_total` is computed exactly once,
/// at load time, from the per-task point values, so the code can never
/// drift from the document.
#[derive(Debug, Clone)]
pub struct TaskCatalog {
    tasks: Vec<CatalogTask>,
    max_possible_total: f64,
}

impl TaskCatalog {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let file: CatalogFile = serde_json::from_str(raw)?;
        let tasks = file.assessment.tasks;
        let max_possible_total = if tasks.is_empty() {
            FALLBACK_MAX_TOTAL
        } else {
            tasks.iter().map(|t| t.points).sum()
        };
        Ok(Self {
            tasks,
            max_possible_total,
        })
    }

    /// Loads the catalog from disk, falling back to an empty catalog with
    /// the frozen maximum if the file is missing or malformed.
    pub fn load(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match Self::from_json(&raw) {
                Ok(catalog) => {
                    tracing::info!(
                        "Loaded task catalog from {} ({} tasks, max total {})",
                        path,
                        catalog.tasks.len(),
                        catalog.max_possible_total
                    );
                    catalog
                }
                Err(e) => {
                    tracing::warn!("Failed to parse task catalog {}: {}", path, e);
                    Self::fallback()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read task catalog {}: {}", path, e);
                Self::fallback()
            }
        }
    }

    pub fn fallback() -> Self {
        Self {
            tasks: Vec::new(),
            max_possible_total: FALLBACK_MAX_TOTAL,
        }
    }

    pub fn task(&self, id: TaskId) -> Option<&CatalogTask> {
        self.tasks
            .iter()
            .find(|t| TaskId::parse(&t.id) == Some(id))
    }

    pub fn tasks(&self) -> &[CatalogTask] {
        &self.tasks
    }

    pub fn max_possible_total(&self) -> f64 {
        self.max_possible_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_total_is_computed_from_task_points() {
        let catalog = TaskCatalog::from_json(
            r#"{"assessment":{"tasks":[
                {"id":"A","points":4,"questions":[]},
                {"id":"B","points":3.5,"questions":[]}
            ]}}"#,
        )
        .unwrap();
        assert_eq!(catalog.max_possible_total(), 7.5);
    }

    #[test]
    fn fallback_uses_frozen_maximum() {
        let catalog = TaskCatalog::load("does/not/exist.json");
        assert_eq!(catalog.max_possible_total(), FALLBACK_MAX_TOTAL);
        assert!(catalog.tasks().is_empty());
    }

    #[test]
    fn task_lookup_is_case_insensitive() {
        let catalog = TaskCatalog::from_json(
            r#"{"assessment":{"tasks":[{"id":"a","points":4,"questions":[]}]}}"#,
        )
        .unwrap();
        assert!(catalog.task(TaskId::A).is_some());
        assert!(catalog.task(TaskId::B).is_none());
    }

    #[test]
    fn shipped_catalog_parses() {
        let catalog = TaskCatalog::from_json(include_str!("../data/rma.json")).unwrap();
        assert_eq!(catalog.tasks().len(), 12);
        assert_eq!(catalog.max_possible_total(), 44.0);
    }
}
