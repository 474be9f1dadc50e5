// src/assessment/mod.rs
//
// The assessment lifecycle/scoring core. All store failures are logged
// and surfaced to callers as None/false; nothing in this module raises
// for an expected failure mode.

mod lifecycle;
mod policy;
mod progress;
mod recorder;

pub use policy::StartDecision;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell, watch};

use crate::catalog::TaskCatalog;
use crate::models::assessment::Assessment;
use crate::store::Store;

/// Completed attempts allowed before an admin-approved retry is required.
pub const MAX_ATTEMPTS: i64 = 3;

/// Saved task progress older than this is treated as absent.
pub const PROGRESS_TTL_HOURS: i64 = 24;

/// Key of an in-flight creation: (learner, session).
type InflightKey = (i64, Option<String>);
type InflightCell = Arc<OnceCell<Option<Assessment>>>;

/// Owns the five assessment operations (eligibility check, get-or-create,
/// score recording, progress save/load/clear) over an abstract store.
///
/// Cheap to clone; clones share the in-flight creation map and the
/// current-assessment watch channel.
#[derive(Clone)]
pub struct AssessmentService {
    store: Arc<dyn Store>,
    catalog: Arc<TaskCatalog>,
    /// Request-coalescing cache: concurrent creations for the same key
    /// share one outcome. Entries are removed on settlement.
    inflight: Arc<Mutex<HashMap<InflightKey, InflightCell>>>,
    current: Arc<watch::Sender<Option<Assessment>>>,
}

impl AssessmentService {
    pub fn new(store: Arc<dyn Store>, catalog: Arc<TaskCatalog>) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            store,
            catalog,
            inflight: Arc::new(Mutex::new(HashMap::new())),
            current: Arc::new(current),
        }
    }

    pub fn catalog(&self) -> &TaskCatalog {
        &self.catalog
    }

    pub(crate) fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Observer handle for the learner-facing "current assessment" state;
    /// updated after every successful operation that yields an assessment.
    pub fn subscribe(&self) -> watch::Receiver<Option<Assessment>> {
        self.current.subscribe()
    }

    pub(crate) fn publish(&self, assessment: &Assessment) {
        self.current.send_replace(Some(assessment.clone()));
    }

    /// Drops the published assessment if it is the one with this id.
    pub(crate) fn retract(&self, assessment_id: i64) {
        self.current.send_if_modified(|slot| {
            if slot.as_ref().is_some_and(|a| a.id == assessment_id) {
                *slot = None;
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;

    use crate::catalog::TaskCatalog;
    use crate::store::MemoryStore;

    use super::AssessmentService;

    const TEST_CATALOG: &str = r#"{
        "assessment": {
            "title": "Test battery",
            "tasks": [
                {"id": "A", "points": 4, "questions": [
                    {"id": "a1", "answer": "cat"},
                    {"id": "a2", "answer": 3}
                ]},
                {"id": "B", "points": 4, "questions": [
                    {"id": "b1", "answer": "dog"}
                ]},
                {"id": "C", "points": 2, "questions": []}
            ]
        }
    }"#;

    pub fn service() -> (AssessmentService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(TaskCatalog::from_json(TEST_CATALOG).unwrap());
        (AssessmentService::new(store.clone(), catalog), store)
    }
}
