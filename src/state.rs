// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::assessment::AssessmentService;
use crate::catalog::TaskCatalog;
use crate::config::Config;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub catalog: Arc<TaskCatalog>,
    pub assessments: AssessmentService,
    pub config: Config,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, catalog: TaskCatalog, config: Config) -> Self {
        let catalog = Arc::new(catalog);
        let assessments = AssessmentService::new(store.clone(), catalog.clone());
        Self {
            store,
            catalog,
            assessments,
            config,
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for AssessmentService {
    fn from_ref(state: &AppState) -> Self {
        state.assessments.clone()
    }
}

impl FromRef<AppState> for Arc<dyn Store> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}
