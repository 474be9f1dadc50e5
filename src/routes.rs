// src/routes.rs

use std::sync::Arc;

use axum::{
    Router, http::Method,
    middleware,
    routing::{get, post, put},
};
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, assessment, auth, retry},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, assessments, retry requests, admin).
/// * Applies global middleware (Trace, CORS) and rate limiting on auth.
/// * Injects global state.
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:5173".parse().unwrap(),
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:5173".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(30)
            .finish()
            .unwrap(),
    );

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(GovernorLayer::new(governor_conf));

    let assessment_routes = Router::new()
        .route("/", post(assessment::start))
        .route("/current", get(assessment::current))
        .route("/best", get(assessment::best))
        .route("/eligibility", get(assessment::eligibility))
        .route("/{id}/complete", post(assessment::complete))
        .route("/{id}/tasks/{task}/submit", post(assessment::submit_task))
        .route("/{id}/tasks/{task}/score", post(assessment::record_score))
        .route(
            "/{id}/tasks/{task}/progress",
            put(assessment::save_progress)
                .get(assessment::load_progress)
                .delete(assessment::clear_progress),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let retry_routes = Router::new()
        .route("/", post(retry::create_retry_request))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/retry-requests", get(admin::list_retry_requests))
        .route("/retry-requests/{id}", put(admin::review_retry_request))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/assessments", assessment_routes)
        .nest("/api/retry-requests", retry_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
