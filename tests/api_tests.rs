// tests/api_tests.rs

use std::net::SocketAddr;
use std::sync::Arc;

use rma_backend::catalog::TaskCatalog;
use rma_backend::config::Config;
use rma_backend::routes;
use rma_backend::state::AppState;
use rma_backend::store::{MemoryStore, Store};
use rma_backend::utils::hash::hash_password;

/// Spawns the app on a random port against an in-memory store.
/// Returns the base URL and a handle to the store for seeding.
async fn spawn_app() -> (String, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());

    let config = Config {
        database_url: "postgres://unused".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        catalog_path: "data/rma.json".to_string(),
        admin_username: None,
        admin_password: None,
    };

    let catalog = TaskCatalog::from_json(include_str!("../data/rma.json"))
        .expect("Shipped catalog must parse");

    let state = AppState::new(store.clone() as Arc<dyn Store>, catalog, config);
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (address, store)
}

fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().to_string()[..8])
}

/// Registers and logs in a fresh learner, returning the bearer token.
async fn register_and_login(client: &reqwest::Client, address: &str) -> String {
    let username = unique_name("learner");
    let password = "password123";

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("Register failed");
    assert_eq!(response.status().as_u16(), 201);

    login(client, address, &username, password).await
}

async fn login(
    client: &reqwest::Client,
    address: &str,
    username: &str,
    password: &str,
) -> String {
    let body: serde_json::Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("Login failed")
        .json()
        .await
        .expect("Failed to parse login json");

    body["token"].as_str().expect("Token not found").to_string()
}

async fn start_assessment(
    client: &reqwest::Client,
    address: &str,
    token: &str,
) -> serde_json::Value {
    let response = client
        .post(format!("{}/api/assessments", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({}))
        .send()
        .await
        .expect("Start failed");
    assert_eq!(response.status().as_u16(), 200);
    response.json().await.unwrap()
}

async fn complete_assessment(client: &reqwest::Client, address: &str, token: &str, id: i64) {
    let response = client
        .post(format!("{}/api/assessments/{}/complete", address, id))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Complete failed");
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn health_check_404() {
    let (address, _store) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn register_fails_validation() {
    let (address, _store) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({ "username": "yo", "password": "password123" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn duplicate_username_conflicts() {
    let (address, _store) = spawn_app().await;
    let client = reqwest::Client::new();
    let username = unique_name("dup");

    for expected in [201, 409] {
        let response = client
            .post(format!("{}/api/auth/register", address))
            .json(&serde_json::json!({ "username": username, "password": "password123" }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), expected);
    }
}

#[tokio::test]
async fn assessment_routes_require_auth() {
    let (address, _store) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/assessments/current", address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn fresh_learner_gets_a_zeroed_assessment() {
    let (address, _store) = spawn_app().await;
    let client = reqwest::Client::new();
    let token = register_and_login(&client, &address).await;

    let assessment = start_assessment(&client, &address, &token).await;

    assert_eq!(assessment["grade_level"], 2);
    assert_eq!(assessment["task_a_score"], 0.0);
    assert_eq!(assessment["task_l_score"], 0.0);
    assert_eq!(assessment["total_score"], 0.0);
    assert_eq!(assessment["overall_score"], 0.0);
    assert!(assessment["completed_at"].is_null());

    // Starting again resumes the same open assessment.
    let again = start_assessment(&client, &address, &token).await;
    assert_eq!(again["id"], assessment["id"]);
}

#[tokio::test]
async fn submitting_a_task_updates_the_totals() {
    let (address, _store) = spawn_app().await;
    let client = reqwest::Client::new();
    let token = register_and_login(&client, &address).await;

    let assessment = start_assessment(&client, &address, &token).await;
    let id = assessment["id"].as_i64().unwrap();

    // Answers match the shipped catalog for task A, with sloppy casing
    // and whitespace on purpose.
    let result: serde_json::Value = client
        .post(format!("{}/api/assessments/{}/tasks/a/submit", address, id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "answers": { "a1": " c", "a2": "S ", "a3": "a", "a4": "z" }
        }))
        .send()
        .await
        .expect("Submit failed")
        .json()
        .await
        .unwrap();

    assert_eq!(result["task"], "A");
    assert_eq!(result["correct_count"], 4);
    assert_eq!(result["score"], 4.0);

    let current: serde_json::Value = client
        .get(format!("{}/api/assessments/current", address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Current failed")
        .json()
        .await
        .unwrap();

    assert_eq!(current["task_a_score"], 4.0);
    assert_eq!(current["total_score"], 4.0);
    // 4 of 44 possible points.
    assert_eq!(current["overall_score"], 9.09);
}

#[tokio::test]
async fn unknown_task_letter_is_rejected() {
    let (address, _store) = spawn_app().await;
    let client = reqwest::Client::new();
    let token = register_and_login(&client, &address).await;

    let assessment = start_assessment(&client, &address, &token).await;
    let id = assessment["id"].as_i64().unwrap();

    let response = client
        .post(format!("{}/api/assessments/{}/tasks/zz/submit", address, id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "answers": {} }))
        .send()
        .await
        .expect("Submit failed");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn progress_round_trips_over_http() {
    let (address, _store) = spawn_app().await;
    let client = reqwest::Client::new();
    let token = register_and_login(&client, &address).await;

    let assessment = start_assessment(&client, &address, &token).await;
    let id = assessment["id"].as_i64().unwrap();
    let url = format!("{}/api/assessments/{}/tasks/b/progress", address, id);

    let save = client
        .put(&url)
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "current_question_index": 1,
            "time_left": 200,
            "answers": { "b1": "f" },
            "updated_at": chrono::Utc::now()
        }))
        .send()
        .await
        .expect("Save failed");
    assert_eq!(save.status().as_u16(), 200);

    let loaded: serde_json::Value = client
        .get(&url)
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Load failed")
        .json()
        .await
        .unwrap();
    assert_eq!(loaded["current_question_index"], 1);
    assert_eq!(loaded["answers"]["b1"], "f");

    let clear = client
        .delete(&url)
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Clear failed");
    assert_eq!(clear.status().as_u16(), 200);

    let after: serde_json::Value = client
        .get(&url)
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Load failed")
        .json()
        .await
        .unwrap();
    assert!(after.is_null());
}

#[tokio::test]
async fn attempt_limit_and_admin_approved_retry_flow() {
    let (address, store) = spawn_app().await;
    let client = reqwest::Client::new();

    // Seed an admin directly in the store.
    let admin_password = "admin-pass-123";
    store
        .create_profile("head_teacher", &hash_password(admin_password).unwrap(), "admin")
        .await
        .unwrap();
    let admin_token = login(&client, &address, "head_teacher", admin_password).await;

    let token = register_and_login(&client, &address).await;

    // Burn through the three allowed attempts.
    for _ in 0..3 {
        let assessment = start_assessment(&client, &address, &token).await;
        let id = assessment["id"].as_i64().unwrap();
        complete_assessment(&client, &address, &token, id).await;
    }

    // Fourth attempt is denied with a reason.
    let denied = client
        .post(format!("{}/api/assessments", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({}))
        .send()
        .await
        .expect("Start failed");
    assert_eq!(denied.status().as_u16(), 403);
    let body: serde_json::Value = denied.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("limit"));

    // The learner asks for another try; markup in the reason is stripped.
    let created: serde_json::Value = client
        .post(format!("{}/api/retry-requests", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "reason": "I was sick <script>alert(1)</script>" }))
        .send()
        .await
        .expect("Retry request failed")
        .json()
        .await
        .unwrap();
    assert_eq!(created["status"], "pending");
    let request_id = created["id"].as_i64().unwrap();

    // Admin sees the pending request and approves it.
    let pending: serde_json::Value = client
        .get(format!("{}/api/admin/retry-requests?status=pending", address))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .expect("List failed")
        .json()
        .await
        .unwrap();
    let listed = pending
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["id"].as_i64() == Some(request_id))
        .expect("Pending request should be listed");
    assert!(!listed["reason"].as_str().unwrap().contains("script"));

    let review = client
        .put(format!("{}/api/admin/retry-requests/{}", address, request_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&serde_json::json!({ "status": "approved" }))
        .send()
        .await
        .expect("Review failed");
    assert_eq!(review.status().as_u16(), 200);

    // Eligibility now reports the grant.
    let eligibility: serde_json::Value = client
        .get(format!("{}/api/assessments/eligibility", address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Eligibility failed")
        .json()
        .await
        .unwrap();
    assert_eq!(eligibility["allowed"], true);
    assert_eq!(eligibility["approved_request_id"], request_id);

    // The extra attempt goes through and consumes the grant.
    let extra = start_assessment(&client, &address, &token).await;
    let extra_id = extra["id"].as_i64().unwrap();

    let approved: serde_json::Value = client
        .get(format!("{}/api/admin/retry-requests?status=approved", address))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .expect("List failed")
        .json()
        .await
        .unwrap();
    let consumed = approved
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["id"].as_i64() == Some(request_id))
        .unwrap();
    assert_eq!(consumed["used"], true);

    // Once the extra attempt is done, the learner is out of tries again.
    complete_assessment(&client, &address, &token, extra_id).await;
    let denied_again = client
        .post(format!("{}/api/assessments", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({}))
        .send()
        .await
        .expect("Start failed");
    assert_eq!(denied_again.status().as_u16(), 403);
}

#[tokio::test]
async fn admin_routes_reject_learners() {
    let (address, _store) = spawn_app().await;
    let client = reqwest::Client::new();
    let token = register_and_login(&client, &address).await;

    let response = client
        .get(format!("{}/api/admin/retry-requests", address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn best_assessment_tracks_the_highest_total() {
    let (address, _store) = spawn_app().await;
    let client = reqwest::Client::new();
    let token = register_and_login(&client, &address).await;

    let first = start_assessment(&client, &address, &token).await;
    let first_id = first["id"].as_i64().unwrap();

    // Score task A fully, then finish the attempt.
    client
        .post(format!("{}/api/assessments/{}/tasks/a/submit", address, first_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "answers": { "a1": "C", "a2": "S", "a3": "A", "a4": "Z" }
        }))
        .send()
        .await
        .expect("Submit failed");
    complete_assessment(&client, &address, &token, first_id).await;

    // Second attempt scores nothing.
    start_assessment(&client, &address, &token).await;

    let best: serde_json::Value = client
        .get(format!("{}/api/assessments/best", address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Best failed")
        .json()
        .await
        .unwrap();

    assert_eq!(best["id"].as_i64(), Some(first_id));
    assert_eq!(best["total_score"], 4.0);
}
