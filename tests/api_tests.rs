use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::Arc;
use study_quiz::config::FallbackPolicy;
use study_quiz::llm_service::GenerationSettings;
use study_quiz::{api::*, Database, GenerationError, LLMService, ModelClient, QuizService};
use tower::ServiceExt;
use uuid::Uuid;

/// Stand-in for the model service with a fixed reply
struct ScriptedModel {
    reply: Result<String, GenerationError>,
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(
        &self,
        _system_message: Option<&str>,
        _prompt: &str,
        _temperature: f32,
    ) -> Result<String, GenerationError> {
        self.reply.clone()
    }

    async fn is_alive(&self) -> bool {
        self.reply.is_ok()
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted-1"
    }
}

const MODEL_REPLY: &str = r#"```json
[
  {"question": "What does HTTP stand for?", "options": ["HyperText Transfer Protocol", "High Transfer Text Protocol", "Hyperlink Text Protocol", "Home Tool Transfer Protocol"], "correct_answer": "HyperText Transfer Protocol", "explanation": "HTTP is the HyperText Transfer Protocol."},
  {"question": "Default HTTPS port?", "options": ["443", "80", "21", "8080"], "correct_answer": "443", "explanation": "HTTPS listens on 443 by default."}
]
```"#;

async fn create_state(reply: Result<String, GenerationError>, fallback: FallbackPolicy) -> AppState {
    let db = Database::new("sqlite::memory:").await.unwrap();
    let llm_service = LLMService::new(
        Arc::new(ScriptedModel { reply }),
        GenerationSettings {
            temperature: 0.7,
            fallback,
        },
    );

    AppState {
        quiz_service: QuizService::new(db),
        llm_service,
        max_questions: 20,
    }
}

async fn create_test_server() -> TestServer {
    let state = create_state(Ok(MODEL_REPLY.to_string()), FallbackPolicy::Strict).await;
    TestServer::new(create_router(state)).unwrap()
}

async fn create_user(server: &TestServer, username: &str) -> Uuid {
    let response = server
        .post("/api/users")
        .json(&json!({ "username": username, "email": format!("{}@example.com", username) }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    body["data"]["id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_api_create_and_get_user() {
    let server = create_test_server().await;
    let id = create_user(&server, "alice").await;

    let response = server.get(&format!("/api/users/{}", id)).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["username"], "alice");
    assert_eq!(body["data"]["total_points"], 0);
    assert_eq!(body["data"]["avatar"], "🎓");
    assert_eq!(body["data"]["difficulty_level"], "medium");
}

#[tokio::test]
async fn test_api_duplicate_user_conflict() {
    let server = create_test_server().await;
    create_user(&server, "bob").await;

    let response = server
        .post("/api/users")
        .json(&json!({ "username": "bob", "email": "another@example.com" }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("username"));
}

#[tokio::test]
async fn test_api_unknown_user_not_found() {
    let server = create_test_server().await;
    let missing = Uuid::new_v4();

    server
        .get(&format!("/api/users/{}", missing))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .get(&format!("/api/user-stats/{}", missing))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let response = server
        .post("/api/evaluate-answer")
        .json(&json!({
            "user_id": missing,
            "question": "q",
            "user_answer": "a",
            "correct_answer": "a",
            "topic": "t",
            "difficulty": "easy"
        }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"], "User not found");
}

#[tokio::test]
async fn test_api_generate_questions_from_fenced_reply() {
    let server = create_test_server().await;

    let response = server
        .post("/api/generate-questions")
        .json(&json!({ "topic": "networking", "difficulty": "easy", "num_questions": 5 }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["source"], "model");
    let questions = body["data"]["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 2);
    assert_eq!(questions[1]["correct_answer"], "443");
}

#[tokio::test]
async fn test_api_generate_questions_rejects_bad_input() {
    let server = create_test_server().await;

    server
        .post("/api/generate-questions")
        .json(&json!({ "topic": "   ", "difficulty": "easy" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    server
        .post("/api/generate-questions")
        .json(&json!({ "topic": "rust", "difficulty": "easy", "num_questions": 0 }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    server
        .post("/api/generate-questions")
        .json(&json!({ "topic": "rust", "difficulty": "easy", "num_questions": 21 }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_api_generation_failure_statuses() {
    let unavailable = create_state(
        Err(GenerationError::ServiceUnavailable("connection refused".to_string())),
        FallbackPolicy::Strict,
    )
    .await;
    let server = TestServer::new(create_router(unavailable)).unwrap();
    server
        .post("/api/generate-questions")
        .json(&json!({ "topic": "rust", "difficulty": "hard", "num_questions": 3 }))
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let unusable = create_state(Ok(r#"["not", "an", "object"] \q"#.to_string()), FallbackPolicy::Strict).await;
    let server = TestServer::new(create_router(unusable)).unwrap();
    server
        .post("/api/generate-questions")
        .json(&json!({ "topic": "rust", "difficulty": "hard", "num_questions": 3 }))
        .await
        .assert_status(StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_api_mock_policy_serves_fallback() {
    let state = create_state(
        Err(GenerationError::ServiceUnavailable("timeout".to_string())),
        FallbackPolicy::Mock,
    )
    .await;
    let server = TestServer::new(create_router(state)).unwrap();

    let response = server
        .post("/api/generate-questions")
        .json(&json!({ "topic": "tides", "difficulty": "medium", "num_questions": 3 }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["source"], "fallback");
    assert_eq!(body["data"]["questions"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_api_evaluate_answer_and_stats() {
    let server = create_test_server().await;
    let id = create_user(&server, "carol").await;

    for (answer, expected_points) in [("443", 30), ("80", 0)] {
        let response = server
            .post("/api/evaluate-answer")
            .json(&json!({
                "user_id": id,
                "question": "Default HTTPS port?",
                "user_answer": answer,
                "correct_answer": "443",
                "topic": "networking",
                "difficulty": "hard"
            }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["data"]["points_earned"], expected_points);
        assert_eq!(body["data"]["total_points"], 30);
        assert_eq!(body["data"]["current_streak"], 1);
    }

    let response = server.get(&format!("/api/user-stats/{}", id)).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["total_questions"], 2);
    assert_eq!(body["data"]["total_correct"], 1);
    assert_eq!(body["data"]["accuracy"], 50.0);
    assert_eq!(body["data"]["sessions_count"], 1);
    assert_eq!(body["data"]["avatar"], "📚");

    let response = server.get(&format!("/api/suggest-difficulty/{}", id)).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["suggested_difficulty"], "medium");
}

#[tokio::test]
async fn test_api_leaderboard_order_and_limit() {
    let server = create_test_server().await;
    let low = create_user(&server, "low").await;
    let high = create_user(&server, "high").await;

    for (user, difficulty) in [(low, "easy"), (high, "hard")] {
        server
            .post("/api/evaluate-answer")
            .json(&json!({
                "user_id": user,
                "question": "q",
                "user_answer": "yes",
                "correct_answer": "yes",
                "topic": "misc",
                "difficulty": difficulty
            }))
            .await
            .assert_status_ok();
    }

    let body: Value = server.get("/api/leaderboard").await.json();
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["high", "low"]);

    let body: Value = server.get("/api/leaderboard?limit=1").await.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_health_endpoint_via_oneshot() {
    let state = create_state(
        Err(GenerationError::ServiceUnavailable("down".to_string())),
        FallbackPolicy::Strict,
    )
    .await;
    let app = create_router(state);

    let response = app
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["data"]["model_available"], false);
    assert_eq!(body["data"]["provider"], "scripted");
}
