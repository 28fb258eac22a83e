use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    errors::{ApiError, ErrorContext},
    llm_service::LLMService,
    models::*,
    quiz_service::QuizService,
};

// Import logging macros
use crate::{log_api_error, log_api_start, log_api_success, log_api_warn};

#[derive(Clone)]
pub struct AppState {
    pub quiz_service: QuizService,
    pub llm_service: LLMService,
    pub max_questions: usize,
}

#[derive(Deserialize)]
pub struct LeaderboardParams {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

// User endpoints
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<User> {
    info!(username = %request.username, "Creating new user");
    let username = request.username.clone();

    match state.quiz_service.create_user(request).await {
        Ok(user) => {
            log_api_success!("create_user", user_id = user.id, "user created");
            Ok(Json(ApiResponse::success(user)))
        }
        Err(e) => {
            let context = ErrorContext::new("create_user", "user").with_id(&username);
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn get_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<User> {
    log_api_start!("get_user", user_id = id);

    match state.quiz_service.get_user(id).await {
        Ok(user) => Ok(Json(ApiResponse::success(user))),
        Err(e) => {
            let context = ErrorContext::new("get_user", "User").with_id(&id.to_string());
            Err(e.to_response_with_context(context))
        }
    }
}

// Question generation
pub async fn generate_questions(
    State(state): State<AppState>,
    Json(request): Json<GenerateQuestionsRequest>,
) -> ApiResult<GeneratedQuestions> {
    log_api_start!("generate_questions", topic = request.topic);
    let context = ErrorContext::new("generate_questions", "questions").with_id(request.topic.trim());

    if request.topic.trim().is_empty() {
        let error = ApiError::ValidationError("topic must not be empty".to_string());
        return Err(error.to_response_with_context(context));
    }
    if request.num_questions == 0 || request.num_questions > state.max_questions {
        let error = ApiError::ValidationError(format!(
            "num_questions must be between 1 and {}",
            state.max_questions
        ));
        return Err(error.to_response_with_context(context));
    }

    match state
        .llm_service
        .generate_questions(&request.topic, request.difficulty, request.num_questions)
        .await
    {
        Ok(generated) => {
            if generated.source == QuestionSource::Fallback {
                log_api_warn!("generate_questions", "serving fallback questions");
            }
            log_api_success!(
                "generate_questions",
                count = generated.questions.len(),
                "questions generated"
            );
            Ok(Json(ApiResponse::success(generated)))
        }
        Err(e) => {
            log_api_error!("generate_questions", error = e, "question generation failed");
            Err(ApiError::from(e).to_response_with_context(context))
        }
    }
}

// Answer evaluation and progress
pub async fn evaluate_answer(
    State(state): State<AppState>,
    Json(request): Json<SubmitAnswerRequest>,
) -> ApiResult<AnswerResult> {
    log_api_start!("evaluate_answer", user_id = request.user_id);

    match state.quiz_service.record_answer(&request).await {
        Ok(result) => {
            log_api_success!(
                "evaluate_answer",
                user_id = request.user_id,
                format!("correct={} points={}", result.is_correct, result.points_earned)
            );
            Ok(Json(ApiResponse::success(result)))
        }
        Err(e) => {
            let context =
                ErrorContext::new("evaluate_answer", "User").with_id(&request.user_id.to_string());
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn get_leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardParams>,
) -> ApiResult<Vec<User>> {
    log_api_start!("get_leaderboard");

    match state.quiz_service.get_leaderboard(params.limit).await {
        Ok(users) => {
            log_api_success!("get_leaderboard", count = users.len(), "leaderboard retrieved");
            Ok(Json(ApiResponse::success(users)))
        }
        Err(e) => Err(e.to_response_with_context(ErrorContext::new("get_leaderboard", "user"))),
    }
}

pub async fn get_user_stats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<UserStats> {
    log_api_start!("get_user_stats", user_id = id);

    match state.quiz_service.get_user_stats(id).await {
        Ok(stats) => Ok(Json(ApiResponse::success(stats))),
        Err(e) => {
            let context = ErrorContext::new("get_user_stats", "User").with_id(&id.to_string());
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn suggest_difficulty(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<DifficultySuggestion> {
    log_api_start!("suggest_difficulty", user_id = id);

    match state.quiz_service.suggest_difficulty(id).await {
        Ok(suggestion) => Ok(Json(ApiResponse::success(suggestion))),
        Err(e) => {
            let context = ErrorContext::new("suggest_difficulty", "User").with_id(&id.to_string());
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    let status = state.llm_service.health().await;
    if !status.model_available {
        log_api_warn!("health", format!("{} model service is not reachable", status.provider));
    }
    Json(ApiResponse::success(status))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // User routes
        .route("/api/users", post(create_user))
        .route("/api/users/:id", get(get_user))
        .route("/api/user-stats/:id", get(get_user_stats))
        .route("/api/suggest-difficulty/:id", get(suggest_difficulty))
        .route("/api/leaderboard", get(get_leaderboard))

        // Quiz routes
        .route("/api/generate-questions", post(generate_questions))
        .route("/api/evaluate-answer", post(evaluate_answer))

        .route("/api/health", get(health))

        .with_state(state)
}
