use crate::api::ApiResponse;
use axum::{http::StatusCode, response::Json};
use tracing::{error, info, warn};

/// Centralized error types for consistent API error handling
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] anyhow::Error),

    #[error("Resource already exists: {0}")]
    DuplicateResource(String),

    #[error("Model service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Question generation failed: {0}")]
    GenerationFailed(String),
}

/// Failure kinds of a question generation attempt
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    /// Model backend unreachable, timed out or answered with a non-success status
    #[error("model service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Model answered but nothing usable survived sanitizing, parsing and validation
    #[error("generation failed: {0}")]
    GenerationFailed(String),
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::ServiceUnavailable(msg) => ApiError::ServiceUnavailable(msg),
            GenerationError::GenerationFailed(msg) => ApiError::GenerationFailed(msg),
        }
    }
}

/// Error context for structured logging
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub resource_id: Option<String>,
    pub resource_type: String,
    pub user_friendly_message: Option<String>,
}

impl ErrorContext {
    pub fn new(operation: &str, resource_type: &str) -> Self {
        Self {
            operation: operation.to_string(),
            resource_id: None,
            resource_type: resource_type.to_string(),
            user_friendly_message: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn with_user_message(mut self, message: &str) -> Self {
        self.user_friendly_message = Some(message.to_string());
        self
    }
}

impl ApiError {
    /// Convert API error to HTTP response with consistent structure and logging
    pub fn to_response_with_context(
        self,
        context: ErrorContext,
    ) -> (StatusCode, Json<ApiResponse<()>>) {
        match &self {
            ApiError::NotFound(_) => {
                info!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Resource not found"
                );
                (
                    StatusCode::NOT_FOUND,
                    Json(ApiResponse::error(
                        context
                            .user_friendly_message
                            .unwrap_or_else(|| format!("{} not found", context.resource_type)),
                    )),
                )
            }
            ApiError::ValidationError(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Validation error"
                );
                (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error(self.to_string())),
                )
            }
            ApiError::DuplicateResource(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Duplicate resource"
                );
                (
                    StatusCode::CONFLICT,
                    Json(ApiResponse::error(self.to_string())),
                )
            }
            ApiError::ServiceUnavailable(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Model service unavailable"
                );
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ApiResponse::error(context.user_friendly_message.unwrap_or_else(
                        || "AI service temporarily unavailable. Please try again.".to_string(),
                    ))),
                )
            }
            ApiError::GenerationFailed(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Question generation failed"
                );
                (
                    StatusCode::BAD_GATEWAY,
                    Json(ApiResponse::error(context.user_friendly_message.unwrap_or_else(
                        || "AI service returned no usable questions. Please try again.".to_string(),
                    ))),
                )
            }
            ApiError::DatabaseError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Database error"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error(
                        "Database operation failed. Please try again.".to_string(),
                    )),
                )
            }
        }
    }

    /// Simple conversion without context
    pub fn to_response(self) -> (StatusCode, Json<ApiResponse<()>>) {
        let context = ErrorContext::new("unknown", "resource");
        self.to_response_with_context(context)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(anyhow::Error::from(err))
    }
}

/// Detect error kinds from storage error messages
pub fn classify_database_error(error: &anyhow::Error) -> ApiError {
    let message = error.to_string();
    let lowered = message.to_lowercase();

    if lowered.contains("unique constraint") || lowered.contains("already exists") {
        // SQLite reports "UNIQUE constraint failed: users.email"
        let column = lowered
            .split("failed:")
            .nth(1)
            .and_then(|rest| rest.trim().split(|c: char| c == ',' || c.is_whitespace()).next())
            .and_then(|qualified| qualified.rsplit('.').next())
            .filter(|column| !column.is_empty());

        match column {
            Some(column) => ApiError::DuplicateResource(format!("{} is already taken", column)),
            None => ApiError::DuplicateResource("Resource already exists".to_string()),
        }
    } else if lowered.contains("not found") || lowered.contains("no rows") {
        ApiError::NotFound("Resource not found".to_string())
    } else {
        ApiError::DatabaseError(anyhow::anyhow!("{}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_creation() {
        let context = ErrorContext::new("create_user", "user")
            .with_id("alice")
            .with_user_message("Custom message");

        assert_eq!(context.operation, "create_user");
        assert_eq!(context.resource_type, "user");
        assert_eq!(context.resource_id, Some("alice".to_string()));
        assert_eq!(
            context.user_friendly_message,
            Some("Custom message".to_string())
        );
    }

    #[test]
    fn test_error_classification() {
        let duplicate_error = anyhow::anyhow!("error returned from database: (code: 2067) UNIQUE constraint failed: users.email");
        match classify_database_error(&duplicate_error) {
            ApiError::DuplicateResource(msg) => assert_eq!(msg, "email is already taken"),
            other => panic!("expected duplicate, got {:?}", other),
        }

        let not_found_error = anyhow::anyhow!("No rows returned");
        let classified = classify_database_error(&not_found_error);
        assert!(matches!(classified, ApiError::NotFound(_)));

        let other_error = anyhow::anyhow!("disk I/O error");
        let classified = classify_database_error(&other_error);
        assert!(matches!(classified, ApiError::DatabaseError(_)));
    }

    #[test]
    fn test_generation_error_conversion() {
        let api: ApiError = GenerationError::ServiceUnavailable("refused".to_string()).into();
        assert!(matches!(api, ApiError::ServiceUnavailable(_)));

        let api: ApiError = GenerationError::GenerationFailed("empty".to_string()).into();
        assert!(matches!(api, ApiError::GenerationFailed(_)));
    }

    #[test]
    fn test_api_error_responses() {
        let error = ApiError::NotFound("User not found".to_string());
        let context = ErrorContext::new("get_user", "user").with_id("123");
        let (status, _response) = error.to_response_with_context(context);
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = ApiError::ValidationError("Invalid data".to_string()).to_response();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = ApiError::DuplicateResource("Already exists".to_string()).to_response();
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = ApiError::ServiceUnavailable("down".to_string()).to_response();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = ApiError::GenerationFailed("garbage".to_string()).to_response();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
