use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::database::Database;
use crate::errors::{ApiError, classify_database_error};
use crate::models::*;
use crate::progress;

// Import logging macros
use crate::{log_service_start, log_service_success};

pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
pub const MAX_LEADERBOARD_LIMIT: usize = 100;

type UserLocks = Arc<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>>;

/// Held while one user's progress is being changed. The map entry is removed on drop
/// once nobody else holds or waits for it.
struct UserLockGuard {
    locks: UserLocks,
    user_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks
            .get(&self.user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.user_id);
        }
    }
}

#[derive(Clone)]
pub struct QuizService {
    db: Database,
    // Serializes progress updates per user
    locks: UserLocks,
}

impl QuizService {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn new_in_memory() -> anyhow::Result<Self> {
        Ok(Self::new(Database::new("sqlite::memory:").await?))
    }

    pub async fn create_user(&self, request: CreateUserRequest) -> Result<User, ApiError> {
        let username = request.username.trim();
        let email = request.email.trim();

        if username.is_empty() {
            return Err(ApiError::ValidationError("username must not be empty".to_string()));
        }
        if email.is_empty() {
            return Err(ApiError::ValidationError("email must not be empty".to_string()));
        }

        self.db
            .create_user(username, email)
            .await
            .map_err(|e| classify_database_error(&e))
    }

    pub async fn get_user(&self, id: Uuid) -> Result<User, ApiError> {
        self.db
            .get_user(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("User with ID '{}' not found", id)))
    }

    pub async fn record_answer(&self, request: &SubmitAnswerRequest) -> Result<AnswerResult, ApiError> {
        let submission = AnswerSubmission {
            topic: request.topic.trim().to_string(),
            difficulty: request.difficulty.trim().to_lowercase(),
            is_correct: progress::is_correct_answer(&request.user_answer, &request.correct_answer),
        };

        self.record_answer_at(request.user_id, &submission, Utc::now()).await
    }

    /// Apply an already evaluated answer as of `now`
    pub async fn record_answer_at(
        &self,
        user_id: Uuid,
        submission: &AnswerSubmission,
        now: DateTime<Utc>,
    ) -> Result<AnswerResult, ApiError> {
        log_service_start!("quiz_service", "record_answer", user_id = user_id);
        let started = Instant::now();

        let _guard = self.lock_user(user_id).await;

        let result = self
            .db
            .record_answer(user_id, submission, now)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("User with ID '{}' not found", user_id)))?;

        log_service_success!(
            "quiz_service",
            "record_answer",
            user_id = user_id,
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(result)
    }

    pub async fn get_leaderboard(&self, limit: Option<usize>) -> Result<Vec<User>, ApiError> {
        let limit = limit
            .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
            .clamp(1, MAX_LEADERBOARD_LIMIT);

        Ok(self.db.get_leaderboard(limit as i64).await?)
    }

    pub async fn get_user_stats(&self, user_id: Uuid) -> Result<UserStats, ApiError> {
        let _guard = self.lock_user(user_id).await;

        let (user, totals) = self
            .db
            .refresh_avatar(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("User with ID '{}' not found", user_id)))?;
        let avatar = user.avatar;

        let accuracy = progress::accuracy_percent(totals.total_correct, totals.total_questions);

        Ok(UserStats {
            user,
            total_questions: totals.total_questions,
            total_correct: totals.total_correct,
            accuracy: (accuracy * 10.0).round() / 10.0,
            sessions_count: totals.sessions_count,
            avatar,
        })
    }

    pub async fn suggest_difficulty(&self, user_id: Uuid) -> Result<DifficultySuggestion, ApiError> {
        self.get_user(user_id).await?;
        let sessions = self
            .db
            .get_recent_sessions(user_id, progress::SUGGESTION_SESSION_COUNT as i64)
            .await?;

        Ok(progress::suggest_difficulty(&sessions))
    }

    async fn lock_user(&self, user_id: Uuid) -> UserLockGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.entry(user_id).or_default().clone()
        };

        UserLockGuard {
            locks: self.locks.clone(),
            user_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }
}
