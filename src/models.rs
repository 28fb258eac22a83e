use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// Points awarded for a correct answer at this level
    pub fn points(&self) -> i64 {
        match self {
            Difficulty::Easy => 10,
            Difficulty::Medium => 20,
            Difficulty::Hard => 30,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(anyhow::anyhow!("Unknown difficulty '{}'", other)),
        }
    }
}

/// Badge derived from lifetime accuracy. Variants are ordered from lowest to highest tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Avatar {
    #[serde(rename = "🎓")]
    Newcomer,
    #[serde(rename = "🌱")]
    Sprout,
    #[serde(rename = "📚")]
    Learner,
    #[serde(rename = "💪")]
    Striver,
    #[serde(rename = "🔥")]
    OnFire,
    #[serde(rename = "🌟")]
    Star,
    #[serde(rename = "👑")]
    Crown,
}

impl Avatar {
    pub const ALL: [Avatar; 7] = [
        Avatar::Newcomer,
        Avatar::Sprout,
        Avatar::Learner,
        Avatar::Striver,
        Avatar::OnFire,
        Avatar::Star,
        Avatar::Crown,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Avatar::Newcomer => "🎓",
            Avatar::Sprout => "🌱",
            Avatar::Learner => "📚",
            Avatar::Striver => "💪",
            Avatar::OnFire => "🔥",
            Avatar::Star => "🌟",
            Avatar::Crown => "👑",
        }
    }

    /// Unrecognised symbols read back from storage fall to the lowest tier.
    pub fn from_symbol(symbol: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|avatar| avatar.symbol() == symbol)
            .unwrap_or(Avatar::Newcomer)
    }

    /// Tier for a lifetime accuracy expressed in percent (0-100).
    pub fn from_accuracy(accuracy_percent: f64) -> Self {
        match accuracy_percent {
            a if a >= 90.0 => Avatar::Crown,
            a if a >= 80.0 => Avatar::Star,
            a if a >= 70.0 => Avatar::OnFire,
            a if a >= 60.0 => Avatar::Striver,
            a if a >= 50.0 => Avatar::Learner,
            a if a >= 40.0 => Avatar::Sprout,
            _ => Avatar::Newcomer,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub total_points: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_study_date: Option<DateTime<Utc>>,
    pub avatar: Avatar,
    pub difficulty_level: Difficulty,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudySession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub topic: String,
    pub questions_answered: i64,
    pub correct_answers: i64,
    pub points_earned: i64,
    pub difficulty: String, // as submitted; unknown values earn easy-level points
    pub created_at: DateTime<Utc>,
}

/// A validated multiple-choice question. `correct_answer` is always one of the four `options`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionSource {
    Model,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedQuestions {
    pub questions: Vec<Question>,
    pub source: QuestionSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
}

fn default_question_count() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateQuestionsRequest {
    pub topic: String,
    pub difficulty: Difficulty,
    #[serde(default = "default_question_count")]
    pub num_questions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAnswerRequest {
    pub user_id: Uuid,
    pub question: String,
    pub user_answer: String,
    pub correct_answer: String,
    pub topic: String,
    pub difficulty: String,
}

/// Single answer being applied to a user's progress
#[derive(Debug, Clone)]
pub struct AnswerSubmission {
    pub topic: String,
    pub difficulty: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub is_correct: bool,
    pub points_earned: i64,
    pub total_points: i64,
    pub current_streak: i64,
    pub avatar: Avatar,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStats {
    pub user: User,
    pub total_questions: i64,
    pub total_correct: i64,
    pub accuracy: f64,
    pub sessions_count: i64,
    pub avatar: Avatar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultySuggestion {
    pub suggested_difficulty: Difficulty,
    pub reason: String,
    pub accuracy: f64, // fraction 0.0-1.0 over the sessions considered
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub model_available: bool,
    pub provider: String,
    pub model: String,
}
