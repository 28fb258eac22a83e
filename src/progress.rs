//! Pure progression rules: points, streaks, session continuation, avatar and
//! difficulty suggestion. Nothing here touches storage.

use chrono::{DateTime, Duration, Utc};

use crate::models::{Avatar, Difficulty, DifficultySuggestion, StudySession};

/// Answers on the same topic within this many seconds extend the latest session
pub const SESSION_WINDOW_SECS: i64 = 3600;

/// Number of most recent sessions considered for a difficulty suggestion
pub const SUGGESTION_SESSION_COUNT: usize = 5;

/// Trimmed exact comparison
pub fn is_correct_answer(user_answer: &str, correct_answer: &str) -> bool {
    user_answer.trim() == correct_answer.trim()
}

/// Points for one answer. Unknown difficulty labels earn easy-level points.
pub fn points_for(difficulty: &str, is_correct: bool) -> i64 {
    if !is_correct {
        return 0;
    }
    difficulty
        .parse::<Difficulty>()
        .map(|d| d.points())
        .unwrap_or(Difficulty::Easy.points())
}

/// Streak after studying at `now`, compared by UTC calendar day
pub fn next_streak(last_study_date: Option<DateTime<Utc>>, current_streak: i64, now: DateTime<Utc>) -> i64 {
    let Some(last) = last_study_date else {
        return 1;
    };

    let today = now.date_naive();
    let last_day = last.date_naive();

    if last_day == today {
        current_streak
    } else if last_day.succ_opt() == Some(today) {
        current_streak + 1
    } else {
        1
    }
}

/// Whether a session started at `created_at` is still open at `now`
pub fn continues_session(created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(created_at) < Duration::seconds(SESSION_WINDOW_SECS)
}

/// Accuracy in percent, 0 when nothing was answered
pub fn accuracy_percent(correct: i64, total: i64) -> f64 {
    if total <= 0 {
        0.0
    } else {
        correct as f64 / total as f64 * 100.0
    }
}

/// Avatar from lifetime totals across every session of a user
pub fn avatar_for_totals(total_correct: i64, total_questions: i64) -> Avatar {
    Avatar::from_accuracy(accuracy_percent(total_correct, total_questions))
}

/// Suggest the next difficulty from the most recent sessions (newest first)
pub fn suggest_difficulty(recent_sessions: &[StudySession]) -> DifficultySuggestion {
    let considered = &recent_sessions[..recent_sessions.len().min(SUGGESTION_SESSION_COUNT)];

    if considered.is_empty() {
        return DifficultySuggestion {
            suggested_difficulty: Difficulty::Medium,
            reason: "No sessions yet - starting at medium difficulty".to_string(),
            accuracy: 0.0,
        };
    }

    let total_questions: i64 = considered.iter().map(|s| s.questions_answered).sum();
    let total_correct: i64 = considered.iter().map(|s| s.correct_answers).sum();
    let accuracy = accuracy_percent(total_correct, total_questions) / 100.0;
    let percent = accuracy * 100.0;

    let (suggested_difficulty, reason) = if accuracy > 0.85 {
        (
            Difficulty::Hard,
            format!("High accuracy ({:.1}%) - ready for harder questions", percent),
        )
    } else if accuracy < 0.50 {
        (
            Difficulty::Easy,
            format!("Building foundations ({:.1}%) - practise the basics", percent),
        )
    } else {
        (
            Difficulty::Medium,
            format!("Steady progress ({:.1}%) - keep going at this level", percent),
        )
    };

    DifficultySuggestion {
        suggested_difficulty,
        reason,
        accuracy,
    }
}
