use anyhow::{Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::time::Instant;
use uuid::Uuid;

use crate::models::*;
use crate::progress;

// Import logging macros
use crate::log_db_operation;

/// Totals over every session a user has recorded
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionTotals {
    pub total_questions: i64,
    pub total_correct: i64,
    pub sessions_count: i64,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

/// Fixed-width UTC timestamps so that text ordering matches time ordering
fn to_db_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn from_db_time(text: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(text)?.with_timezone(&Utc))
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `sqlite::memory:` would see its own empty database
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;
        let db = Database { pool };
        db.migrate().await?;
        log_db_operation!(info, "migrate", "database initialized");
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                total_points INTEGER NOT NULL DEFAULT 0,
                current_streak INTEGER NOT NULL DEFAULT 0,
                longest_streak INTEGER NOT NULL DEFAULT 0,
                last_study_date TEXT,
                avatar TEXT NOT NULL DEFAULT '🎓',
                difficulty_level TEXT NOT NULL DEFAULT 'medium',
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS study_sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                topic TEXT NOT NULL,
                questions_answered INTEGER NOT NULL DEFAULT 0,
                correct_answers INTEGER NOT NULL DEFAULT 0,
                points_earned INTEGER NOT NULL DEFAULT 0,
                difficulty TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                CHECK (correct_answers <= questions_answered)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_study_sessions_user_topic ON study_sessions (user_id, topic, created_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // User operations
    pub async fn create_user(&self, username: &str, email: &str) -> Result<User> {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            total_points: 0,
            current_streak: 0,
            longest_streak: 0,
            last_study_date: None,
            avatar: Avatar::Newcomer,
            difficulty_level: Difficulty::Medium,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, total_points, current_streak, longest_streak,
                               last_study_date, avatar, difficulty_level, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.total_points)
        .bind(user.current_streak)
        .bind(user.longest_streak)
        .bind(user.last_study_date.map(to_db_time))
        .bind(user.avatar.symbol())
        .bind(user.difficulty_level.as_str())
        .bind(to_db_time(user.created_at))
        .execute(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row_to_user(&row)).transpose()
    }

    pub async fn get_leaderboard(&self, limit: i64) -> Result<Vec<User>> {
        let rows = sqlx::query(
            "SELECT * FROM users ORDER BY total_points DESC, created_at ASC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        log_db_operation!(debug, "get_leaderboard", count = rows.len());
        rows.iter().map(row_to_user).collect()
    }

    /// Recompute the avatar from committed sessions and store it, returning the
    /// refreshed user with the totals it was derived from. `None` for an unknown user.
    pub async fn refresh_avatar(&self, user_id: Uuid) -> Result<Option<(User, SessionTotals)>> {
        let mut tx = self.pool.begin().await?;

        // Same write-first ordering as record_answer, so no answer can commit in between
        let touched = sqlx::query("UPDATE users SET avatar = avatar WHERE id = ?1")
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await?;

        if touched.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let totals = session_totals(&mut *tx, user_id).await?;
        let avatar = progress::avatar_for_totals(totals.total_correct, totals.total_questions);

        sqlx::query("UPDATE users SET avatar = ?1 WHERE id = ?2")
            .bind(avatar.symbol())
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(user_id.to_string())
            .fetch_one(&mut *tx)
            .await?;
        let user = row_to_user(&row)?;

        tx.commit().await?;
        Ok(Some((user, totals)))
    }

    // Session operations
    pub async fn get_sessions_for_user(&self, user_id: Uuid) -> Result<Vec<StudySession>> {
        let rows = sqlx::query(
            "SELECT * FROM study_sessions WHERE user_id = ?1 ORDER BY created_at DESC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_session).collect()
    }

    pub async fn get_recent_sessions(&self, user_id: Uuid, limit: i64) -> Result<Vec<StudySession>> {
        let rows = sqlx::query(
            "SELECT * FROM study_sessions WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )
        .bind(user_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_session).collect()
    }

    pub async fn get_session_totals(&self, user_id: Uuid) -> Result<SessionTotals> {
        let mut conn = self.pool.acquire().await?;
        session_totals(&mut *conn, user_id).await
    }

    /// Apply one answer to the user's counters and sessions in a single transaction.
    /// Returns `None` (and writes nothing) when the user does not exist.
    pub async fn record_answer(
        &self,
        user_id: Uuid,
        answer: &AnswerSubmission,
        now: DateTime<Utc>,
    ) -> Result<Option<AnswerResult>> {
        let started = Instant::now();
        let points = progress::points_for(&answer.difficulty, answer.is_correct);
        let mut tx = self.pool.begin().await?;

        // Writing first takes the database write lock before anything is read
        let updated = sqlx::query("UPDATE users SET total_points = total_points + ?1 WHERE id = ?2")
            .bind(points)
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(user_id.to_string())
            .fetch_one(&mut *tx)
            .await?;
        let user = row_to_user(&row)?;

        let current_streak = progress::next_streak(user.last_study_date, user.current_streak, now);
        let longest_streak = user.longest_streak.max(current_streak);

        let latest_session = sqlx::query(
            r#"
            SELECT * FROM study_sessions
            WHERE user_id = ?1 AND topic = ?2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id.to_string())
        .bind(&answer.topic)
        .fetch_optional(&mut *tx)
        .await?
        .map(|row| row_to_session(&row))
        .transpose()?;

        let correct_increment = i64::from(answer.is_correct);
        match latest_session {
            Some(session) if progress::continues_session(session.created_at, now) => {
                sqlx::query(
                    r#"
                    UPDATE study_sessions
                    SET questions_answered = questions_answered + 1,
                        correct_answers = correct_answers + ?1,
                        points_earned = points_earned + ?2
                    WHERE id = ?3
                    "#,
                )
                .bind(correct_increment)
                .bind(points)
                .bind(session.id.to_string())
                .execute(&mut *tx)
                .await?;
            }
            _ => {
                sqlx::query(
                    r#"
                    INSERT INTO study_sessions (id, user_id, topic, questions_answered, correct_answers,
                                                points_earned, difficulty, created_at)
                    VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6, ?7)
                    "#,
                )
                .bind(Uuid::new_v4().to_string())
                .bind(user_id.to_string())
                .bind(&answer.topic)
                .bind(correct_increment)
                .bind(points)
                .bind(&answer.difficulty)
                .bind(to_db_time(now))
                .execute(&mut *tx)
                .await?;
            }
        }

        let totals = session_totals(&mut *tx, user_id).await?;
        let avatar = progress::avatar_for_totals(totals.total_correct, totals.total_questions);

        sqlx::query(
            r#"
            UPDATE users
            SET current_streak = ?1, longest_streak = ?2, last_study_date = ?3, avatar = ?4
            WHERE id = ?5
            "#,
        )
        .bind(current_streak)
        .bind(longest_streak)
        .bind(to_db_time(now))
        .bind(avatar.symbol())
        .bind(user_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        log_db_operation!(
            debug,
            "record_answer",
            user_id = user_id,
            duration_ms = started.elapsed().as_millis() as u64
        );

        Ok(Some(AnswerResult {
            is_correct: answer.is_correct,
            points_earned: points,
            total_points: user.total_points,
            current_streak,
            avatar,
        }))
    }
}

async fn session_totals(conn: &mut SqliteConnection, user_id: Uuid) -> Result<SessionTotals> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(SUM(questions_answered), 0) AS total_questions,
               COALESCE(SUM(correct_answers), 0) AS total_correct,
               COUNT(*) AS sessions_count
        FROM study_sessions
        WHERE user_id = ?1
        "#,
    )
    .bind(user_id.to_string())
    .fetch_one(&mut *conn)
    .await?;

    Ok(SessionTotals {
        total_questions: row.try_get("total_questions")?,
        total_correct: row.try_get("total_correct")?,
        sessions_count: row.try_get("sessions_count")?,
    })
}

fn row_to_user(row: &SqliteRow) -> Result<User> {
    let difficulty_level: String = row.try_get("difficulty_level")?;
    Ok(User {
        id: Uuid::parse_str(&row.try_get::<String, _>("id")?)?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        total_points: row.try_get("total_points")?,
        current_streak: row.try_get("current_streak")?,
        longest_streak: row.try_get("longest_streak")?,
        last_study_date: row
            .try_get::<Option<String>, _>("last_study_date")?
            .map(|s| from_db_time(&s))
            .transpose()?,
        avatar: Avatar::from_symbol(&row.try_get::<String, _>("avatar")?),
        difficulty_level: difficulty_level
            .parse()
            .map_err(|e| anyhow!("Corrupt difficulty_level for user: {}", e))?,
        created_at: from_db_time(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn row_to_session(row: &SqliteRow) -> Result<StudySession> {
    Ok(StudySession {
        id: Uuid::parse_str(&row.try_get::<String, _>("id")?)?,
        user_id: Uuid::parse_str(&row.try_get::<String, _>("user_id")?)?,
        topic: row.try_get("topic")?,
        questions_answered: row.try_get("questions_answered")?,
        correct_answers: row.try_get("correct_answers")?,
        points_earned: row.try_get("points_earned")?,
        difficulty: row.try_get("difficulty")?,
        created_at: from_db_time(&row.try_get::<String, _>("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn answer(topic: &str, difficulty: &str, is_correct: bool) -> AnswerSubmission {
        AnswerSubmission {
            topic: topic.to_string(),
            difficulty: difficulty.to_string(),
            is_correct,
        }
    }

    #[test]
    fn test_db_time_roundtrip_and_ordering() {
        let early = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let later = early + Duration::milliseconds(1);
        assert!(to_db_time(early) < to_db_time(later));
        assert_eq!(from_db_time(&to_db_time(later)).unwrap(), later);
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let user = db.create_user("alice", "alice@example.com").await.unwrap();

        let fetched = db.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(fetched.username, "alice");
        assert_eq!(fetched.total_points, 0);
        assert_eq!(fetched.avatar, Avatar::Newcomer);
        assert_eq!(fetched.difficulty_level, Difficulty::Medium);
        assert!(fetched.last_study_date.is_none());

        assert!(db.get_user(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_is_rejected() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.create_user("alice", "alice@example.com").await.unwrap();

        let err = db.create_user("alice", "other@example.com").await.unwrap_err();
        assert!(err.to_string().to_lowercase().contains("unique constraint"));
    }

    #[tokio::test]
    async fn test_record_answer_unknown_user_writes_nothing() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let missing = Uuid::new_v4();

        let result = db
            .record_answer(missing, &answer("rust", "easy", true), Utc::now())
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(db.get_sessions_for_user(missing).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_continues_within_window() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let user = db.create_user("bob", "bob@example.com").await.unwrap();
        let start = Utc::now();

        db.record_answer(user.id, &answer("rust", "medium", true), start).await.unwrap();
        db.record_answer(user.id, &answer("rust", "medium", false), start + Duration::seconds(3599))
            .await
            .unwrap();

        let sessions = db.get_sessions_for_user(user.id).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].questions_answered, 2);
        assert_eq!(sessions[0].correct_answers, 1);
        assert_eq!(sessions[0].points_earned, 20);
    }

    #[tokio::test]
    async fn test_new_session_after_window_or_topic_change() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let user = db.create_user("carol", "carol@example.com").await.unwrap();
        let start = Utc::now();

        db.record_answer(user.id, &answer("rust", "hard", true), start).await.unwrap();
        db.record_answer(user.id, &answer("go", "hard", true), start + Duration::seconds(10))
            .await
            .unwrap();
        db.record_answer(user.id, &answer("rust", "hard", true), start + Duration::seconds(3600))
            .await
            .unwrap();

        let sessions = db.get_sessions_for_user(user.id).await.unwrap();
        assert_eq!(sessions.len(), 3);
        assert!(sessions.iter().all(|s| s.questions_answered == 1));

        let totals = db.get_session_totals(user.id).await.unwrap();
        assert_eq!(
            totals,
            SessionTotals {
                total_questions: 3,
                total_correct: 3,
                sessions_count: 3
            }
        );

        let recent = db.get_recent_sessions(user.id, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].topic, "rust");
        assert_eq!(recent[1].topic, "go");
    }

    #[tokio::test]
    async fn test_record_answer_updates_counters_and_avatar() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let user = db.create_user("dave", "dave@example.com").await.unwrap();
        let day_one = Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).unwrap();

        let first = db
            .record_answer(user.id, &answer("chemistry", "hard", true), day_one)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.points_earned, 30);
        assert_eq!(first.total_points, 30);
        assert_eq!(first.current_streak, 1);
        assert_eq!(first.avatar, Avatar::Crown);

        let second = db
            .record_answer(user.id, &answer("chemistry", "hard", false), day_one + Duration::days(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.points_earned, 0);
        assert_eq!(second.total_points, 30);
        assert_eq!(second.current_streak, 2);
        assert_eq!(second.avatar, Avatar::Learner);

        let stored = db.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.longest_streak, 2);
        assert_eq!(stored.avatar, Avatar::Learner);
        assert_eq!(stored.last_study_date, Some(day_one + Duration::days(1)));
    }
}
