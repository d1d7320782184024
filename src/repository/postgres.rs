// src/repository/postgres.rs

//! PostgreSQL repository implementations.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool, types::Json};

use crate::error::AppError;
use crate::models::{
    access::{DailyCounter, Limit},
    exam_session::{CategoryFilter, ExamSession, ExamStatus, NewExamSession},
    practice::{NewPracticeAttempt, PracticeAttempt},
    question::{Question, QuestionFilter, QuestionOption},
    streak::StreakRecord,
    user::User,
};
use crate::repository::{
    ExamSessionRepository, PassCodeRepository, PracticeRepository, QuestionRepository,
    StreakRepository, UsageRepository, UserRepository,
};

const QUESTION_COLUMNS: &str =
    "id, category, difficulty, content, options, correct_option_id, explanation, ai_explanation";

const SESSION_COLUMNS: &str = "id, user_id, total_questions, time_limit_minutes, passing_score, \
     category_filter, difficulty, question_ids, answers, flagged, status, score, \
     started_at, completed_at";

/// Filter predicate shared by every question query: `$1` categories, `$2` difficulty.
const QUESTION_FILTER: &str =
    "($1::TEXT[] IS NULL OR category = ANY($1)) AND ($2::TEXT IS NULL OR difficulty = $2)";

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn corrupt(what: &str, err: String) -> AppError {
    AppError::InternalServerError(format!("Corrupt {} row: {}", what, err))
}

fn to_u32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

#[derive(FromRow)]
struct UserRow {
    id: i64,
    username: String,
    is_premium: bool,
    premium_expires_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        User {
            id: r.id,
            username: r.username,
            is_premium: r.is_premium,
            premium_expires_at: r.premium_expires_at,
            created_at: r.created_at,
        }
    }
}

#[derive(FromRow)]
struct QuestionRow {
    id: i64,
    category: String,
    difficulty: String,
    content: String,
    options: Json<Vec<QuestionOption>>,
    correct_option_id: String,
    explanation: Option<String>,
    ai_explanation: Option<String>,
}

impl QuestionRow {
    fn into_question(self) -> Result<Question, AppError> {
        Ok(Question {
            id: self.id,
            category: self.category.parse().map_err(|e| corrupt("question", e))?,
            difficulty: self.difficulty.parse().map_err(|e| corrupt("question", e))?,
            content: self.content,
            options: self.options.0,
            correct_option_id: self.correct_option_id,
            explanation: self.explanation,
            ai_explanation: self.ai_explanation,
        })
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: i64,
    user_id: i64,
    total_questions: i32,
    time_limit_minutes: i32,
    passing_score: i32,
    category_filter: Json<CategoryFilter>,
    difficulty: Option<String>,
    question_ids: Vec<i64>,
    answers: Json<BTreeMap<i64, String>>,
    flagged: Vec<i64>,
    status: String,
    score: Option<i32>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl SessionRow {
    fn into_session(self) -> Result<ExamSession, AppError> {
        let difficulty = match self.difficulty {
            Some(d) => Some(d.parse().map_err(|e| corrupt("exam session", e))?),
            None => None,
        };
        let status: ExamStatus = self.status.parse().map_err(|e| corrupt("exam session", e))?;

        Ok(ExamSession {
            id: self.id,
            user_id: self.user_id,
            total_questions: to_u32(self.total_questions),
            time_limit_minutes: to_u32(self.time_limit_minutes),
            passing_score: to_u32(self.passing_score),
            category_filter: self.category_filter.0,
            difficulty,
            question_ids: self.question_ids,
            answers: self.answers.0,
            flagged: self.flagged.into_iter().collect(),
            status,
            score: self.score.map(to_u32),
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(FromRow)]
struct StreakRow {
    user_id: i64,
    current_streak: i32,
    longest_streak: i32,
    last_activity_date: Option<NaiveDate>,
    streak_repaired_at: Option<NaiveDate>,
}

#[derive(FromRow)]
struct AttemptRow {
    id: i64,
    user_id: i64,
    question_id: i64,
    category: String,
    selected_option_id: String,
    is_correct: bool,
    answered_at: DateTime<Utc>,
}

impl AttemptRow {
    fn into_attempt(self) -> Result<PracticeAttempt, AppError> {
        Ok(PracticeAttempt {
            id: self.id,
            user_id: self.user_id,
            question_id: self.question_id,
            category: self.category.parse().map_err(|e| corrupt("practice attempt", e))?,
            selected_option_id: self.selected_option_id,
            is_correct: self.is_correct,
            answered_at: self.answered_at,
        })
    }
}

fn filter_binds(filter: &QuestionFilter) -> (Option<Vec<String>>, Option<String>) {
    let categories = if filter.categories.is_empty() {
        None
    } else {
        Some(filter.categories.iter().map(|c| c.as_str().to_string()).collect())
    };
    (categories, filter.difficulty.map(|d| d.as_str().to_string()))
}

fn into_sessions(rows: Vec<SessionRow>) -> Result<Vec<ExamSession>, AppError> {
    rows.into_iter().map(SessionRow::into_session).collect()
}

#[async_trait]
impl UserRepository for PgStore {
    async fn find_user(&self, user_id: i64) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, is_premium, premium_expires_at, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }
}

#[async_trait]
impl QuestionRepository for PgStore {
    async fn count_questions(&self, filter: &QuestionFilter) -> Result<u64, AppError> {
        let (categories, difficulty) = filter_binds(filter);
        let sql = format!("SELECT COUNT(*) FROM questions WHERE {}", QUESTION_FILTER);

        let total: i64 = sqlx::query_scalar(&sql)
            .bind(categories)
            .bind(difficulty)
            .fetch_one(&self.pool)
            .await?;

        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn question_at_offset(
        &self,
        filter: &QuestionFilter,
        offset: u64,
    ) -> Result<Option<Question>, AppError> {
        let (categories, difficulty) = filter_binds(filter);
        let sql = format!(
            "SELECT {} FROM questions WHERE {} ORDER BY id OFFSET $3 LIMIT 1",
            QUESTION_COLUMNS, QUESTION_FILTER
        );
        let offset = i64::try_from(offset)
            .map_err(|_| AppError::BadRequest("Offset out of range".to_string()))?;

        let row = sqlx::query_as::<_, QuestionRow>(&sql)
            .bind(categories)
            .bind(difficulty)
            .bind(offset)
            .fetch_optional(&self.pool)
            .await?;

        row.map(QuestionRow::into_question).transpose()
    }

    async fn list_questions(&self, filter: &QuestionFilter) -> Result<Vec<Question>, AppError> {
        let (categories, difficulty) = filter_binds(filter);
        let sql = format!(
            "SELECT {} FROM questions WHERE {} ORDER BY id",
            QUESTION_COLUMNS, QUESTION_FILTER
        );

        let rows = sqlx::query_as::<_, QuestionRow>(&sql)
            .bind(categories)
            .bind(difficulty)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(QuestionRow::into_question).collect()
    }

    async fn find_question(&self, question_id: i64) -> Result<Option<Question>, AppError> {
        let sql = format!("SELECT {} FROM questions WHERE id = $1", QUESTION_COLUMNS);

        let row = sqlx::query_as::<_, QuestionRow>(&sql)
            .bind(question_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(QuestionRow::into_question).transpose()
    }

    async fn find_questions(&self, ids: &[i64]) -> Result<Vec<Question>, AppError> {
        let sql = format!("SELECT {} FROM questions WHERE id = ANY($1)", QUESTION_COLUMNS);

        let rows = sqlx::query_as::<_, QuestionRow>(&sql)
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(QuestionRow::into_question).collect()
    }
}

#[async_trait]
impl ExamSessionRepository for PgStore {
    async fn insert_session(&self, session: NewExamSession) -> Result<ExamSession, AppError> {
        let sql = format!(
            r#"
            INSERT INTO exam_sessions (
                user_id, total_questions, time_limit_minutes, passing_score,
                category_filter, difficulty, question_ids, started_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            SESSION_COLUMNS
        );

        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(session.user_id)
            .bind(session.total_questions as i32)
            .bind(session.time_limit_minutes as i32)
            .bind(session.passing_score as i32)
            .bind(Json(&session.category_filter))
            .bind(session.difficulty.map(|d| d.as_str()))
            .bind(session.question_ids)
            .bind(session.started_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to insert exam session: {:?}", e);
                AppError::from(e)
            })?;

        row.into_session()
    }

    async fn find_session(
        &self,
        session_id: i64,
        user_id: i64,
    ) -> Result<Option<ExamSession>, AppError> {
        let sql = format!(
            "SELECT {} FROM exam_sessions WHERE id = $1 AND user_id = $2",
            SESSION_COLUMNS
        );

        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(session_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(SessionRow::into_session).transpose()
    }

    async fn save_answer(
        &self,
        session_id: i64,
        user_id: i64,
        question_id: i64,
        option_id: &str,
    ) -> Result<Option<ExamSession>, AppError> {
        // `||` on JSONB replaces an existing key, so re-answering overwrites.
        let sql = format!(
            r#"
            UPDATE exam_sessions
            SET answers = answers || jsonb_build_object($3::BIGINT::TEXT, $4::TEXT)
            WHERE id = $1 AND user_id = $2
              AND status = 'IN_PROGRESS'
              AND $3 = ANY(question_ids)
            RETURNING {}
            "#,
            SESSION_COLUMNS
        );

        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(session_id)
            .bind(user_id)
            .bind(question_id)
            .bind(option_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(SessionRow::into_session).transpose()
    }

    async fn set_flag(
        &self,
        session_id: i64,
        user_id: i64,
        question_id: i64,
        flagged: bool,
    ) -> Result<Option<ExamSession>, AppError> {
        let sql = format!(
            r#"
            UPDATE exam_sessions
            SET flagged = CASE
                WHEN NOT $4 THEN array_remove(flagged, $3)
                WHEN $3 = ANY(flagged) THEN flagged
                ELSE array_append(flagged, $3)
            END
            WHERE id = $1 AND user_id = $2
              AND status = 'IN_PROGRESS'
              AND $3 = ANY(question_ids)
            RETURNING {}
            "#,
            SESSION_COLUMNS
        );

        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(session_id)
            .bind(user_id)
            .bind(question_id)
            .bind(flagged)
            .fetch_optional(&self.pool)
            .await?;

        row.map(SessionRow::into_session).transpose()
    }

    async fn complete_session(
        &self,
        session_id: i64,
        user_id: i64,
        graded: &BTreeMap<i64, String>,
        score: u32,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        // JSONB equality ignores key order, so the map compares by content.
        let result = sqlx::query(
            r#"
            UPDATE exam_sessions
            SET status = 'COMPLETED', score = $3, completed_at = $4
            WHERE id = $1 AND user_id = $2 AND status = 'IN_PROGRESS'
              AND answers = $5::jsonb
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .bind(score as i32)
        .bind(completed_at)
        .bind(Json(graded))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn abandon_session(&self, session_id: i64, user_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE exam_sessions
            SET status = 'ABANDONED'
            WHERE id = $1 AND user_id = $2 AND status = 'IN_PROGRESS'
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn latest_in_progress(&self, user_id: i64) -> Result<Option<ExamSession>, AppError> {
        let sql = format!(
            r#"
            SELECT {} FROM exam_sessions
            WHERE user_id = $1 AND status = 'IN_PROGRESS'
            ORDER BY started_at DESC, id DESC
            LIMIT 1
            "#,
            SESSION_COLUMNS
        );

        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(SessionRow::into_session).transpose()
    }

    async fn count_completed_between(
        &self,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u32, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM exam_sessions
            WHERE user_id = $1 AND status = 'COMPLETED'
              AND completed_at >= $2 AND completed_at < $3
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn list_sessions(&self, user_id: i64, limit: i64) -> Result<Vec<ExamSession>, AppError> {
        let sql = format!(
            r#"
            SELECT {} FROM exam_sessions
            WHERE user_id = $1
            ORDER BY started_at DESC, id DESC
            LIMIT $2
            "#,
            SESSION_COLUMNS
        );

        let rows = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        into_sessions(rows)
    }

    async fn list_completed(&self, user_id: i64) -> Result<Vec<ExamSession>, AppError> {
        let sql = format!(
            r#"
            SELECT {} FROM exam_sessions
            WHERE user_id = $1 AND status = 'COMPLETED'
            ORDER BY completed_at
            "#,
            SESSION_COLUMNS
        );

        let rows = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        into_sessions(rows)
    }
}

#[async_trait]
impl UsageRepository for PgStore {
    async fn usage_on(
        &self,
        user_id: i64,
        date: NaiveDate,
        counter: DailyCounter,
    ) -> Result<u32, AppError> {
        let count: Option<i32> = sqlx::query_scalar(
            "SELECT count FROM daily_usage WHERE user_id = $1 AND usage_date = $2 AND counter = $3",
        )
        .bind(user_id)
        .bind(date)
        .bind(counter.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(count.map(to_u32).unwrap_or(0))
    }

    async fn try_increment(
        &self,
        user_id: i64,
        date: NaiveDate,
        counter: DailyCounter,
        limit: Limit,
    ) -> Result<Option<u32>, AppError> {
        // The conflict branch only fires while the stored count is below the cap,
        // so concurrent requests cannot push the counter past it.
        let count: Option<i32> = match limit {
            Limit::Bounded(0) => return Ok(None),
            Limit::Unlimited => {
                sqlx::query_scalar(
                    r#"
                    INSERT INTO daily_usage (user_id, usage_date, counter, count)
                    VALUES ($1, $2, $3, 1)
                    ON CONFLICT (user_id, usage_date, counter)
                    DO UPDATE SET count = daily_usage.count + 1
                    RETURNING count
                    "#,
                )
                .bind(user_id)
                .bind(date)
                .bind(counter.as_str())
                .fetch_optional(&self.pool)
                .await?
            }
            Limit::Bounded(max) => {
                sqlx::query_scalar(
                    r#"
                    INSERT INTO daily_usage (user_id, usage_date, counter, count)
                    VALUES ($1, $2, $3, 1)
                    ON CONFLICT (user_id, usage_date, counter)
                    DO UPDATE SET count = daily_usage.count + 1
                    WHERE daily_usage.count < $4
                    RETURNING count
                    "#,
                )
                .bind(user_id)
                .bind(date)
                .bind(counter.as_str())
                .bind(i32::try_from(max).unwrap_or(i32::MAX))
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(count.map(to_u32))
    }

    async fn release(
        &self,
        user_id: i64,
        date: NaiveDate,
        counter: DailyCounter,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE daily_usage
            SET count = count - 1
            WHERE user_id = $1 AND usage_date = $2 AND counter = $3 AND count > 0
            "#,
        )
        .bind(user_id)
        .bind(date)
        .bind(counter.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl StreakRepository for PgStore {
    async fn find_streak(&self, user_id: i64) -> Result<Option<StreakRecord>, AppError> {
        let row = sqlx::query_as::<_, StreakRow>(
            r#"
            SELECT user_id, current_streak, longest_streak, last_activity_date, streak_repaired_at
            FROM streaks
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| StreakRecord {
            user_id: r.user_id,
            current_streak: to_u32(r.current_streak),
            longest_streak: to_u32(r.longest_streak),
            last_activity_date: r.last_activity_date,
            streak_repaired_at: r.streak_repaired_at,
        }))
    }

    async fn replace_streak(
        &self,
        previous: Option<&StreakRecord>,
        next: &StreakRecord,
    ) -> Result<bool, AppError> {
        let result = match previous {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO streaks (user_id, current_streak, longest_streak, last_activity_date, streak_repaired_at)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (user_id) DO NOTHING
                    "#,
                )
                .bind(next.user_id)
                .bind(next.current_streak as i32)
                .bind(next.longest_streak as i32)
                .bind(next.last_activity_date)
                .bind(next.streak_repaired_at)
                .execute(&self.pool)
                .await?
            }
            Some(prev) => {
                sqlx::query(
                    r#"
                    UPDATE streaks
                    SET current_streak = $2, longest_streak = $3,
                        last_activity_date = $4, streak_repaired_at = $5
                    WHERE user_id = $1
                      AND current_streak = $6
                      AND longest_streak = $7
                      AND last_activity_date IS NOT DISTINCT FROM $8
                      AND streak_repaired_at IS NOT DISTINCT FROM $9
                    "#,
                )
                .bind(next.user_id)
                .bind(next.current_streak as i32)
                .bind(next.longest_streak as i32)
                .bind(next.last_activity_date)
                .bind(next.streak_repaired_at)
                .bind(prev.current_streak as i32)
                .bind(prev.longest_streak as i32)
                .bind(prev.last_activity_date)
                .bind(prev.streak_repaired_at)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl PracticeRepository for PgStore {
    async fn record_attempt(&self, attempt: NewPracticeAttempt) -> Result<PracticeAttempt, AppError> {
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            INSERT INTO practice_attempts
                (user_id, question_id, category, selected_option_id, is_correct, answered_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, question_id, category, selected_option_id, is_correct, answered_at
            "#,
        )
        .bind(attempt.user_id)
        .bind(attempt.question_id)
        .bind(attempt.category.as_str())
        .bind(&attempt.selected_option_id)
        .bind(attempt.is_correct)
        .bind(attempt.answered_at)
        .fetch_one(&self.pool)
        .await?;

        row.into_attempt()
    }

    async fn list_attempts(
        &self,
        user_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PracticeAttempt>, AppError> {
        let rows = sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT id, user_id, question_id, category, selected_option_id, is_correct, answered_at
            FROM practice_attempts
            WHERE user_id = $1 AND ($2::TIMESTAMPTZ IS NULL OR answered_at >= $2)
            ORDER BY answered_at
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AttemptRow::into_attempt).collect()
    }
}

#[async_trait]
impl PassCodeRepository for PgStore {
    async fn redeem_pass_code(
        &self,
        code: &str,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        let mut tx = self.pool.begin().await?;

        let duration_days: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE pass_codes
            SET redeemed_by = $2, redeemed_at = $3
            WHERE code = $1 AND redeemed_by IS NULL
            RETURNING duration_days
            "#,
        )
        .bind(code)
        .bind(user_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(days) = duration_days else {
            return Ok(None);
        };

        // Remaining time on an active pass is kept, an expired one restarts from now.
        let expires_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET premium_expires_at = GREATEST(
                    CASE WHEN is_premium THEN COALESCE(premium_expires_at, $2) ELSE $2 END,
                    $2
                ) + make_interval(days => $3),
                is_premium = TRUE
            WHERE id = $1
            RETURNING premium_expires_at
            "#,
        )
        .bind(user_id)
        .bind(now)
        .bind(days)
        .fetch_optional(&mut *tx)
        .await?
        .flatten();

        let expires_at =
            expires_at.ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        tx.commit().await?;

        Ok(Some(expires_at))
    }
}
