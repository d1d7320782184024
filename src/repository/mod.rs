// src/repository/mod.rs

//! Persistence interfaces.
//!
//! Services depend only on these traits. `PgStore` backs the running service,
//! `MemoryStore` backs tests and database-less runs. Every method that guards an
//! invariant does so in a single storage-level step.

pub mod memory;
pub mod postgres;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::AppError;
use crate::models::{
    access::{DailyCounter, Limit},
    exam_session::{ExamSession, NewExamSession},
    practice::{NewPracticeAttempt, PracticeAttempt},
    question::{Question, QuestionFilter},
    streak::StreakRecord,
    user::User,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user(&self, user_id: i64) -> Result<Option<User>, AppError>;
}

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Number of questions matching the filter.
    async fn count_questions(&self, filter: &QuestionFilter) -> Result<u64, AppError>;

    /// The matching question at `offset` in a stable (id) order.
    async fn question_at_offset(
        &self,
        filter: &QuestionFilter,
        offset: u64,
    ) -> Result<Option<Question>, AppError>;

    /// All matching questions. Only used when the match count is small.
    async fn list_questions(&self, filter: &QuestionFilter) -> Result<Vec<Question>, AppError>;

    async fn find_question(&self, question_id: i64) -> Result<Option<Question>, AppError>;

    async fn find_questions(&self, ids: &[i64]) -> Result<Vec<Question>, AppError>;
}

#[async_trait]
pub trait ExamSessionRepository: Send + Sync {
    async fn insert_session(&self, session: NewExamSession) -> Result<ExamSession, AppError>;

    /// Lookup scoped to the owner; a foreign session is indistinguishable from a missing one.
    async fn find_session(
        &self,
        session_id: i64,
        user_id: i64,
    ) -> Result<Option<ExamSession>, AppError>;

    /// Upserts one answer while the session is IN_PROGRESS and owns the question.
    /// Returns `None` when the guard did not hold.
    async fn save_answer(
        &self,
        session_id: i64,
        user_id: i64,
        question_id: i64,
        option_id: &str,
    ) -> Result<Option<ExamSession>, AppError>;

    /// Adds or removes a flag while the session is IN_PROGRESS. Same guard as `save_answer`.
    async fn set_flag(
        &self,
        session_id: i64,
        user_id: i64,
        question_id: i64,
        flagged: bool,
    ) -> Result<Option<ExamSession>, AppError>;

    /// IN_PROGRESS -> COMPLETED if and only if the session is still IN_PROGRESS and its
    /// stored answers are exactly `graded`, the set the score was computed from.
    async fn complete_session(
        &self,
        session_id: i64,
        user_id: i64,
        graded: &BTreeMap<i64, String>,
        score: u32,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// IN_PROGRESS -> ABANDONED if and only if the session is still IN_PROGRESS.
    async fn abandon_session(&self, session_id: i64, user_id: i64) -> Result<bool, AppError>;

    async fn latest_in_progress(&self, user_id: i64) -> Result<Option<ExamSession>, AppError>;

    /// COMPLETED sessions with `from <= completed_at < to`.
    async fn count_completed_between(
        &self,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u32, AppError>;

    /// Newest first.
    async fn list_sessions(&self, user_id: i64, limit: i64) -> Result<Vec<ExamSession>, AppError>;

    async fn list_completed(&self, user_id: i64) -> Result<Vec<ExamSession>, AppError>;
}

#[async_trait]
pub trait UsageRepository: Send + Sync {
    async fn usage_on(
        &self,
        user_id: i64,
        date: NaiveDate,
        counter: DailyCounter,
    ) -> Result<u32, AppError>;

    /// Atomic upsert-increment that only succeeds while the counter is below `limit`.
    /// Returns the new count, or `None` when the quota was already used up.
    async fn try_increment(
        &self,
        user_id: i64,
        date: NaiveDate,
        counter: DailyCounter,
        limit: Limit,
    ) -> Result<Option<u32>, AppError>;

    /// Gives back one unit taken by `try_increment`. Never goes below zero.
    async fn release(
        &self,
        user_id: i64,
        date: NaiveDate,
        counter: DailyCounter,
    ) -> Result<(), AppError>;
}

#[async_trait]
pub trait StreakRepository: Send + Sync {
    async fn find_streak(&self, user_id: i64) -> Result<Option<StreakRecord>, AppError>;

    /// Writes `next` only if the stored row still equals `previous` (`None`: no row yet).
    /// Returns `false` when another writer got there first.
    async fn replace_streak(
        &self,
        previous: Option<&StreakRecord>,
        next: &StreakRecord,
    ) -> Result<bool, AppError>;
}

#[async_trait]
pub trait PracticeRepository: Send + Sync {
    async fn record_attempt(&self, attempt: NewPracticeAttempt) -> Result<PracticeAttempt, AppError>;

    /// Attempts answered at or after `since`, or all of them.
    async fn list_attempts(
        &self,
        user_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PracticeAttempt>, AppError>;
}

#[async_trait]
pub trait PassCodeRepository: Send + Sync {
    /// Claims an unused code for `user_id` and extends the user's Season Pass in one step.
    /// Returns the new expiry, or `None` when the code is unknown or already used.
    async fn redeem_pass_code(
        &self,
        code: &str,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, AppError>;
}

/// Everything a backing store has to provide.
pub trait Store:
    UserRepository
    + QuestionRepository
    + ExamSessionRepository
    + UsageRepository
    + StreakRepository
    + PracticeRepository
    + PassCodeRepository
    + 'static
{
}

impl<T> Store for T where
    T: UserRepository
        + QuestionRepository
        + ExamSessionRepository
        + UsageRepository
        + StreakRepository
        + PracticeRepository
        + PassCodeRepository
        + 'static
{
}
