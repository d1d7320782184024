// src/repository/memory.rs

//! In-memory repository implementations.
//!
//! One `tokio::sync::Mutex` guards all tables, so every guarded update runs as a
//! single critical section, matching the single-statement updates of `PgStore`.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::models::{
    access::{DailyCounter, Limit},
    exam_session::{ExamSession, ExamStatus, NewExamSession},
    practice::{NewPracticeAttempt, PracticeAttempt},
    question::{Question, QuestionFilter},
    streak::StreakRecord,
    user::{User, extended_expiry},
};
use crate::repository::{
    ExamSessionRepository, PassCodeRepository, PracticeRepository, QuestionRepository,
    StreakRepository, UsageRepository, UserRepository,
};

#[derive(Debug, Clone)]
struct PassCode {
    duration_days: i64,
    redeemed_by: Option<i64>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<i64, User>,
    /// Kept sorted by id so offsets match `ORDER BY id`.
    questions: Vec<Question>,
    sessions: Vec<ExamSession>,
    usage: HashMap<(i64, NaiveDate, DailyCounter), u32>,
    streaks: HashMap<i64, StreakRecord>,
    attempts: Vec<PracticeAttempt>,
    pass_codes: HashMap<String, PassCode>,
    next_session_id: i64,
    next_attempt_id: i64,
}

impl Tables {
    fn session_mut(&mut self, session_id: i64, user_id: i64) -> Option<&mut ExamSession> {
        self.sessions
            .iter_mut()
            .find(|s| s.id == session_id && s.user_id == user_id)
    }

    fn matching(&self, filter: &QuestionFilter) -> impl Iterator<Item = &Question> {
        self.questions.iter().filter(move |q| filter.matches(q))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.tables.lock().await.users.insert(user.id, user);
    }

    pub async fn insert_question(&self, question: Question) {
        let mut tables = self.tables.lock().await;
        tables.questions.retain(|q| q.id != question.id);
        tables.questions.push(question);
        tables.questions.sort_by_key(|q| q.id);
    }

    pub async fn insert_pass_code(&self, code: &str, duration_days: i64) {
        self.tables.lock().await.pass_codes.insert(
            code.to_string(),
            PassCode {
                duration_days,
                redeemed_by: None,
            },
        );
    }

    /// Overwrites a stored session, e.g. to move its start time in tests.
    pub async fn replace_session(&self, session: ExamSession) {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.sessions.iter_mut().find(|s| s.id == session.id) {
            *existing = session;
        }
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_user(&self, user_id: i64) -> Result<Option<User>, AppError> {
        Ok(self.tables.lock().await.users.get(&user_id).cloned())
    }
}

#[async_trait]
impl QuestionRepository for MemoryStore {
    async fn count_questions(&self, filter: &QuestionFilter) -> Result<u64, AppError> {
        Ok(self.tables.lock().await.matching(filter).count() as u64)
    }

    async fn question_at_offset(
        &self,
        filter: &QuestionFilter,
        offset: u64,
    ) -> Result<Option<Question>, AppError> {
        let tables = self.tables.lock().await;
        let offset = usize::try_from(offset)
            .map_err(|_| AppError::BadRequest("Offset out of range".to_string()))?;
        Ok(tables.matching(filter).nth(offset).cloned())
    }

    async fn list_questions(&self, filter: &QuestionFilter) -> Result<Vec<Question>, AppError> {
        Ok(self.tables.lock().await.matching(filter).cloned().collect())
    }

    async fn find_question(&self, question_id: i64) -> Result<Option<Question>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables.questions.iter().find(|q| q.id == question_id).cloned())
    }

    async fn find_questions(&self, ids: &[i64]) -> Result<Vec<Question>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .questions
            .iter()
            .filter(|q| ids.contains(&q.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ExamSessionRepository for MemoryStore {
    async fn insert_session(&self, session: NewExamSession) -> Result<ExamSession, AppError> {
        let mut tables = self.tables.lock().await;
        tables.next_session_id += 1;

        let stored = ExamSession {
            id: tables.next_session_id,
            user_id: session.user_id,
            total_questions: session.total_questions,
            time_limit_minutes: session.time_limit_minutes,
            passing_score: session.passing_score,
            category_filter: session.category_filter,
            difficulty: session.difficulty,
            question_ids: session.question_ids,
            answers: Default::default(),
            flagged: Default::default(),
            status: ExamStatus::InProgress,
            score: None,
            started_at: session.started_at,
            completed_at: None,
        };
        tables.sessions.push(stored.clone());

        Ok(stored)
    }

    async fn find_session(
        &self,
        session_id: i64,
        user_id: i64,
    ) -> Result<Option<ExamSession>, AppError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.session_mut(session_id, user_id).map(|s| s.clone()))
    }

    async fn save_answer(
        &self,
        session_id: i64,
        user_id: i64,
        question_id: i64,
        option_id: &str,
    ) -> Result<Option<ExamSession>, AppError> {
        let mut tables = self.tables.lock().await;
        let Some(session) = tables.session_mut(session_id, user_id) else {
            return Ok(None);
        };
        if session.status != ExamStatus::InProgress || !session.contains_question(question_id) {
            return Ok(None);
        }

        session.answers.insert(question_id, option_id.to_string());
        Ok(Some(session.clone()))
    }

    async fn set_flag(
        &self,
        session_id: i64,
        user_id: i64,
        question_id: i64,
        flagged: bool,
    ) -> Result<Option<ExamSession>, AppError> {
        let mut tables = self.tables.lock().await;
        let Some(session) = tables.session_mut(session_id, user_id) else {
            return Ok(None);
        };
        if session.status != ExamStatus::InProgress || !session.contains_question(question_id) {
            return Ok(None);
        }

        if flagged {
            session.flagged.insert(question_id);
        } else {
            session.flagged.remove(&question_id);
        }
        Ok(Some(session.clone()))
    }

    async fn complete_session(
        &self,
        session_id: i64,
        user_id: i64,
        graded: &BTreeMap<i64, String>,
        score: u32,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().await;
        match tables.session_mut(session_id, user_id) {
            Some(session)
                if session.status == ExamStatus::InProgress && session.answers == *graded =>
            {
                session.status = ExamStatus::Completed;
                session.score = Some(score);
                session.completed_at = Some(completed_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn abandon_session(&self, session_id: i64, user_id: i64) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().await;
        match tables.session_mut(session_id, user_id) {
            Some(session) if session.status == ExamStatus::InProgress => {
                session.status = ExamStatus::Abandoned;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn latest_in_progress(&self, user_id: i64) -> Result<Option<ExamSession>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.status == ExamStatus::InProgress)
            .max_by_key(|s| (s.started_at, s.id))
            .cloned())
    }

    async fn count_completed_between(
        &self,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u32, AppError> {
        let tables = self.tables.lock().await;
        let count = tables
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.status == ExamStatus::Completed)
            .filter(|s| s.completed_at.is_some_and(|at| at >= from && at < to))
            .count();
        Ok(count as u32)
    }

    async fn list_sessions(&self, user_id: i64, limit: i64) -> Result<Vec<ExamSession>, AppError> {
        let tables = self.tables.lock().await;
        let mut sessions: Vec<ExamSession> = tables
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| (b.started_at, b.id).cmp(&(a.started_at, a.id)));
        sessions.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(sessions)
    }

    async fn list_completed(&self, user_id: i64) -> Result<Vec<ExamSession>, AppError> {
        let tables = self.tables.lock().await;
        let mut sessions: Vec<ExamSession> = tables
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.status == ExamStatus::Completed)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.completed_at);
        Ok(sessions)
    }
}

#[async_trait]
impl UsageRepository for MemoryStore {
    async fn usage_on(
        &self,
        user_id: i64,
        date: NaiveDate,
        counter: DailyCounter,
    ) -> Result<u32, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables.usage.get(&(user_id, date, counter)).copied().unwrap_or(0))
    }

    async fn try_increment(
        &self,
        user_id: i64,
        date: NaiveDate,
        counter: DailyCounter,
        limit: Limit,
    ) -> Result<Option<u32>, AppError> {
        let mut tables = self.tables.lock().await;
        let count = tables.usage.entry((user_id, date, counter)).or_insert(0);
        if limit.is_reached_by(*count) {
            return Ok(None);
        }
        *count += 1;
        Ok(Some(*count))
    }

    async fn release(
        &self,
        user_id: i64,
        date: NaiveDate,
        counter: DailyCounter,
    ) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        if let Some(count) = tables.usage.get_mut(&(user_id, date, counter)) {
            *count = count.saturating_sub(1);
        }
        Ok(())
    }
}

#[async_trait]
impl StreakRepository for MemoryStore {
    async fn find_streak(&self, user_id: i64) -> Result<Option<StreakRecord>, AppError> {
        Ok(self.tables.lock().await.streaks.get(&user_id).cloned())
    }

    async fn replace_streak(
        &self,
        previous: Option<&StreakRecord>,
        next: &StreakRecord,
    ) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().await;
        if tables.streaks.get(&next.user_id) != previous {
            return Ok(false);
        }
        tables.streaks.insert(next.user_id, next.clone());
        Ok(true)
    }
}

#[async_trait]
impl PracticeRepository for MemoryStore {
    async fn record_attempt(&self, attempt: NewPracticeAttempt) -> Result<PracticeAttempt, AppError> {
        let mut tables = self.tables.lock().await;
        tables.next_attempt_id += 1;

        let stored = PracticeAttempt {
            id: tables.next_attempt_id,
            user_id: attempt.user_id,
            question_id: attempt.question_id,
            category: attempt.category,
            selected_option_id: attempt.selected_option_id,
            is_correct: attempt.is_correct,
            answered_at: attempt.answered_at,
        };
        tables.attempts.push(stored.clone());

        Ok(stored)
    }

    async fn list_attempts(
        &self,
        user_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PracticeAttempt>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id)
            .filter(|a| since.is_none_or(|since| a.answered_at >= since))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PassCodeRepository for MemoryStore {
    async fn redeem_pass_code(
        &self,
        code: &str,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        let mut tables = self.tables.lock().await;

        if !tables.users.contains_key(&user_id) {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        let days = match tables.pass_codes.get_mut(code) {
            Some(pass) if pass.redeemed_by.is_none() => {
                pass.redeemed_by = Some(user_id);
                pass.duration_days
            }
            _ => return Ok(None),
        };

        let Some(user) = tables.users.get_mut(&user_id) else {
            return Err(AppError::NotFound("User not found".to_string()));
        };
        let current = if user.is_premium { user.premium_expires_at } else { None };
        let expires_at = extended_expiry(current, now, days);
        user.is_premium = true;
        user.premium_expires_at = Some(expires_at);

        Ok(Some(expires_at))
    }
}
