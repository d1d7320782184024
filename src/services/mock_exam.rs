// src/services/mock_exam.rs

//! Timed mock exam sessions.
//!
//! A session moves IN_PROGRESS -> COMPLETED | ABANDONED exactly once. Time is never
//! ticked on the server: remaining time is derived from the persisted `started_at`,
//! and an overrun session is reaped lazily by `check_in_progress` or `submit`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use validator::Validate;

use crate::{
    error::{AppError, QuotaDenial},
    models::{
        access::{AccessLimits, Limit, QuotaKind, exceeds_limit},
        exam_session::{
            AnswerOutcome, CreateMockExamRequest, ExamHistoryEntry, ExamResults, ExamSession,
            ExamSessionView, ExamStatus, NewExamSession, ProgressUpdate, QuestionResult,
            SaveAnswerRequest, ToggleFlagRequest,
        },
        question::{PublicQuestion, Question},
    },
    repository::{ExamSessionRepository, QuestionRepository},
    services::{access::AccessControl, calendar::local_month_bounds, sampler::QuestionSampler},
};

/// Grade-and-complete rounds before a submit gives up on a session whose answers keep changing.
const MAX_SUBMIT_ATTEMPTS: usize = 3;

/// Integer percentage, rounded half up.
pub fn score_percentage(correct: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    ((f64::from(correct) / f64::from(total)) * 100.0).round() as u32
}

/// Tally of a session against its question set.
#[derive(Debug)]
struct Grade {
    correct: u32,
    incorrect: u32,
    unanswered: u32,
    results: Vec<QuestionResult>,
}

/// Grades every question of the fixed order. The latest stored answer is the only one
/// that counts; a question missing from the bank can still be unanswered or incorrect.
fn grade(session: &ExamSession, questions: &HashMap<i64, Question>) -> Grade {
    let mut grade = Grade {
        correct: 0,
        incorrect: 0,
        unanswered: 0,
        results: Vec::with_capacity(session.question_ids.len()),
    };

    for question_id in &session.question_ids {
        let selected = session.answers.get(question_id).cloned();
        let question = questions.get(question_id);

        let outcome = match (&selected, question) {
            (None, _) => AnswerOutcome::Unanswered,
            (Some(answer), Some(q)) if q.is_correct(answer) => AnswerOutcome::Correct,
            (Some(_), _) => AnswerOutcome::Incorrect,
        };
        match outcome {
            AnswerOutcome::Correct => grade.correct += 1,
            AnswerOutcome::Incorrect => grade.incorrect += 1,
            AnswerOutcome::Unanswered => grade.unanswered += 1,
        }

        grade.results.push(QuestionResult {
            question_id: *question_id,
            category: question.map(|q| q.category),
            content: question.map(|q| q.content.clone()),
            options: question.map(|q| q.options.clone()).unwrap_or_default(),
            selected_option_id: selected,
            correct_option_id: question.map(|q| q.correct_option_id.clone()),
            explanation: question.and_then(|q| q.best_explanation().map(str::to_string)),
            outcome,
            flagged: session.flagged.contains(question_id),
        });
    }

    grade
}

/// Tier limits for mock exams plus what was used this month.
#[derive(Debug, Serialize)]
pub struct MockExamLimits {
    pub limits: AccessLimits,
    pub exams_used_this_month: u32,
    /// `None` when unlimited.
    pub exams_remaining_this_month: Option<u32>,
}

pub struct MockExamEngine {
    sessions: Arc<dyn ExamSessionRepository>,
    questions: Arc<dyn QuestionRepository>,
    sampler: Arc<QuestionSampler>,
    access: Arc<AccessControl>,
}

impl MockExamEngine {
    pub fn new(
        sessions: Arc<dyn ExamSessionRepository>,
        questions: Arc<dyn QuestionRepository>,
        sampler: Arc<QuestionSampler>,
        access: Arc<AccessControl>,
    ) -> Self {
        Self {
            sessions,
            questions,
            sampler,
            access,
        }
    }

    /// Validates the configuration, enforces tier quotas, samples the questions and
    /// persists a new IN_PROGRESS session. Nothing is written when any check fails.
    pub async fn create_session(
        &self,
        user_id: i64,
        req: CreateMockExamRequest,
        now: DateTime<Utc>,
    ) -> Result<ExamSessionView, AppError> {
        req.validate()?;

        let user = self.access.load_user(user_id).await?;
        let limits = self.access.limits(&user, now);

        if !limits.mock_exam_questions_limit.permits(req.question_count) {
            return Err(AppError::QuotaExceeded(QuotaDenial {
                kind: QuotaKind::MockExamQuestions,
                limit: limits.mock_exam_questions_limit,
                used: req.question_count,
            }));
        }

        let used = self.completed_this_month(user_id, now).await?;
        if exceeds_limit(used, limits.mock_exams_per_month) {
            return Err(AppError::QuotaExceeded(QuotaDenial {
                kind: QuotaKind::MockExamsPerMonth,
                limit: limits.mock_exams_per_month,
                used,
            }));
        }

        let category_filter = req.categories.normalized();
        let filter = category_filter.to_question_filter(req.difficulty);
        let requested = req.question_count as usize;

        let questions = self.sampler.sample(requested, &filter).await?;
        if questions.len() < requested {
            return Err(AppError::InsufficientContent(format!(
                "Only {} questions match the selected filters, {} requested",
                questions.len(),
                requested
            )));
        }

        let session = self
            .sessions
            .insert_session(NewExamSession {
                user_id,
                total_questions: req.question_count,
                time_limit_minutes: req.time_limit_minutes,
                passing_score: req.passing_score,
                category_filter,
                difficulty: req.difficulty,
                question_ids: questions.iter().map(|q| q.id).collect(),
                started_at: now,
            })
            .await?;

        tracing::info!(
            user_id,
            session_id = session.id,
            questions = session.total_questions,
            minutes = session.time_limit_minutes,
            "Mock exam started"
        );

        Ok(build_view(&session, questions, now))
    }

    /// Current state with answer-stripped questions and remaining time.
    pub async fn get_state(
        &self,
        user_id: i64,
        session_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ExamSessionView, AppError> {
        let session = self.load(user_id, session_id).await?;
        let questions = self.questions.find_questions(&session.question_ids).await?;
        Ok(build_view(&session, questions, now))
    }

    /// Upserts the answer for one question. Late answers are rejected.
    pub async fn save_answer(
        &self,
        user_id: i64,
        session_id: i64,
        req: SaveAnswerRequest,
        now: DateTime<Utc>,
    ) -> Result<ProgressUpdate, AppError> {
        req.validate()?;

        let session = self.load(user_id, session_id).await?;
        ensure_writable(&session, req.question_id, now)?;

        let question = self
            .questions
            .find_question(req.question_id)
            .await?
            .ok_or(AppError::BadRequest("Question is no longer available".to_string()))?;
        if !question.has_option(&req.option_id) {
            return Err(AppError::BadRequest(format!(
                "Option '{}' does not belong to question {}",
                req.option_id, question.id
            )));
        }

        let updated = self
            .sessions
            .save_answer(session_id, user_id, req.question_id, &req.option_id)
            .await?
            .ok_or_else(|| AppError::Conflict("Exam session is no longer in progress".to_string()))?;

        Ok(ProgressUpdate {
            session_id,
            question_id: req.question_id,
            progress: updated.progress(),
            flagged: updated.flagged.contains(&req.question_id),
        })
    }

    /// Sets the flag state of one question. Setting the current state again is a no-op.
    pub async fn toggle_flag(
        &self,
        user_id: i64,
        session_id: i64,
        req: ToggleFlagRequest,
        now: DateTime<Utc>,
    ) -> Result<ProgressUpdate, AppError> {
        let session = self.load(user_id, session_id).await?;
        ensure_writable(&session, req.question_id, now)?;

        let updated = self
            .sessions
            .set_flag(session_id, user_id, req.question_id, req.flagged)
            .await?
            .ok_or_else(|| AppError::Conflict("Exam session is no longer in progress".to_string()))?;

        Ok(ProgressUpdate {
            session_id,
            question_id: req.question_id,
            progress: updated.progress(),
            flagged: updated.flagged.contains(&req.question_id),
        })
    }

    /// Scores the stored answers and finalizes the session.
    ///
    /// The IN_PROGRESS -> COMPLETED transition is conditional on the status and on the
    /// exact answers that were graded, so a retried or concurrent submit gets a conflict
    /// and an answer saved mid-grading is regraded instead of silently left out. A
    /// session past its time limit is abandoned instead.
    pub async fn submit(
        &self,
        user_id: i64,
        session_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ExamResults, AppError> {
        let mut session = self.load(user_id, session_id).await?;
        ensure_in_progress(&session)?;
        if session.is_time_expired(now) {
            self.reap_expired(&session, now).await?;
            return Err(AppError::Conflict("Exam time limit has been reached".to_string()));
        }

        let questions = self.question_map(&session).await?;

        for _ in 0..MAX_SUBMIT_ATTEMPTS {
            let grade = grade(&session, &questions);
            let score = score_percentage(grade.correct, session.total_questions);

            let transitioned = self
                .sessions
                .complete_session(session_id, user_id, &session.answers, score, now)
                .await?;
            if transitioned {
                session.status = ExamStatus::Completed;
                session.score = Some(score);
                session.completed_at = Some(now);

                tracing::info!(
                    user_id,
                    session_id,
                    score,
                    passed = score >= session.passing_score,
                    "Mock exam submitted"
                );
                return Ok(build_results(&session, score, grade));
            }

            // Either finalized elsewhere or the answers moved under us.
            session = self.load(user_id, session_id).await?;
            ensure_in_progress(&session)?;
        }

        tracing::warn!(user_id, session_id, "Mock exam submit kept racing answer saves");
        Err(AppError::Conflict(
            "Exam answers are still changing, submit again".to_string(),
        ))
    }

    /// Breakdown of a completed session, recomputed from the stored answers.
    pub async fn get_results(&self, user_id: i64, session_id: i64) -> Result<ExamResults, AppError> {
        let session = self.load(user_id, session_id).await?;
        if session.status != ExamStatus::Completed {
            return Err(AppError::Conflict(
                "Results are available once the exam is submitted".to_string(),
            ));
        }

        let questions = self.question_map(&session).await?;
        let grade = grade(&session, &questions);
        let score = session
            .score
            .unwrap_or_else(|| score_percentage(grade.correct, session.total_questions));

        Ok(build_results(&session, score, grade))
    }

    pub async fn abandon(&self, user_id: i64, session_id: i64) -> Result<ExamHistoryEntry, AppError> {
        let mut session = self.load(user_id, session_id).await?;
        ensure_in_progress(&session)?;

        if !self.sessions.abandon_session(session_id, user_id).await? {
            return Err(AppError::Conflict("Exam session was already finalized".to_string()));
        }
        session.status = ExamStatus::Abandoned;

        tracing::info!(user_id, session_id, "Mock exam abandoned");
        Ok(ExamHistoryEntry::from(session))
    }

    /// The newest live session, if any. An overrun session is abandoned here as a side
    /// effect.
    pub async fn check_in_progress(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<ExamSessionView>, AppError> {
        let Some(session) = self.sessions.latest_in_progress(user_id).await? else {
            return Ok(None);
        };

        if session.is_time_expired(now) {
            self.reap_expired(&session, now).await?;
            return Ok(None);
        }

        let questions = self.questions.find_questions(&session.question_ids).await?;
        Ok(Some(build_view(&session, questions, now)))
    }

    pub async fn limits(&self, user_id: i64, now: DateTime<Utc>) -> Result<MockExamLimits, AppError> {
        let limits = self.access.limits_of(user_id, now).await?;
        let used = self.completed_this_month(user_id, now).await?;

        let remaining = match limits.mock_exams_per_month {
            Limit::Unlimited => None,
            Limit::Bounded(max) => Some(max.saturating_sub(used)),
        };

        Ok(MockExamLimits {
            limits,
            exams_used_this_month: used,
            exams_remaining_this_month: remaining,
        })
    }

    pub async fn history(&self, user_id: i64, limit: i64) -> Result<Vec<ExamHistoryEntry>, AppError> {
        let sessions = self.sessions.list_sessions(user_id, limit).await?;
        Ok(sessions.into_iter().map(ExamHistoryEntry::from).collect())
    }

    async fn reap_expired(&self, session: &ExamSession, now: DateTime<Utc>) -> Result<(), AppError> {
        if self.sessions.abandon_session(session.id, session.user_id).await? {
            tracing::info!(
                user_id = session.user_id,
                session_id = session.id,
                elapsed = session.elapsed_seconds(now),
                "Expired mock exam abandoned"
            );
        }
        Ok(())
    }

    async fn load(&self, user_id: i64, session_id: i64) -> Result<ExamSession, AppError> {
        self.sessions
            .find_session(session_id, user_id)
            .await?
            .ok_or(AppError::NotFound("Exam session not found".to_string()))
    }

    async fn question_map(&self, session: &ExamSession) -> Result<HashMap<i64, Question>, AppError> {
        let questions = self.questions.find_questions(&session.question_ids).await?;
        Ok(questions.into_iter().map(|q| (q.id, q)).collect())
    }

    async fn completed_this_month(&self, user_id: i64, now: DateTime<Utc>) -> Result<u32, AppError> {
        let (from, to) = local_month_bounds(now);
        self.sessions.count_completed_between(user_id, from, to).await
    }
}

fn ensure_in_progress(session: &ExamSession) -> Result<(), AppError> {
    match session.status {
        ExamStatus::InProgress => Ok(()),
        ExamStatus::Completed => Err(AppError::Conflict(
            "Exam session has already been submitted".to_string(),
        )),
        ExamStatus::Abandoned => Err(AppError::Conflict(
            "Exam session has been abandoned".to_string(),
        )),
    }
}

/// Preconditions shared by answer and flag mutations.
fn ensure_writable(session: &ExamSession, question_id: i64, now: DateTime<Utc>) -> Result<(), AppError> {
    ensure_in_progress(session)?;
    if session.is_time_expired(now) {
        return Err(AppError::Conflict("Exam time limit has been reached".to_string()));
    }
    if !session.contains_question(question_id) {
        return Err(AppError::BadRequest(
            "Question is not part of this exam session".to_string(),
        ));
    }
    Ok(())
}

fn build_view(session: &ExamSession, questions: Vec<Question>, now: DateTime<Utc>) -> ExamSessionView {
    let mut by_id: HashMap<i64, Question> = questions.into_iter().map(|q| (q.id, q)).collect();
    let ordered: Vec<PublicQuestion> = session
        .question_ids
        .iter()
        .filter_map(|id| by_id.remove(id))
        .map(PublicQuestion::from)
        .collect();

    let live = !session.status.is_terminal();

    ExamSessionView {
        id: session.id,
        status: session.status,
        total_questions: session.total_questions,
        time_limit_minutes: session.time_limit_minutes,
        passing_score: session.passing_score,
        categories: session.category_filter.clone(),
        difficulty: session.difficulty,
        started_at: session.started_at,
        time_remaining_seconds: if live { session.remaining_seconds(now) } else { 0 },
        time_expired: live && session.is_time_expired(now),
        questions: ordered,
        answers: session.answers.clone(),
        flagged: session.flagged.clone(),
        progress: session.progress(),
    }
}

fn build_results(session: &ExamSession, score: u32, grade: Grade) -> ExamResults {
    ExamResults {
        session_id: session.id,
        status: session.status,
        score,
        passing_score: session.passing_score,
        passed: score >= session.passing_score,
        total_questions: session.total_questions,
        correct: grade.correct,
        incorrect: grade.incorrect,
        unanswered: grade.unanswered,
        started_at: session.started_at,
        completed_at: session.completed_at,
        duration_seconds: session
            .completed_at
            .map(|done| (done - session.started_at).num_seconds().max(0)),
        questions: grade.results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FreeTierLimits;
    use crate::models::{
        exam_session::CategoryFilter,
        question::{Category, Difficulty, QuestionOption},
        user::User,
    };
    use crate::repository::MemoryStore;
    use chrono::Duration;

    const FREE_USER: i64 = 1;
    const PREMIUM_USER: i64 = 2;
    const OTHER_USER: i64 = 3;

    fn question(id: i64) -> Question {
        Question {
            id,
            category: Category::ALL[(id as usize) % Category::ALL.len()],
            difficulty: Difficulty::Medium,
            content: format!("Question {}", id),
            options: ["A", "B", "C", "D"]
                .iter()
                .map(|o| QuestionOption { id: o.to_string(), text: format!("Option {}", o) })
                .collect(),
            correct_option_id: "A".to_string(),
            explanation: Some(format!("Explanation {}", id)),
            ai_explanation: None,
        }
    }

    fn user(id: i64, is_premium: bool) -> User {
        User {
            id,
            username: format!("user{}", id),
            is_premium,
            premium_expires_at: None,
            created_at: None,
        }
    }

    async fn engine_with(question_count: i64) -> (MockExamEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for id in 1..=question_count {
            store.insert_question(question(id)).await;
        }
        store.insert_user(user(FREE_USER, false)).await;
        store.insert_user(user(PREMIUM_USER, true)).await;
        store.insert_user(user(OTHER_USER, false)).await;

        let access = Arc::new(AccessControl::new(
            store.clone(),
            store.clone(),
            FreeTierLimits::default(),
        ));
        let sampler = Arc::new(QuestionSampler::new(store.clone()));
        let engine = MockExamEngine::new(store.clone(), store.clone(), sampler, access);
        (engine, store)
    }

    fn request(count: u32, minutes: u32, passing: u32) -> CreateMockExamRequest {
        CreateMockExamRequest {
            question_count: count,
            time_limit_minutes: minutes,
            passing_score: passing,
            categories: CategoryFilter::Mixed,
            difficulty: None,
        }
    }

    fn answer(question_id: i64, option: &str) -> SaveAnswerRequest {
        SaveAnswerRequest {
            question_id,
            option_id: option.to_string(),
        }
    }

    #[test]
    fn test_score_rounds_instead_of_truncating() {
        assert_eq!(score_percentage(7, 10), 70);
        assert_eq!(score_percentage(2, 3), 67);
        assert_eq!(score_percentage(1, 3), 33);
        assert_eq!(score_percentage(1, 8), 13);
        assert_eq!(score_percentage(0, 0), 0);
    }

    #[tokio::test]
    async fn test_seven_of_ten_passes_at_seventy() {
        let (engine, _) = engine_with(40).await;
        let now = Utc::now();

        let view = engine.create_session(FREE_USER, request(10, 5, 70), now).await.unwrap();
        assert_eq!(view.questions.len(), 10);
        assert_eq!(view.time_remaining_seconds, 300);

        let ids: Vec<i64> = view.questions.iter().map(|q| q.id).collect();
        for (i, id) in ids.iter().enumerate() {
            let option = if i < 7 { "A" } else { "B" };
            engine.save_answer(FREE_USER, view.id, answer(*id, option), now).await.unwrap();
        }

        let results = engine.submit(FREE_USER, view.id, now + Duration::seconds(60)).await.unwrap();
        assert_eq!(results.correct, 7);
        assert_eq!(results.incorrect, 3);
        assert_eq!(results.unanswered, 0);
        assert_eq!(results.score, 70);
        assert!(results.passed);
        assert_eq!(results.duration_seconds, Some(60));
        assert_eq!(results.questions[0].correct_option_id.as_deref(), Some("A"));

        let again = engine.get_results(FREE_USER, view.id).await.unwrap();
        assert_eq!(again.score, results.score);
        assert_eq!(again.correct, results.correct);
    }

    #[tokio::test]
    async fn test_free_tier_question_cap() {
        let (engine, store) = engine_with(40).await;
        let err = engine
            .create_session(FREE_USER, request(25, 5, 70), Utc::now())
            .await
            .unwrap_err();
        match err {
            AppError::QuotaExceeded(denial) => {
                assert_eq!(denial.kind, QuotaKind::MockExamQuestions);
                assert_eq!(denial.limit, Limit::Bounded(20));
            }
            other => panic!("expected quota error, got {:?}", other),
        }
        // Nothing was persisted.
        assert!(store.list_sessions(FREE_USER, 10).await.unwrap().is_empty());

        assert!(engine.create_session(PREMIUM_USER, request(25, 5, 70), Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn test_monthly_exam_quota() {
        let (engine, _) = engine_with(40).await;
        let now = Utc::now();

        for _ in 0..3 {
            let view = engine.create_session(FREE_USER, request(5, 5, 50), now).await.unwrap();
            engine.submit(FREE_USER, view.id, now).await.unwrap();
        }

        let err = engine.create_session(FREE_USER, request(5, 5, 50), now).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::QuotaExceeded(QuotaDenial { kind: QuotaKind::MockExamsPerMonth, used: 3, .. })
        ));

        let limits = engine.limits(FREE_USER, now).await.unwrap();
        assert_eq!(limits.exams_used_this_month, 3);
        assert_eq!(limits.exams_remaining_this_month, Some(0));
    }

    #[tokio::test]
    async fn test_abandoned_exams_do_not_count_towards_month() {
        let (engine, _) = engine_with(40).await;
        let now = Utc::now();

        for _ in 0..5 {
            let view = engine.create_session(FREE_USER, request(5, 5, 50), now).await.unwrap();
            engine.abandon(FREE_USER, view.id).await.unwrap();
        }
        assert!(engine.create_session(FREE_USER, request(5, 5, 50), now).await.is_ok());
    }

    #[tokio::test]
    async fn test_insufficient_content_is_fatal() {
        let (engine, store) = engine_with(8).await;
        let err = engine
            .create_session(FREE_USER, request(10, 5, 70), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientContent(_)));
        assert!(store.list_sessions(FREE_USER, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let (engine, _) = engine_with(40).await;
        let err = engine
            .create_session(PREMIUM_USER, request(171, 5, 70), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_view_hides_answers() {
        let (engine, _) = engine_with(40).await;
        let view = engine.create_session(FREE_USER, request(5, 5, 70), Utc::now()).await.unwrap();
        let json = serde_json::to_value(&view).unwrap();
        let first = &json["questions"][0];
        assert!(first.get("correct_option_id").is_none());
        assert!(first.get("explanation").is_none());
    }

    #[tokio::test]
    async fn test_other_users_cannot_see_session() {
        let (engine, _) = engine_with(40).await;
        let now = Utc::now();
        let view = engine.create_session(FREE_USER, request(5, 5, 70), now).await.unwrap();

        let err = engine.get_state(OTHER_USER, view.id, now).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let missing = engine.get_state(FREE_USER, 9999, now).await.unwrap_err();
        assert!(matches!(missing, AppError::NotFound(_)));

        let err = engine
            .save_answer(OTHER_USER, view.id, answer(view.questions[0].id, "A"), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_answer_overwrites_and_progress_adds_up() {
        let (engine, _) = engine_with(40).await;
        let now = Utc::now();
        let view = engine.create_session(FREE_USER, request(4, 5, 50), now).await.unwrap();
        let q = view.questions[0].id;

        let first = engine.save_answer(FREE_USER, view.id, answer(q, "B"), now).await.unwrap();
        assert_eq!(first.progress.answered, 1);
        assert_eq!(first.progress.answered + first.progress.unanswered, 4);

        let second = engine.save_answer(FREE_USER, view.id, answer(q, "A"), now).await.unwrap();
        assert_eq!(second.progress.answered, 1);
        assert_eq!(second.progress.answered + second.progress.unanswered, 4);

        let results = engine.submit(FREE_USER, view.id, now).await.unwrap();
        assert_eq!(results.correct, 1);
        assert_eq!(results.unanswered, 3);
        assert_eq!(results.score, 25);
    }

    #[tokio::test]
    async fn test_question_outside_session_rejected() {
        let (engine, _) = engine_with(40).await;
        let now = Utc::now();
        let view = engine.create_session(FREE_USER, request(4, 5, 50), now).await.unwrap();
        let foreign = (1..=40)
            .find(|id| !view.questions.iter().any(|q| q.id == *id))
            .unwrap();

        let err = engine
            .save_answer(FREE_USER, view.id, answer(foreign, "A"), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = engine
            .toggle_flag(
                FREE_USER,
                view.id,
                ToggleFlagRequest { question_id: foreign, flagged: true },
                now,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_flag_is_idempotent() {
        let (engine, _) = engine_with(40).await;
        let now = Utc::now();
        let view = engine.create_session(FREE_USER, request(4, 5, 50), now).await.unwrap();
        let q = view.questions[1].id;
        let flag = |flagged| ToggleFlagRequest { question_id: q, flagged };

        let once = engine.toggle_flag(FREE_USER, view.id, flag(true), now).await.unwrap();
        let twice = engine.toggle_flag(FREE_USER, view.id, flag(true), now).await.unwrap();
        assert_eq!(once.progress, twice.progress);
        assert_eq!(twice.progress.flagged, 1);
        assert!(twice.flagged);

        let cleared = engine.toggle_flag(FREE_USER, view.id, flag(false), now).await.unwrap();
        assert_eq!(cleared.progress.flagged, 0);
        assert_eq!(cleared.progress.answered + cleared.progress.unanswered, 4);
    }

    #[tokio::test]
    async fn test_answer_time_boundary() {
        let (engine, _) = engine_with(40).await;
        let start = Utc::now();
        let view = engine.create_session(FREE_USER, request(4, 5, 50), start).await.unwrap();
        let q = view.questions[0].id;

        let last_second = start + Duration::seconds(5 * 60 - 1);
        assert!(engine.save_answer(FREE_USER, view.id, answer(q, "A"), last_second).await.is_ok());

        let at_limit = start + Duration::seconds(5 * 60);
        let err = engine
            .save_answer(FREE_USER, view.id, answer(q, "B"), at_limit)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = engine
            .toggle_flag(
                FREE_USER,
                view.id,
                ToggleFlagRequest { question_id: q, flagged: true },
                at_limit,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let state = engine.get_state(FREE_USER, view.id, at_limit).await.unwrap();
        assert_eq!(state.time_remaining_seconds, 0);
        assert!(state.time_expired);
        assert_eq!(state.answers.get(&q).map(String::as_str), Some("A"));
    }

    #[tokio::test]
    async fn test_submit_after_time_limit_abandons() {
        let (engine, store) = engine_with(40).await;
        let start = Utc::now();
        let view = engine.create_session(FREE_USER, request(4, 1, 50), start).await.unwrap();
        let q = view.questions[0].id;
        engine.save_answer(FREE_USER, view.id, answer(q, "A"), start).await.unwrap();

        let err = engine
            .submit(FREE_USER, view.id, start + Duration::days(3))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let stored = store.find_session(view.id, FREE_USER).await.unwrap().unwrap();
        assert_eq!(stored.status, ExamStatus::Abandoned);
        assert_eq!(stored.score, None);
        assert_eq!(stored.completed_at, None);

        // Not a completed exam, so the month is untouched and there are no results.
        let limits = engine.limits(FREE_USER, start).await.unwrap();
        assert_eq!(limits.exams_used_this_month, 0);
        assert!(matches!(
            engine.get_results(FREE_USER, view.id).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_just_inside_limit_completes() {
        let (engine, _) = engine_with(40).await;
        let start = Utc::now();
        let view = engine.create_session(FREE_USER, request(4, 1, 50), start).await.unwrap();

        let results = engine
            .submit(FREE_USER, view.id, start + Duration::seconds(59))
            .await
            .unwrap();
        assert_eq!(results.status, ExamStatus::Completed);
        assert_eq!(results.unanswered, 4);
    }

    #[tokio::test]
    async fn test_unknown_option_rejected() {
        let (engine, store) = engine_with(40).await;
        let now = Utc::now();
        let view = engine.create_session(FREE_USER, request(4, 5, 50), now).await.unwrap();
        let q = view.questions[0].id;

        let err = engine
            .save_answer(FREE_USER, view.id, answer(q, "Z"), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let stored = store.find_session(view.id, FREE_USER).await.unwrap().unwrap();
        assert!(stored.answers.is_empty());
    }

    #[tokio::test]
    async fn test_completion_requires_the_graded_answers() {
        let (engine, store) = engine_with(40).await;
        let now = Utc::now();
        let view = engine.create_session(FREE_USER, request(4, 5, 50), now).await.unwrap();
        let graded = store
            .find_session(view.id, FREE_USER)
            .await
            .unwrap()
            .unwrap()
            .answers;

        // An answer lands after grading started.
        let q = view.questions[0].id;
        engine.save_answer(FREE_USER, view.id, answer(q, "A"), now).await.unwrap();

        assert!(!store.complete_session(view.id, FREE_USER, &graded, 0, now).await.unwrap());
        let stored = store.find_session(view.id, FREE_USER).await.unwrap().unwrap();
        assert_eq!(stored.status, ExamStatus::InProgress);

        // The engine grades what is actually stored, so score and breakdown agree.
        let results = engine.submit(FREE_USER, view.id, now).await.unwrap();
        assert_eq!(results.correct, 1);
        assert_eq!(results.score, 25);
        let again = engine.get_results(FREE_USER, view.id).await.unwrap();
        assert_eq!(again.score, 25);
        assert_eq!(again.correct, 1);
    }

    #[tokio::test]
    async fn test_terminal_sessions_reject_everything() {
        let (engine, _) = engine_with(40).await;
        let now = Utc::now();
        let view = engine.create_session(FREE_USER, request(4, 5, 50), now).await.unwrap();
        let q = view.questions[0].id;

        let first = engine.submit(FREE_USER, view.id, now).await.unwrap();
        let retry = engine.submit(FREE_USER, view.id, now).await.unwrap_err();
        assert!(matches!(retry, AppError::Conflict(_)));

        let results = engine.get_results(FREE_USER, view.id).await.unwrap();
        assert_eq!(results.score, first.score);

        assert!(matches!(
            engine.save_answer(FREE_USER, view.id, answer(q, "A"), now).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(engine.abandon(FREE_USER, view.id).await, Err(AppError::Conflict(_))));

        let other = engine.create_session(FREE_USER, request(4, 5, 50), now).await.unwrap();
        engine.abandon(FREE_USER, other.id).await.unwrap();
        assert!(matches!(
            engine.submit(FREE_USER, other.id, now).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            engine.get_results(FREE_USER, other.id).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_check_in_progress_reaps_expired_session() {
        let (engine, store) = engine_with(40).await;
        let start = Utc::now();
        let view = engine.create_session(FREE_USER, request(4, 1, 50), start).await.unwrap();

        let live = engine.check_in_progress(FREE_USER, start + Duration::seconds(30)).await.unwrap();
        assert_eq!(live.map(|v| v.id), Some(view.id));

        let later = start + Duration::seconds(61);
        assert!(engine.check_in_progress(FREE_USER, later).await.unwrap().is_none());

        let stored = store.find_session(view.id, FREE_USER).await.unwrap().unwrap();
        assert_eq!(stored.status, ExamStatus::Abandoned);
        assert_eq!(stored.score, None);
        assert_eq!(stored.completed_at, None);
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let (engine, _) = engine_with(40).await;
        let now = Utc::now();
        let first = engine.create_session(FREE_USER, request(4, 5, 50), now).await.unwrap();
        engine.submit(FREE_USER, first.id, now).await.unwrap();
        let second = engine
            .create_session(FREE_USER, request(4, 5, 50), now + Duration::minutes(10))
            .await
            .unwrap();

        let history = engine.history(FREE_USER, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[0].status, ExamStatus::InProgress);
        assert_eq!(history[1].status, ExamStatus::Completed);
        assert_eq!(history[1].passed, Some(false));
        assert!(engine.history(OTHER_USER, 10).await.unwrap().is_empty());
    }
}
