// src/services/practice.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        access::DailyCounter,
        practice::{
            ExplanationResponse, NewPracticeAttempt, PracticeAnswerRequest, PracticeAnswerResult,
            PracticeQuestionParams,
        },
        question::{PublicQuestion, Question, QuestionFilter},
    },
    repository::{PracticeRepository, QuestionRepository},
    services::{access::AccessControl, sampler::QuestionSampler, streak::StreakTracker},
};

const DEFAULT_PRACTICE_COUNT: u32 = 10;

/// Untimed single-question practice, metered by the daily quotas.
pub struct PracticeService {
    questions: Arc<dyn QuestionRepository>,
    attempts: Arc<dyn PracticeRepository>,
    sampler: Arc<QuestionSampler>,
    access: Arc<AccessControl>,
    streaks: Arc<StreakTracker>,
}

impl PracticeService {
    pub fn new(
        questions: Arc<dyn QuestionRepository>,
        attempts: Arc<dyn PracticeRepository>,
        sampler: Arc<QuestionSampler>,
        access: Arc<AccessControl>,
        streaks: Arc<StreakTracker>,
    ) -> Self {
        Self {
            questions,
            attempts,
            sampler,
            access,
            streaks,
        }
    }

    /// Random questions without answer keys. Drawing is free; answering is metered.
    pub async fn practice_questions(
        &self,
        params: PracticeQuestionParams,
    ) -> Result<Vec<PublicQuestion>, AppError> {
        params.validate()?;

        let filter = QuestionFilter {
            categories: params.category.into_iter().collect(),
            difficulty: params.difficulty,
        };
        let count = params.count.unwrap_or(DEFAULT_PRACTICE_COUNT) as usize;

        let questions = self.sampler.sample(count, &filter).await?;
        Ok(questions.into_iter().map(PublicQuestion::from).collect())
    }

    /// Grades one answer. The quota unit is taken before grading, so a denied call
    /// reveals nothing and records nothing. An attempt that fails to persist is refunded.
    pub async fn submit_answer(
        &self,
        user_id: i64,
        req: PracticeAnswerRequest,
        now: DateTime<Utc>,
    ) -> Result<PracticeAnswerResult, AppError> {
        req.validate()?;

        let question = self.find_question(req.question_id).await?;
        if !question.has_option(&req.option_id) {
            return Err(AppError::BadRequest(format!(
                "Option '{}' does not belong to question {}",
                req.option_id, question.id
            )));
        }

        let used = self
            .access
            .consume_daily(user_id, DailyCounter::Practice, now)
            .await?;

        let is_correct = question.is_correct(&req.option_id);
        let recorded = self
            .attempts
            .record_attempt(NewPracticeAttempt {
                user_id,
                question_id: question.id,
                category: question.category,
                selected_option_id: req.option_id,
                is_correct,
                answered_at: now,
            })
            .await;
        if let Err(err) = recorded {
            self.access
                .refund_daily(user_id, DailyCounter::Practice, now)
                .await?;
            return Err(err);
        }

        let streak = self.streaks.update_streak(user_id, now).await?;

        Ok(PracticeAnswerResult {
            question_id: question.id,
            is_correct,
            correct_option_id: question.correct_option_id,
            current_streak: streak.current_streak,
            practice_used_today: used,
        })
    }

    pub async fn view_explanation(
        &self,
        user_id: i64,
        question_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ExplanationResponse, AppError> {
        let question = self.find_question(question_id).await?;
        let used = self
            .access
            .consume_daily(user_id, DailyCounter::ExplanationView, now)
            .await?;

        Ok(ExplanationResponse {
            question_id,
            explanation: question.best_explanation().map(str::to_string),
            correct_option_id: question.correct_option_id,
            views_used_today: used,
        })
    }

    async fn find_question(&self, question_id: i64) -> Result<Question, AppError> {
        self.questions
            .find_question(question_id)
            .await?
            .ok_or(AppError::NotFound("Question not found".to_string()))
    }
}
