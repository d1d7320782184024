// src/models/exam_session.rs

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::{
    MAX_EXAM_MINUTES, MAX_EXAM_QUESTIONS, MAX_PASSING_SCORE, MIN_EXAM_MINUTES, MIN_EXAM_QUESTIONS,
};
use crate::models::question::{Category, Difficulty, PublicQuestion, QuestionFilter, QuestionOption};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExamStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl ExamStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExamStatus::InProgress)
    }
}

impl FromStr for ExamStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_PROGRESS" => Ok(ExamStatus::InProgress),
            "COMPLETED" => Ok(ExamStatus::Completed),
            "ABANDONED" => Ok(ExamStatus::Abandoned),
            other => Err(format!("Unknown exam status '{}'", other)),
        }
    }
}

/// Either `"MIXED"` or an explicit list such as `["VERBAL_ABILITY", "CLERICAL_ABILITY"]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CategoryFilter {
    #[default]
    Mixed,
    #[serde(untagged)]
    Only(Vec<Category>),
}

impl CategoryFilter {
    /// Empty and duplicate entries collapse; an empty list means mixed.
    pub fn normalized(self) -> Self {
        match self {
            CategoryFilter::Mixed => CategoryFilter::Mixed,
            CategoryFilter::Only(list) => {
                let set: BTreeSet<Category> = list.into_iter().collect();
                if set.is_empty() {
                    CategoryFilter::Mixed
                } else {
                    CategoryFilter::Only(set.into_iter().collect())
                }
            }
        }
    }

    pub fn to_question_filter(&self, difficulty: Option<Difficulty>) -> QuestionFilter {
        QuestionFilter {
            categories: match self {
                CategoryFilter::Mixed => Vec::new(),
                CategoryFilter::Only(list) => list.clone(),
            },
            difficulty,
        }
    }
}

/// The persisted state of one timed mock exam.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamSession {
    pub id: i64,
    pub user_id: i64,

    pub total_questions: u32,
    pub time_limit_minutes: u32,
    pub passing_score: u32,
    pub category_filter: CategoryFilter,
    pub difficulty: Option<Difficulty>,

    /// Presentation order, fixed at creation.
    pub question_ids: Vec<i64>,

    /// question id -> selected option id. Unanswered questions are absent.
    pub answers: BTreeMap<i64, String>,
    pub flagged: BTreeSet<i64>,

    pub status: ExamStatus,
    pub score: Option<u32>,

    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExamSession {
    pub fn time_limit_seconds(&self) -> i64 {
        i64::from(self.time_limit_minutes) * 60
    }

    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_seconds().max(0)
    }

    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.time_limit_seconds() - self.elapsed_seconds(now)).max(0)
    }

    /// Expired once the whole limit has elapsed; the last accepted second is `limit - 1`.
    pub fn is_time_expired(&self, now: DateTime<Utc>) -> bool {
        self.elapsed_seconds(now) >= self.time_limit_seconds()
    }

    pub fn contains_question(&self, question_id: i64) -> bool {
        self.question_ids.contains(&question_id)
    }

    pub fn progress(&self) -> ExamProgress {
        let total = self.question_ids.len() as u32;
        let answered = self
            .question_ids
            .iter()
            .filter(|id| self.answers.contains_key(id))
            .count() as u32;
        let flagged = self
            .question_ids
            .iter()
            .filter(|id| self.flagged.contains(id))
            .count() as u32;

        ExamProgress {
            total,
            answered,
            flagged,
            unanswered: total - answered,
        }
    }
}

/// Values written when a session is created.
#[derive(Debug, Clone)]
pub struct NewExamSession {
    pub user_id: i64,
    pub total_questions: u32,
    pub time_limit_minutes: u32,
    pub passing_score: u32,
    pub category_filter: CategoryFilter,
    pub difficulty: Option<Difficulty>,
    pub question_ids: Vec<i64>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExamProgress {
    pub total: u32,
    pub answered: u32,
    pub flagged: u32,
    pub unanswered: u32,
}

/// DTO for creating a mock exam.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateMockExamRequest {
    #[validate(range(
        min = MIN_EXAM_QUESTIONS,
        max = MAX_EXAM_QUESTIONS,
        message = "Question count must be between 1 and 170."
    ))]
    pub question_count: u32,

    #[validate(range(
        min = MIN_EXAM_MINUTES,
        max = MAX_EXAM_MINUTES,
        message = "Time limit must be between 1 and 180 minutes."
    ))]
    pub time_limit_minutes: u32,

    #[validate(range(max = MAX_PASSING_SCORE, message = "Passing score must be between 0 and 100."))]
    pub passing_score: u32,

    #[serde(default)]
    pub categories: CategoryFilter,

    pub difficulty: Option<Difficulty>,
}

/// DTO for saving an answer.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SaveAnswerRequest {
    pub question_id: i64,
    #[validate(length(min = 1, max = 16))]
    pub option_id: String,
}

/// DTO for flagging or unflagging a question.
#[derive(Debug, Clone, Deserialize)]
pub struct ToggleFlagRequest {
    pub question_id: i64,
    pub flagged: bool,
}

/// Query parameters for the history endpoint.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    /// Number of items to return (default: 20, max: 100).
    pub limit: Option<i64>,
}

/// State of a session as seen by the candidate. Never carries answer keys.
#[derive(Debug, Serialize)]
pub struct ExamSessionView {
    pub id: i64,
    pub status: ExamStatus,
    pub total_questions: u32,
    pub time_limit_minutes: u32,
    pub passing_score: u32,
    pub categories: CategoryFilter,
    pub difficulty: Option<Difficulty>,
    pub started_at: DateTime<Utc>,
    pub time_remaining_seconds: i64,
    pub time_expired: bool,
    pub questions: Vec<PublicQuestion>,
    pub answers: BTreeMap<i64, String>,
    pub flagged: BTreeSet<i64>,
    pub progress: ExamProgress,
}

/// Short answer to `saveAnswer` / `toggleFlag`.
#[derive(Debug, Serialize)]
pub struct ProgressUpdate {
    pub session_id: i64,
    pub question_id: i64,
    pub progress: ExamProgress,
    pub flagged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    Correct,
    Incorrect,
    Unanswered,
}

/// Per-question breakdown revealed after submission.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionResult {
    pub question_id: i64,
    pub category: Option<Category>,
    pub content: Option<String>,
    pub options: Vec<QuestionOption>,
    pub selected_option_id: Option<String>,
    pub correct_option_id: Option<String>,
    pub explanation: Option<String>,
    pub outcome: AnswerOutcome,
    pub flagged: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExamResults {
    pub session_id: i64,
    pub status: ExamStatus,
    pub score: u32,
    pub passing_score: u32,
    pub passed: bool,
    pub total_questions: u32,
    pub correct: u32,
    pub incorrect: u32,
    pub unanswered: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub questions: Vec<QuestionResult>,
}

/// Row of the history list.
#[derive(Debug, Clone, Serialize)]
pub struct ExamHistoryEntry {
    pub id: i64,
    pub status: ExamStatus,
    pub total_questions: u32,
    pub time_limit_minutes: u32,
    pub passing_score: u32,
    pub categories: CategoryFilter,
    pub difficulty: Option<Difficulty>,
    pub score: Option<u32>,
    pub passed: Option<bool>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<ExamSession> for ExamHistoryEntry {
    fn from(s: ExamSession) -> Self {
        Self {
            id: s.id,
            status: s.status,
            total_questions: s.total_questions,
            time_limit_minutes: s.time_limit_minutes,
            passing_score: s.passing_score,
            passed: s.score.map(|score| score >= s.passing_score),
            categories: s.category_filter,
            difficulty: s.difficulty,
            score: s.score,
            started_at: s.started_at,
            completed_at: s.completed_at,
        }
    }
}
