// src/models/practice.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::question::{Category, Difficulty};

/// Represents the 'practice_attempts' table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PracticeAttempt {
    pub id: i64,
    pub user_id: i64,
    pub question_id: i64,
    pub category: Category,
    pub selected_option_id: String,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPracticeAttempt {
    pub user_id: i64,
    pub question_id: i64,
    pub category: Category,
    pub selected_option_id: String,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

/// Query parameters for drawing practice questions.
#[derive(Debug, Deserialize, Validate)]
pub struct PracticeQuestionParams {
    pub category: Option<Category>,
    pub difficulty: Option<Difficulty>,
    #[validate(range(min = 1, max = 50, message = "Count must be between 1 and 50."))]
    pub count: Option<u32>,
}

/// DTO for answering a practice question.
#[derive(Debug, Deserialize, Validate)]
pub struct PracticeAnswerRequest {
    pub question_id: i64,
    #[validate(length(min = 1, max = 16))]
    pub option_id: String,
}

#[derive(Debug, Serialize)]
pub struct PracticeAnswerResult {
    pub question_id: i64,
    pub is_correct: bool,
    pub correct_option_id: String,
    pub current_streak: u32,
    pub practice_used_today: u32,
}

#[derive(Debug, Serialize)]
pub struct ExplanationResponse {
    pub question_id: i64,
    pub correct_option_id: String,
    pub explanation: Option<String>,
    pub views_used_today: u32,
}
