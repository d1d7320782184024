// src/models/analytics.rs

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::question::Category;

/// Headline numbers for the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub practice_answered: u32,
    pub practice_correct: u32,
    /// Percentage with one decimal, 0.0 when nothing was answered.
    pub practice_accuracy: f64,
    pub exams_completed: u32,
    pub exams_passed: u32,
    pub average_exam_score: Option<f64>,
    pub best_exam_score: Option<u32>,
    pub current_streak: u32,
    pub longest_streak: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStats {
    pub category: Category,
    pub answered: u32,
    pub correct: u32,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub practice_answered: u32,
    pub practice_correct: u32,
    pub exams_completed: u32,
}
