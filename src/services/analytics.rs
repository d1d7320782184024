// src/services/analytics.rs

//! Read-only aggregation over practice attempts and completed exams.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::{
    error::AppError,
    models::{
        analytics::{CategoryStats, DailyActivity, DashboardStats},
        question::Category,
    },
    repository::{ExamSessionRepository, PracticeRepository, StreakRepository},
    services::calendar::{local_date_of, start_of_local_day},
};

const WEEK_DAYS: i64 = 7;

/// Percentage with one decimal.
fn accuracy(correct: u32, answered: u32) -> f64 {
    if answered == 0 {
        return 0.0;
    }
    (f64::from(correct) * 1000.0 / f64::from(answered)).round() / 10.0
}

pub struct AnalyticsService {
    attempts: Arc<dyn PracticeRepository>,
    sessions: Arc<dyn ExamSessionRepository>,
    streaks: Arc<dyn StreakRepository>,
}

impl AnalyticsService {
    pub fn new(
        attempts: Arc<dyn PracticeRepository>,
        sessions: Arc<dyn ExamSessionRepository>,
        streaks: Arc<dyn StreakRepository>,
    ) -> Self {
        Self {
            attempts,
            sessions,
            streaks,
        }
    }

    pub async fn dashboard(&self, user_id: i64) -> Result<DashboardStats, AppError> {
        let attempts = self.attempts.list_attempts(user_id, None).await?;
        let exams = self.sessions.list_completed(user_id).await?;
        let streak = self.streaks.find_streak(user_id).await?;

        let answered = attempts.len() as u32;
        let correct = attempts.iter().filter(|a| a.is_correct).count() as u32;

        let scores: Vec<u32> = exams.iter().filter_map(|s| s.score).collect();
        let passed = exams
            .iter()
            .filter(|s| s.score.is_some_and(|score| score >= s.passing_score))
            .count() as u32;
        let average = (!scores.is_empty()).then(|| {
            let sum: u32 = scores.iter().sum();
            (f64::from(sum) * 10.0 / scores.len() as f64).round() / 10.0
        });

        Ok(DashboardStats {
            practice_answered: answered,
            practice_correct: correct,
            practice_accuracy: accuracy(correct, answered),
            exams_completed: exams.len() as u32,
            exams_passed: passed,
            average_exam_score: average,
            best_exam_score: scores.iter().copied().max(),
            current_streak: streak.as_ref().map_or(0, |s| s.current_streak),
            longest_streak: streak.as_ref().map_or(0, |s| s.longest_streak),
        })
    }

    /// Practice accuracy for every category, including untouched ones.
    pub async fn categories(&self, user_id: i64) -> Result<Vec<CategoryStats>, AppError> {
        let attempts = self.attempts.list_attempts(user_id, None).await?;

        let mut tally: BTreeMap<Category, (u32, u32)> =
            Category::ALL.iter().map(|c| (*c, (0, 0))).collect();
        for attempt in &attempts {
            let entry = tally.entry(attempt.category).or_default();
            entry.0 += 1;
            if attempt.is_correct {
                entry.1 += 1;
            }
        }

        Ok(tally
            .into_iter()
            .map(|(category, (answered, correct))| CategoryStats {
                category,
                answered,
                correct,
                accuracy: accuracy(correct, answered),
            })
            .collect())
    }

    /// The last seven local days, oldest first, today included.
    pub async fn weekly(&self, user_id: i64, now: DateTime<Utc>) -> Result<Vec<DailyActivity>, AppError> {
        let today = local_date_of(now);
        let first = today - Duration::days(WEEK_DAYS - 1);

        let mut days: BTreeMap<NaiveDate, DailyActivity> = (0..WEEK_DAYS)
            .map(|offset| {
                let date = first + Duration::days(offset);
                (
                    date,
                    DailyActivity {
                        date,
                        practice_answered: 0,
                        practice_correct: 0,
                        exams_completed: 0,
                    },
                )
            })
            .collect();

        let attempts = self
            .attempts
            .list_attempts(user_id, Some(start_of_local_day(first)))
            .await?;
        for attempt in &attempts {
            if let Some(day) = days.get_mut(&local_date_of(attempt.answered_at)) {
                day.practice_answered += 1;
                if attempt.is_correct {
                    day.practice_correct += 1;
                }
            }
        }

        for exam in self.sessions.list_completed(user_id).await? {
            if let Some(day) = exam
                .completed_at
                .and_then(|at| days.get_mut(&local_date_of(at)))
            {
                day.exams_completed += 1;
            }
        }

        Ok(days.into_values().collect())
    }
}
