// src/config.rs

use std::env;
use std::str::FromStr;

use dotenvy::dotenv;

/// Fixed offset (hours east of UTC) that defines a user's calendar day.
/// Day boundaries for quotas and streaks never depend on the server timezone.
pub const LOCAL_UTC_OFFSET_HOURS: i64 = 8;

/// Bounds for a mock exam configuration.
pub const MIN_EXAM_QUESTIONS: u32 = 1;
pub const MAX_EXAM_QUESTIONS: u32 = 170;
pub const MIN_EXAM_MINUTES: u32 = 1;
pub const MAX_EXAM_MINUTES: u32 = 180;
pub const MAX_PASSING_SCORE: u32 = 100;

/// Number of rows returned by history endpoints when the client does not ask.
pub const DEFAULT_HISTORY_LIMIT: i64 = 20;

/// Quotas applied to users without an active Season Pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeTierLimits {
    pub practice_per_day: u32,
    pub mock_exam_questions: u32,
    pub mock_exams_per_month: u32,
    pub explanation_views_per_day: u32,
}

impl Default for FreeTierLimits {
    fn default() -> Self {
        Self {
            practice_per_day: 20,
            mock_exam_questions: 20,
            mock_exams_per_month: 3,
            explanation_views_per_day: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub port: u16,
    pub free_tier: FreeTierLimits,
    /// Points a streak repair would cost. Reported to clients, never deducted.
    pub streak_repair_cost: u32,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let defaults = FreeTierLimits::default();
        let free_tier = FreeTierLimits {
            practice_per_day: var_or("FREE_PRACTICE_PER_DAY", defaults.practice_per_day),
            mock_exam_questions: var_or("FREE_MOCK_EXAM_QUESTIONS", defaults.mock_exam_questions),
            mock_exams_per_month: var_or("FREE_MOCK_EXAMS_PER_MONTH", defaults.mock_exams_per_month),
            explanation_views_per_day: var_or(
                "FREE_EXPLANATION_VIEWS_PER_DAY",
                defaults.explanation_views_per_day,
            ),
        };

        Self {
            database_url,
            jwt_secret,
            rust_log,
            port: var_or("PORT", 3000),
            free_tier,
            streak_repair_cost: var_or("STREAK_REPAIR_COST", 50),
        }
    }
}

/// Reads an optional numeric variable, falling back when it is absent or malformed.
fn var_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring malformed configuration value");
            default
        }),
        Err(_) => default,
    }
}
