// src/models/access.rs

use serde::{Serialize, Serializer};

/// A tier quota. Premium quotas are `Unlimited`; they never take part in arithmetic,
/// only in the two predicates below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Unlimited,
    Bounded(u32),
}

impl Limit {
    /// True when `current` usage has used up the quota.
    pub fn is_reached_by(&self, current: u32) -> bool {
        exceeds_limit(current, *self)
    }

    /// True when a single request for `amount` units fits under the quota.
    pub fn permits(&self, amount: u32) -> bool {
        match self {
            Limit::Unlimited => true,
            Limit::Bounded(max) => amount <= *max,
        }
    }
}

/// `Unlimited` is never exceeded; a bounded quota is exceeded once `current >= limit`.
pub fn exceeds_limit(current: u32, limit: Limit) -> bool {
    match limit {
        Limit::Unlimited => false,
        Limit::Bounded(max) => current >= max,
    }
}

/// Serialized as the number, or `null` when unlimited.
impl Serialize for Limit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Limit::Unlimited => serializer.serialize_none(),
            Limit::Bounded(max) => serializer.serialize_u32(*max),
        }
    }
}

/// Entitlements derived from a user record at request time. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessLimits {
    pub can_access_premium_features: bool,
    pub practice_limit_per_day: Limit,
    pub mock_exam_questions_limit: Limit,
    pub mock_exams_per_month: Limit,
    pub explanation_views_per_day: Limit,
}

/// Which quota denied an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaKind {
    PracticeQuestions,
    ExplanationViews,
    MockExamQuestions,
    MockExamsPerMonth,
}

/// Per-(user, local day) counters kept in `daily_usage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DailyCounter {
    Practice,
    ExplanationView,
}

impl DailyCounter {
    pub fn as_str(&self) -> &'static str {
        match self {
            DailyCounter::Practice => "practice",
            DailyCounter::ExplanationView => "explanation_view",
        }
    }

    pub fn quota_kind(&self) -> QuotaKind {
        match self {
            DailyCounter::Practice => QuotaKind::PracticeQuestions,
            DailyCounter::ExplanationView => QuotaKind::ExplanationViews,
        }
    }

    pub fn limit_in(&self, limits: &AccessLimits) -> Limit {
        match self {
            DailyCounter::Practice => limits.practice_limit_per_day,
            DailyCounter::ExplanationView => limits.explanation_views_per_day,
        }
    }
}
