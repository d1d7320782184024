// src/services/access.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    config::FreeTierLimits,
    error::{AppError, QuotaDenial},
    models::{
        access::{AccessLimits, DailyCounter, Limit},
        user::User,
    },
    repository::{UsageRepository, UserRepository},
    services::calendar::local_date_of,
};

/// Entitlements of `user` at `now`. Pure; an expired pass silently yields free-tier limits.
pub fn limits_for(user: &User, free: &FreeTierLimits, now: DateTime<Utc>) -> AccessLimits {
    if user.has_active_premium(now) {
        AccessLimits {
            can_access_premium_features: true,
            practice_limit_per_day: Limit::Unlimited,
            mock_exam_questions_limit: Limit::Unlimited,
            mock_exams_per_month: Limit::Unlimited,
            explanation_views_per_day: Limit::Unlimited,
        }
    } else {
        AccessLimits {
            can_access_premium_features: false,
            practice_limit_per_day: Limit::Bounded(free.practice_per_day),
            mock_exam_questions_limit: Limit::Bounded(free.mock_exam_questions),
            mock_exams_per_month: Limit::Bounded(free.mock_exams_per_month),
            explanation_views_per_day: Limit::Bounded(free.explanation_views_per_day),
        }
    }
}

/// Resolves tier limits and enforces the per-day counters.
pub struct AccessControl {
    users: Arc<dyn UserRepository>,
    usage: Arc<dyn UsageRepository>,
    free_tier: FreeTierLimits,
}

impl AccessControl {
    pub fn new(
        users: Arc<dyn UserRepository>,
        usage: Arc<dyn UsageRepository>,
        free_tier: FreeTierLimits,
    ) -> Self {
        Self {
            users,
            usage,
            free_tier,
        }
    }

    pub async fn load_user(&self, user_id: i64) -> Result<User, AppError> {
        self.users
            .find_user(user_id)
            .await?
            .ok_or(AppError::NotFound("User not found".to_string()))
    }

    pub fn limits(&self, user: &User, now: DateTime<Utc>) -> AccessLimits {
        limits_for(user, &self.free_tier, now)
    }

    pub async fn limits_of(&self, user_id: i64, now: DateTime<Utc>) -> Result<AccessLimits, AppError> {
        let user = self.load_user(user_id).await?;
        Ok(self.limits(&user, now))
    }

    /// Today's value of a daily counter.
    pub async fn used_today(
        &self,
        user_id: i64,
        counter: DailyCounter,
        now: DateTime<Utc>,
    ) -> Result<u32, AppError> {
        self.usage.usage_on(user_id, local_date_of(now), counter).await
    }

    /// Consumes one unit of a daily quota, or denies without touching the counter.
    /// Returns the counter value after the increment.
    pub async fn consume_daily(
        &self,
        user_id: i64,
        counter: DailyCounter,
        now: DateTime<Utc>,
    ) -> Result<u32, AppError> {
        let limits = self.limits_of(user_id, now).await?;
        let limit = counter.limit_in(&limits);
        let today = local_date_of(now);

        match self.usage.try_increment(user_id, today, counter, limit).await? {
            Some(count) => Ok(count),
            None => {
                let used = self.usage.usage_on(user_id, today, counter).await?;
                tracing::info!(
                    user_id,
                    counter = counter.as_str(),
                    used,
                    "Daily quota exhausted"
                );
                Err(AppError::QuotaExceeded(QuotaDenial {
                    kind: counter.quota_kind(),
                    limit,
                    used,
                }))
            }
        }
    }

    /// Returns a unit taken by `consume_daily` when the metered action did not happen.
    pub async fn refund_daily(
        &self,
        user_id: i64,
        counter: DailyCounter,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.usage.release(user_id, local_date_of(now), counter).await
    }
}
