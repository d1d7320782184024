// src/services/subscription.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        access::DailyCounter,
        user::{RedeemCodeRequest, SubscriptionStatus},
    },
    repository::PassCodeRepository,
    services::access::AccessControl,
};

/// Season Pass state and code redemption.
pub struct SubscriptionService {
    codes: Arc<dyn PassCodeRepository>,
    access: Arc<AccessControl>,
}

impl SubscriptionService {
    pub fn new(codes: Arc<dyn PassCodeRepository>, access: Arc<AccessControl>) -> Self {
        Self { codes, access }
    }

    pub async fn status(&self, user_id: i64, now: DateTime<Utc>) -> Result<SubscriptionStatus, AppError> {
        let user = self.access.load_user(user_id).await?;
        let limits = self.access.limits(&user, now);
        let practice = self.access.used_today(user_id, DailyCounter::Practice, now).await?;
        let explanations = self
            .access
            .used_today(user_id, DailyCounter::ExplanationView, now)
            .await?;

        Ok(SubscriptionStatus {
            is_premium: limits.can_access_premium_features,
            premium_expires_at: user.premium_expires_at,
            limits,
            practice_used_today: practice,
            explanations_used_today: explanations,
        })
    }

    /// Claims a one-time code and extends the pass from the later of now and the
    /// current expiry.
    pub async fn redeem(
        &self,
        user_id: i64,
        req: RedeemCodeRequest,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionStatus, AppError> {
        req.validate()?;

        let user = self.access.load_user(user_id).await?;
        if user.is_premium && user.premium_expires_at.is_none() {
            return Err(AppError::Conflict(
                "Account already has a lifetime Season Pass".to_string(),
            ));
        }

        let code = req.code.trim();
        let expires_at = self
            .codes
            .redeem_pass_code(code, user_id, now)
            .await?
            .ok_or(AppError::NotFound("Invalid or already redeemed code".to_string()))?;

        tracing::info!(user_id, %expires_at, "Season Pass code redeemed");

        self.status(user_id, now).await
    }
}
