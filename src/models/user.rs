// src/models/user.rs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::access::AccessLimits;

/// Represents the 'users' table in the database.
/// Accounts are created by the auth service; the exam core only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique username.
    pub username: String,

    /// Set once a Season Pass was purchased or redeemed.
    pub is_premium: bool,

    /// `None` means the pass never expires.
    pub premium_expires_at: Option<DateTime<Utc>>,

    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// A premium flag with a past expiry counts as free tier.
    pub fn has_active_premium(&self, now: DateTime<Utc>) -> bool {
        self.is_premium && self.premium_expires_at.is_none_or(|expires| expires > now)
    }
}

/// New expiry after redeeming `days` of Season Pass on top of `current`.
/// Remaining time on an active pass is kept; an expired pass restarts from `now`.
pub fn extended_expiry(
    current: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    days: i64,
) -> DateTime<Utc> {
    let base = match current {
        Some(expires) if expires > now => expires,
        _ => now,
    };
    base + Duration::days(days)
}

/// DTO for redeeming a Season Pass code.
#[derive(Debug, Deserialize, Validate)]
pub struct RedeemCodeRequest {
    #[validate(length(min = 4, max = 64, message = "Code length must be between 4 and 64 characters."))]
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionStatus {
    pub is_premium: bool,
    pub premium_expires_at: Option<DateTime<Utc>>,
    pub limits: AccessLimits,
    pub practice_used_today: u32,
    pub explanations_used_today: u32,
}
