// src/models/streak.rs

use chrono::NaiveDate;
use serde::Serialize;

/// Represents the 'streaks' table. All dates are local calendar days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreakRecord {
    pub user_id: i64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_activity_date: Option<NaiveDate>,
    /// Local day on which the last repair was used.
    pub streak_repaired_at: Option<NaiveDate>,
}

impl StreakRecord {
    pub fn empty(user_id: i64) -> Self {
        Self {
            user_id,
            current_streak: 0,
            longest_streak: 0,
            last_activity_date: None,
            streak_repaired_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StreakStatus {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_activity_date: Option<NaiveDate>,
    pub today: NaiveDate,
    /// Still extendable today: activity happened today or yesterday.
    pub is_active: bool,
    pub missed_days: u32,
    pub repairable: bool,
    pub repair_cost: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreakRepairOutcome {
    pub current_streak: u32,
    pub last_activity_date: NaiveDate,
    pub repair_cost: u32,
    /// Always zero until a points ledger exists.
    pub cost_charged: u32,
}
