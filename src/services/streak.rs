// src/services/streak.rs

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::{
    error::AppError,
    models::streak::{StreakRecord, StreakRepairOutcome, StreakStatus},
    repository::StreakRepository,
    services::calendar::{days_between, local_date_of},
};

/// Applies one qualifying activity on local day `today`.
pub fn advance(mut record: StreakRecord, today: NaiveDate) -> StreakRecord {
    let next = match record.last_activity_date {
        None => 1,
        Some(last) => match days_between(last, today) {
            // Same day (or a clock that went backwards): counted already.
            gap if gap <= 0 => return record,
            1 => record.current_streak + 1,
            _ => 1,
        },
    };
    record.current_streak = next;
    record.longest_streak = record.longest_streak.max(record.current_streak);
    record.last_activity_date = Some(today);
    record
}

/// Local days skipped since the last activity. Zero while the streak is intact.
fn missed_days(record: &StreakRecord, today: NaiveDate) -> u32 {
    record
        .last_activity_date
        .map(|last| (days_between(last, today) - 1).max(0))
        .and_then(|missed| u32::try_from(missed).ok())
        .unwrap_or(0)
}

/// Compare-and-swap rounds before a streak write is reported as contended.
const MAX_WRITE_ATTEMPTS: usize = 5;

fn is_repairable(record: &StreakRecord, today: NaiveDate) -> bool {
    record.current_streak > 0
        && missed_days(record, today) == 1
        && record.streak_repaired_at != Some(today)
}

pub struct StreakTracker {
    streaks: Arc<dyn StreakRepository>,
    repair_cost: u32,
}

impl StreakTracker {
    pub fn new(streaks: Arc<dyn StreakRepository>, repair_cost: u32) -> Self {
        Self {
            streaks,
            repair_cost,
        }
    }

    async fn load(&self, user_id: i64) -> Result<StreakRecord, AppError> {
        Ok(self
            .streaks
            .find_streak(user_id)
            .await?
            .unwrap_or_else(|| StreakRecord::empty(user_id)))
    }

    /// Records a qualifying activity. Repeated activity on the same local day is a no-op.
    ///
    /// The write only lands if the row is unchanged since it was read; a lost race is
    /// re-read and re-applied, so concurrent activity and repairs never overwrite each other.
    pub async fn update_streak(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<StreakRecord, AppError> {
        let today = local_date_of(now);

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let stored = self.streaks.find_streak(user_id).await?;
            let before = stored.clone().unwrap_or_else(|| StreakRecord::empty(user_id));
            let after = advance(before.clone(), today);

            if after == before {
                return Ok(after);
            }
            if !self.streaks.replace_streak(stored.as_ref(), &after).await? {
                continue;
            }

            if after.current_streak == 1 && before.current_streak > 1 {
                tracing::info!(
                    user_id,
                    lost = before.current_streak,
                    "Streak reset after a gap"
                );
            }
            return Ok(after);
        }

        Err(contended(user_id))
    }

    pub async fn get_status(&self, user_id: i64, now: DateTime<Utc>) -> Result<StreakStatus, AppError> {
        let today = local_date_of(now);
        let record = self.load(user_id).await?;

        let is_active = record
            .last_activity_date
            .is_some_and(|last| days_between(last, today) <= 1);

        Ok(StreakStatus {
            current_streak: record.current_streak,
            longest_streak: record.longest_streak,
            last_activity_date: record.last_activity_date,
            today,
            is_active,
            missed_days: missed_days(&record, today),
            repairable: is_repairable(&record, today),
            repair_cost: self.repair_cost,
        })
    }

    /// Bridges exactly one missed day by moving the last activity to yesterday, so the
    /// next activity continues the streak. The cost is reported but not charged.
    pub async fn repair(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<StreakRepairOutcome, AppError> {
        let today = local_date_of(now);

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let Some(stored) = self.streaks.find_streak(user_id).await? else {
                return Err(AppError::Conflict("There is no streak to repair".to_string()));
            };
            let record = repaired(&stored, today)?;
            if !self.streaks.replace_streak(Some(&stored), &record).await? {
                continue;
            }

            tracing::info!(
                user_id,
                streak = record.current_streak,
                cost = self.repair_cost,
                "Streak repaired"
            );

            return Ok(StreakRepairOutcome {
                current_streak: record.current_streak,
                last_activity_date: today - Duration::days(1),
                repair_cost: self.repair_cost,
                cost_charged: 0,
            });
        }

        Err(contended(user_id))
    }
}

/// The record after bridging one missed day, or why it cannot be bridged.
fn repaired(record: &StreakRecord, today: NaiveDate) -> Result<StreakRecord, AppError> {
    if record.last_activity_date.is_none() || record.current_streak == 0 {
        return Err(AppError::Conflict("There is no streak to repair".to_string()));
    }
    match missed_days(record, today) {
        0 => return Err(AppError::Conflict("Streak is not broken".to_string())),
        1 => {}
        _ => {
            return Err(AppError::Conflict(
                "Too many days missed, the streak cannot be repaired".to_string(),
            ));
        }
    }
    if record.streak_repaired_at == Some(today) {
        return Err(AppError::Conflict(
            "A streak repair was already used today".to_string(),
        ));
    }

    Ok(StreakRecord {
        last_activity_date: Some(today - Duration::days(1)),
        streak_repaired_at: Some(today),
        ..record.clone()
    })
}

fn contended(user_id: i64) -> AppError {
    tracing::warn!(user_id, "Streak write kept losing to concurrent updates");
    AppError::Conflict("Streak is being updated, try again".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryStore;
    use crate::services::calendar::start_of_local_day;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    /// Mid-morning on local day `d`.
    fn at(d: u32) -> DateTime<Utc> {
        start_of_local_day(day(d)) + Duration::hours(10)
    }

    fn tracker() -> StreakTracker {
        StreakTracker::new(Arc::new(MemoryStore::new()), 50)
    }

    #[test]
    fn test_advance_rules() {
        let first = advance(StreakRecord::empty(1), day(1));
        assert_eq!(first.current_streak, 1);
        assert_eq!(first.last_activity_date, Some(day(1)));

        let same_day = advance(first.clone(), day(1));
        assert_eq!(same_day, first);

        let next = advance(first, day(2));
        assert_eq!(next.current_streak, 2);
        assert_eq!(next.longest_streak, 2);

        let gap = advance(next, day(5));
        assert_eq!(gap.current_streak, 1);
        assert_eq!(gap.longest_streak, 2);
    }

    #[tokio::test]
    async fn test_three_consecutive_days() {
        let tracker = tracker();
        for d in 1..=3 {
            tracker.update_streak(7, at(d)).await.unwrap();
            // A second activity the same day changes nothing.
            tracker.update_streak(7, at(d) + Duration::hours(2)).await.unwrap();
        }
        let status = tracker.get_status(7, at(3)).await.unwrap();
        assert_eq!(status.current_streak, 3);
        assert_eq!(status.longest_streak, 3);
        assert!(status.is_active);
        assert!(!status.repairable);
    }

    #[tokio::test]
    async fn test_gap_resets_but_keeps_longest() {
        let tracker = tracker();
        for d in 1..=4 {
            tracker.update_streak(7, at(d)).await.unwrap();
        }
        let record = tracker.update_streak(7, at(6)).await.unwrap();
        assert_eq!(record.current_streak, 1);
        assert_eq!(record.longest_streak, 4);
    }

    #[tokio::test]
    async fn test_late_night_counts_for_local_day() {
        let tracker = tracker();
        // 23:30 local on day 1, then 00:30 local on day 2.
        let late = start_of_local_day(day(2)) - Duration::minutes(30);
        let early = start_of_local_day(day(2)) + Duration::minutes(30);
        tracker.update_streak(7, late).await.unwrap();
        let record = tracker.update_streak(7, early).await.unwrap();
        assert_eq!(record.current_streak, 2);
    }

    #[tokio::test]
    async fn test_one_missed_day_is_repairable() {
        let tracker = tracker();
        tracker.update_streak(7, at(1)).await.unwrap();
        tracker.update_streak(7, at(2)).await.unwrap();

        let status = tracker.get_status(7, at(4)).await.unwrap();
        assert_eq!(status.missed_days, 1);
        assert!(status.repairable);
        assert!(!status.is_active);

        let outcome = tracker.repair(7, at(4)).await.unwrap();
        assert_eq!(outcome.current_streak, 2);
        assert_eq!(outcome.last_activity_date, day(3));
        assert_eq!(outcome.repair_cost, 50);
        assert_eq!(outcome.cost_charged, 0);

        // The next activity continues the streak instead of resetting it.
        let record = tracker.update_streak(7, at(4)).await.unwrap();
        assert_eq!(record.current_streak, 3);
    }

    #[tokio::test]
    async fn test_two_missed_days_are_not_repairable() {
        let tracker = tracker();
        tracker.update_streak(7, at(1)).await.unwrap();

        let status = tracker.get_status(7, at(4)).await.unwrap();
        assert_eq!(status.missed_days, 2);
        assert!(!status.repairable);

        let err = tracker.repair(7, at(4)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_unbroken_streak_is_not_repairable() {
        let tracker = tracker();
        tracker.update_streak(7, at(1)).await.unwrap();
        assert!(matches!(tracker.repair(7, at(2)).await, Err(AppError::Conflict(_))));
        assert!(matches!(tracker.repair(8, at(2)).await, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_one_repair_per_day() {
        let tracker = tracker();
        tracker.update_streak(7, at(1)).await.unwrap();
        tracker.repair(7, at(3)).await.unwrap();

        // Now intact again, so a second repair on the same day is refused.
        assert!(matches!(tracker.repair(7, at(3)).await, Err(AppError::Conflict(_))));
        let status = tracker.get_status(7, at(3)).await.unwrap();
        assert!(!status.repairable);
        assert!(status.is_active);
    }

    #[tokio::test]
    async fn test_stale_write_is_refused() {
        let store = MemoryStore::new();
        let first = advance(StreakRecord::empty(7), day(1));
        assert!(store.replace_streak(None, &first).await.unwrap());
        // A second writer that also saw no row loses.
        assert!(!store.replace_streak(None, &first).await.unwrap());

        let next = advance(first.clone(), day(2));
        assert!(store.replace_streak(Some(&first), &next).await.unwrap());

        let late_repair = StreakRecord {
            last_activity_date: Some(day(2)),
            streak_repaired_at: Some(day(3)),
            ..first.clone()
        };
        assert!(!store.replace_streak(Some(&first), &late_repair).await.unwrap());
        assert_eq!(store.find_streak(7).await.unwrap(), Some(next));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_repair_racing_activity_keeps_today() {
        for _ in 0..20 {
            let tracker = Arc::new(tracker());
            tracker.update_streak(7, at(1)).await.unwrap();

            let activity = {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.update_streak(7, at(3)).await })
            };
            let repair = {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.repair(7, at(3)).await })
            };
            let activity = activity.await.unwrap().unwrap();
            // Repair loses with a conflict when the activity landed first.
            let _ = repair.await.unwrap();

            let status = tracker.get_status(7, at(3)).await.unwrap();
            assert_eq!(status.last_activity_date, Some(day(3)));
            assert_eq!(status.current_streak, activity.current_streak);
        }
    }
}
