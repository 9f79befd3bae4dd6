use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::locks::UserLocks;
use crate::models::activity::DailyActivity;
use crate::models::streak::{AchievedMilestone, StreakOverview, StreakState};
use crate::services::missions::MissionService;
use crate::store::Store;

/// Daily streak state machine, freeze inventory and milestone awarding.
#[derive(Clone)]
pub struct StreakService {
    store: Arc<dyn Store>,
    locks: UserLocks,
    missions: MissionService,
}

impl StreakService {
    pub fn new(store: Arc<dyn Store>, locks: UserLocks, missions: MissionService) -> Self {
        Self {
            store,
            locks,
            missions,
        }
    }

    /// The user's streak, created lazily, with next-milestone context.
    pub async fn get_user_streak(&self, user_id: Uuid) -> EngineResult<StreakOverview> {
        let _guard = self.locks.acquire(user_id).await;
        let streak = self.get_or_create_locked(user_id).await?;

        let next_milestone = self.store.next_milestone(streak.current_streak).await?;
        let days_until_next_milestone = next_milestone
            .as_ref()
            .map(|m| m.days - streak.current_streak);

        Ok(StreakOverview {
            can_use_freeze: streak.freezes_available > 0,
            days_until_next_milestone,
            next_milestone,
            streak,
        })
    }

    /// Apply one day's activity to the streak. Idempotent within a day:
    /// the second and later calls for the same date change nothing.
    pub async fn update_for_activity(
        &self,
        user_id: Uuid,
        activity_date: Option<NaiveDate>,
    ) -> EngineResult<StreakState> {
        let _guard = self.locks.acquire(user_id).await;
        let date = activity_date.unwrap_or_else(|| Utc::now().date_naive());
        self.update_for_activity_locked(user_id, date).await
    }

    pub(crate) async fn update_for_activity_locked(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> EngineResult<StreakState> {
        let mut streak = self.get_or_create_locked(user_id).await?;

        // Already counted for this date.
        if streak.last_activity_date == Some(date) {
            return Ok(streak);
        }

        let yesterday = date - Duration::days(1);
        match streak.last_activity_date {
            None => {
                // First activity ever.
                streak.current_streak = 1;
                streak.current_streak_start_date = Some(date);
            }
            Some(last) if last == yesterday => {
                streak.current_streak += 1;
            }
            Some(_) => {
                // Streak lapsed; start over.
                streak.current_streak = 1;
                streak.current_streak_start_date = Some(date);
            }
        }

        streak.longest_streak = streak.longest_streak.max(streak.current_streak);
        streak.total_active_days += 1;
        streak.last_activity_date = Some(date);
        streak.updated_at = Utc::now();
        self.store.save_streak(&streak).await?;

        tracing::debug!(
            user_id = %user_id,
            current_streak = streak.current_streak,
            date = %date,
            "Streak updated"
        );

        // Stamp the streak length onto the day's ledger row when it exists.
        if let Some(mut activity) = self.store.daily_activity(user_id, date).await? {
            activity.streak_day = streak.current_streak;
            activity.updated_at = Utc::now();
            self.store.save_daily_activity(&activity).await?;
        }

        self.check_and_award_milestones(user_id, streak.current_streak)
            .await?;
        self.missions
            .sync_streak_missions_locked(user_id, streak.current_streak, date)
            .await?;

        Ok(streak)
    }

    /// Consume a freeze, optionally marking a specific day as protected.
    pub async fn use_freeze(
        &self,
        user_id: Uuid,
        freeze_date: Option<NaiveDate>,
    ) -> EngineResult<StreakState> {
        let _guard = self.locks.acquire(user_id).await;

        let mut streak = self
            .store
            .streak(user_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("User streak not found".into()))?;

        if streak.freezes_available <= 0 {
            return Err(EngineError::InvalidOperation("No freezes available".into()));
        }

        if let Some(date) = freeze_date {
            match self.store.daily_activity(user_id, date).await? {
                Some(mut activity) => {
                    activity.freeze_used = true;
                    activity.updated_at = Utc::now();
                    self.store.save_daily_activity(&activity).await?;
                }
                None => {
                    let mut activity = DailyActivity::new(user_id, date);
                    activity.freeze_used = true;
                    self.store.insert_daily_activity(&activity).await?;
                }
            }
        }

        streak.freezes_available -= 1;
        streak.freezes_used += 1;
        streak.last_freeze_used_at = Some(Utc::now());
        streak.updated_at = Utc::now();
        self.store.save_streak(&streak).await?;

        tracing::info!(user_id = %user_id, remaining = streak.freezes_available, "Freeze used");
        Ok(streak)
    }

    /// Break streaks for users with no activity for two or more days.
    /// Meant to be invoked by the external daily scheduler.
    pub async fn check_and_break_streaks(&self) -> EngineResult<()> {
        self.check_and_break_streaks_on(Utc::now().date_naive())
            .await
    }

    pub async fn check_and_break_streaks_on(&self, today: NaiveDate) -> EngineResult<()> {
        let cutoff = today - Duration::days(2);
        let at_risk = self.store.streaks_at_risk(cutoff).await?;
        let checked = at_risk.len();
        let mut broken = 0;

        for candidate in at_risk {
            match self.break_if_unprotected(candidate.user_id, today).await {
                Ok(true) => broken += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        user_id = %candidate.user_id,
                        error = %e,
                        "Streak check failed; continuing with next user"
                    );
                }
            }
        }

        tracing::info!(checked, broken, "Streak break check done");
        Ok(())
    }

    /// A freeze on the day immediately after the last activity absorbs
    /// exactly one missed day; anything beyond that breaks the streak.
    async fn break_if_unprotected(&self, user_id: Uuid, today: NaiveDate) -> EngineResult<bool> {
        let _guard = self.locks.acquire(user_id).await;

        let Some(mut streak) = self.store.streak(user_id).await? else {
            return Ok(false);
        };
        if streak.current_streak == 0 {
            return Ok(false);
        }
        let Some(last) = streak.last_activity_date else {
            return Ok(false);
        };

        let day_after = last + Duration::days(1);
        let frozen = self
            .store
            .daily_activity(user_id, day_after)
            .await?
            .map(|a| a.freeze_used)
            .unwrap_or(false);

        let effective_last = if frozen { day_after } else { last };
        if effective_last > today - Duration::days(2) {
            return Ok(false);
        }

        streak.current_streak = 0;
        streak.current_streak_start_date = None;
        streak.updated_at = Utc::now();
        self.store.save_streak(&streak).await?;

        tracing::info!(user_id = %user_id, last_activity = %last, "Streak broken");
        Ok(true)
    }

    /// Milestones the user has achieved, newest first.
    pub async fn get_user_milestones(&self, user_id: Uuid) -> EngineResult<Vec<AchievedMilestone>> {
        let rows = self.store.user_milestones(user_id).await?;
        Ok(rows
            .into_iter()
            .map(|(um, milestone)| AchievedMilestone {
                milestone,
                achieved_at: um.achieved_at,
            })
            .collect())
    }

    /// Grant every newly crossed milestone exactly once. The join-row insert
    /// is the atomicity boundary: a duplicate key means the milestone was
    /// already awarded and the reward must not be credited again.
    pub(crate) async fn check_and_award_milestones(
        &self,
        user_id: Uuid,
        current_streak: i32,
    ) -> EngineResult<()> {
        let reached = self.store.milestones_up_to(current_streak).await?;
        if reached.is_empty() {
            return Ok(());
        }

        let owned: HashSet<Uuid> = self
            .store
            .user_milestones(user_id)
            .await?
            .into_iter()
            .map(|(um, _)| um.milestone_id)
            .collect();

        for milestone in reached {
            if owned.contains(&milestone.id) {
                continue;
            }
            if self
                .store
                .insert_user_milestone_ignore(user_id, milestone.id)
                .await?
            {
                if milestone.freeze_reward > 0 {
                    self.store
                        .add_freezes(user_id, milestone.freeze_reward)
                        .await?;
                }
                tracing::info!(
                    user_id = %user_id,
                    milestone = %milestone.title,
                    days = milestone.days,
                    freeze_reward = milestone.freeze_reward,
                    "Streak milestone awarded"
                );
            }
        }
        Ok(())
    }

    pub(crate) async fn get_or_create_locked(&self, user_id: Uuid) -> EngineResult<StreakState> {
        if let Some(streak) = self.store.streak(user_id).await? {
            return Ok(streak);
        }
        let streak = StreakState::new(user_id);
        self.store.insert_streak(&streak).await?;
        Ok(streak)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::streak::StreakMilestone;
    use crate::store::MemoryStore;

    fn service() -> StreakService {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let locks = UserLocks::new();
        let missions = MissionService::new(store.clone(), locks.clone());
        StreakService::new(store, locks, missions)
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    async fn seed_milestone(service: &StreakService, days: i32, freeze_reward: i32) {
        let milestone =
            StreakMilestone::new(days, &format!("{days} days"), "milestone", freeze_reward);
        service
            .store
            .insert_milestone_ignore(&milestone)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_first_activity_starts_streak() {
        let service = service();
        let user_id = Uuid::new_v4();
        let day = date("2025-03-10");

        let streak = service
            .update_for_activity(user_id, Some(day))
            .await
            .unwrap();

        assert_eq!(streak.current_streak, 1);
        assert_eq!(streak.longest_streak, 1);
        assert_eq!(streak.total_active_days, 1);
        assert_eq!(streak.last_activity_date, Some(day));
        assert_eq!(streak.current_streak_start_date, Some(day));
    }

    #[tokio::test]
    async fn test_same_day_update_is_idempotent() {
        let service = service();
        let user_id = Uuid::new_v4();
        let day = date("2025-03-10");

        let first = service
            .update_for_activity(user_id, Some(day))
            .await
            .unwrap();
        let second = service
            .update_for_activity(user_id, Some(day))
            .await
            .unwrap();

        assert_eq!(second.current_streak, first.current_streak);
        assert_eq!(second.total_active_days, first.total_active_days);
        assert_eq!(second.longest_streak, first.longest_streak);
    }

    #[tokio::test]
    async fn test_consecutive_day_continues_streak() {
        let service = service();
        let user_id = Uuid::new_v4();

        for (i, day) in ["2025-03-10", "2025-03-11", "2025-03-12"].iter().enumerate() {
            let streak = service
                .update_for_activity(user_id, Some(date(day)))
                .await
                .unwrap();
            assert_eq!(streak.current_streak, i as i32 + 1);
        }

        let streak = service.store.streak(user_id).await.unwrap().unwrap();
        assert_eq!(streak.longest_streak, 3);
        assert_eq!(streak.current_streak_start_date, Some(date("2025-03-10")));
    }

    #[tokio::test]
    async fn test_gap_resets_streak_and_keeps_longest() {
        let service = service();
        let user_id = Uuid::new_v4();

        for day in ["2025-03-01", "2025-03-02", "2025-03-03"] {
            service
                .update_for_activity(user_id, Some(date(day)))
                .await
                .unwrap();
        }

        // Three days of silence.
        let streak = service
            .update_for_activity(user_id, Some(date("2025-03-06")))
            .await
            .unwrap();

        assert_eq!(streak.current_streak, 1);
        assert_eq!(streak.longest_streak, 3);
        assert_eq!(streak.current_streak_start_date, Some(date("2025-03-06")));
        assert_eq!(streak.total_active_days, 4);
    }

    #[tokio::test]
    async fn test_milestone_awarded_exactly_once() {
        let service = service();
        let user_id = Uuid::new_v4();
        seed_milestone(&service, 3, 2).await;

        for day in ["2025-03-01", "2025-03-02", "2025-03-03"] {
            service
                .update_for_activity(user_id, Some(date(day)))
                .await
                .unwrap();
        }

        // Duplicate recalculation on the same streak value.
        service
            .check_and_award_milestones(user_id, 3)
            .await
            .unwrap();
        service
            .check_and_award_milestones(user_id, 3)
            .await
            .unwrap();

        let milestones = service.get_user_milestones(user_id).await.unwrap();
        assert_eq!(milestones.len(), 1);
        assert_eq!(milestones[0].milestone.days, 3);

        let streak = service.store.streak(user_id).await.unwrap().unwrap();
        assert_eq!(streak.freezes_available, 2);
    }

    #[tokio::test]
    async fn test_use_freeze_requires_inventory() {
        let service = service();
        let user_id = Uuid::new_v4();

        // No streak row at all.
        assert!(matches!(
            service.use_freeze(user_id, None).await,
            Err(EngineError::NotFound(_))
        ));

        service
            .update_for_activity(user_id, Some(date("2025-03-10")))
            .await
            .unwrap();

        // Streak row exists, but the inventory is empty.
        assert!(matches!(
            service.use_freeze(user_id, None).await,
            Err(EngineError::InvalidOperation(_))
        ));
    }

    #[tokio::test]
    async fn test_use_freeze_marks_day_and_decrements() {
        let service = service();
        let user_id = Uuid::new_v4();
        seed_milestone(&service, 1, 1).await;

        service
            .update_for_activity(user_id, Some(date("2025-03-10")))
            .await
            .unwrap();

        let frozen_day = date("2025-03-11");
        let streak = service
            .use_freeze(user_id, Some(frozen_day))
            .await
            .unwrap();

        assert_eq!(streak.freezes_available, 0);
        assert_eq!(streak.freezes_used, 1);
        assert!(streak.last_freeze_used_at.is_some());

        let activity = service
            .store
            .daily_activity(user_id, frozen_day)
            .await
            .unwrap()
            .unwrap();
        assert!(activity.freeze_used);
        // The freeze row is a placeholder, not an activity.
        assert!(!activity.has_completed_activity());
    }

    #[tokio::test]
    async fn test_freeze_absorbs_exactly_one_missed_day() {
        let service = service();
        let user_id = Uuid::new_v4();
        seed_milestone(&service, 1, 1).await;

        // Active on the 10th, freeze covering the 11th, checker runs the 12th.
        service
            .update_for_activity(user_id, Some(date("2025-03-10")))
            .await
            .unwrap();
        service
            .use_freeze(user_id, Some(date("2025-03-11")))
            .await
            .unwrap();

        service
            .check_and_break_streaks_on(date("2025-03-12"))
            .await
            .unwrap();

        let streak = service.store.streak(user_id).await.unwrap().unwrap();
        assert_eq!(streak.current_streak, 1, "freeze must protect one missed day");

        // One more silent day exceeds what a single freeze covers.
        service
            .check_and_break_streaks_on(date("2025-03-13"))
            .await
            .unwrap();

        let streak = service.store.streak(user_id).await.unwrap().unwrap();
        assert_eq!(streak.current_streak, 0);
        assert_eq!(streak.current_streak_start_date, None);
    }

    #[tokio::test]
    async fn test_unprotected_gap_breaks_streak() {
        let service = service();
        let user_id = Uuid::new_v4();

        service
            .update_for_activity(user_id, Some(date("2025-03-10")))
            .await
            .unwrap();

        // One missed day is still safe on the 11th.
        service
            .check_and_break_streaks_on(date("2025-03-11"))
            .await
            .unwrap();
        let streak = service.store.streak(user_id).await.unwrap().unwrap();
        assert_eq!(streak.current_streak, 1);

        service
            .check_and_break_streaks_on(date("2025-03-12"))
            .await
            .unwrap();
        let streak = service.store.streak(user_id).await.unwrap().unwrap();
        assert_eq!(streak.current_streak, 0);
        assert_eq!(streak.current_streak_start_date, None);
        // Longest streak and counters survive the break.
        assert_eq!(streak.longest_streak, 1);
        assert_eq!(streak.total_active_days, 1);
    }

    #[tokio::test]
    async fn test_get_user_streak_reports_next_milestone() {
        let service = service();
        let user_id = Uuid::new_v4();
        seed_milestone(&service, 3, 1).await;
        seed_milestone(&service, 7, 2).await;

        service
            .update_for_activity(user_id, Some(date("2025-03-10")))
            .await
            .unwrap();
        service
            .update_for_activity(user_id, Some(date("2025-03-11")))
            .await
            .unwrap();

        let overview = service.get_user_streak(user_id).await.unwrap();
        assert_eq!(overview.streak.current_streak, 2);
        assert_eq!(overview.days_until_next_milestone, Some(1));
        assert_eq!(overview.next_milestone.unwrap().days, 3);
        assert!(!overview.can_use_freeze);
    }

    #[tokio::test]
    async fn test_get_user_streak_creates_row_lazily() {
        let service = service();
        let user_id = Uuid::new_v4();

        let overview = service.get_user_streak(user_id).await.unwrap();
        assert_eq!(overview.streak.current_streak, 0);
        assert_eq!(overview.streak.current_streak_start_date, None);
        assert!(service.store.streak(user_id).await.unwrap().is_some());
    }
}
