use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::locks::UserLocks;
use crate::models::activity::{
    ActivityKind, DailyActivity, DailyActivityView, RecordActivity, WeeklyStats,
};
use crate::services::missions::MissionService;
use crate::services::streaks::StreakService;
use crate::store::Store;

/// The daily activity ledger: one aggregate row per user per UTC calendar
/// day, the substrate streaks and missions read and write.
#[derive(Clone)]
pub struct ActivityService {
    store: Arc<dyn Store>,
    locks: UserLocks,
    streaks: StreakService,
    missions: MissionService,
}

impl ActivityService {
    pub fn new(
        store: Arc<dyn Store>,
        locks: UserLocks,
        streaks: StreakService,
        missions: MissionService,
    ) -> Self {
        Self {
            store,
            locks,
            streaks,
            missions,
        }
    }

    /// Record an activity against today's ledger row, then run the streak
    /// and mission updates as part of the same logical operation.
    pub async fn record_activity(
        &self,
        user_id: Uuid,
        input: RecordActivity,
    ) -> EngineResult<DailyActivityView> {
        self.record_activity_on(user_id, input, Utc::now().date_naive())
            .await
    }

    pub async fn record_activity_on(
        &self,
        user_id: Uuid,
        input: RecordActivity,
        date: NaiveDate,
    ) -> EngineResult<DailyActivityView> {
        let _guard = self.locks.acquire(user_id).await;
        self.record_on_locked(user_id, input, date).await
    }

    pub(crate) async fn record_on_locked(
        &self,
        user_id: Uuid,
        input: RecordActivity,
        date: NaiveDate,
    ) -> EngineResult<DailyActivityView> {
        let mut activity = self.get_or_create_locked(user_id, date).await?;

        apply_activity(&mut activity, &input);
        activity.updated_at = Utc::now();
        self.store.save_daily_activity(&activity).await?;

        tracing::debug!(
            user_id = %user_id,
            kind = ?input.kind,
            date = %date,
            "Activity recorded"
        );

        self.streaks
            .update_for_activity_locked(user_id, date)
            .await?;
        self.missions
            .update_progress_locked(user_id, &input, date)
            .await?;

        // Re-read: the streak and mission steps stamp streak_day and the
        // missions-completed counter onto the same row.
        let activity = self
            .store
            .daily_activity(user_id, date)
            .await?
            .unwrap_or(activity);

        Ok(activity.into())
    }

    /// Today's ledger row, created empty if this is the first touch.
    pub async fn get_today_activity(&self, user_id: Uuid) -> EngineResult<DailyActivityView> {
        let _guard = self.locks.acquire(user_id).await;
        let activity = self
            .get_or_create_locked(user_id, Utc::now().date_naive())
            .await?;
        Ok(activity.into())
    }

    pub async fn get_activity_history(
        &self,
        user_id: Uuid,
        days: i64,
    ) -> EngineResult<Vec<DailyActivity>> {
        let start = Utc::now().date_naive() - Duration::days(days);
        self.store.daily_activities_since(user_id, start).await
    }

    /// Aggregate over the last 7 days.
    pub async fn get_weekly_stats(&self, user_id: Uuid) -> EngineResult<WeeklyStats> {
        let activities = self.get_activity_history(user_id, 7).await?;

        let mut stats = WeeklyStats {
            active_days: activities.len(),
            ..Default::default()
        };
        for activity in &activities {
            stats.questions_completed += activity.questions_completed;
            stats.quizzes_completed += activity.quizzes_completed;
            stats.articles_read += activity.articles_read;
            stats.trail_content_completed += activity.trail_content_completed;
            stats.trails_completed += activity.trails_completed;
            stats.time_spent_minutes += activity.time_spent_minutes;
        }
        Ok(stats)
    }

    async fn get_or_create_locked(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> EngineResult<DailyActivity> {
        if let Some(activity) = self.store.daily_activity(user_id, date).await? {
            return Ok(activity);
        }
        let activity = DailyActivity::new(user_id, date);
        self.store.insert_daily_activity(&activity).await?;
        Ok(activity)
    }
}

fn apply_activity(activity: &mut DailyActivity, input: &RecordActivity) {
    match input.kind {
        ActivityKind::Question => activity.questions_completed += 1,
        ActivityKind::Quiz => activity.quizzes_completed += 1,
        ActivityKind::Article => activity.articles_read += 1,
        ActivityKind::TrailContent => activity.trail_content_completed += 1,
        ActivityKind::TrailCompleted => activity.trails_completed += 1,
        // Bookmarks feed missions but not the daily counters.
        ActivityKind::Bookmark => {}
    }

    if let Some(minutes) = input.metadata.time_spent_minutes {
        activity.time_spent_minutes += minutes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> ActivityService {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let locks = UserLocks::new();
        let missions = MissionService::new(store.clone(), locks.clone());
        let streaks = StreakService::new(store.clone(), locks.clone(), missions.clone());
        ActivityService::new(store, locks, streaks, missions)
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_record_activity_creates_and_increments() {
        let service = service();
        let user_id = Uuid::new_v4();
        let day = date("2025-03-10");

        let mut input = RecordActivity::new(ActivityKind::Question);
        input.metadata.time_spent_minutes = Some(5);

        let view = service
            .record_activity_on(user_id, input, day)
            .await
            .unwrap();
        assert_eq!(view.activity.questions_completed, 1);
        assert_eq!(view.activity.time_spent_minutes, 5);
        assert!(view.has_completed_activity);

        let view = service
            .record_activity_on(user_id, input, day)
            .await
            .unwrap();
        assert_eq!(view.activity.questions_completed, 2);
        assert_eq!(view.activity.time_spent_minutes, 10);
    }

    #[tokio::test]
    async fn test_time_spent_adds_for_any_kind() {
        let service = service();
        let user_id = Uuid::new_v4();
        let day = date("2025-03-10");

        let mut input = RecordActivity::new(ActivityKind::Article);
        input.metadata.time_spent_minutes = Some(12);
        service
            .record_activity_on(user_id, input, day)
            .await
            .unwrap();

        let mut input = RecordActivity::new(ActivityKind::TrailContent);
        input.metadata.time_spent_minutes = Some(8);
        let view = service
            .record_activity_on(user_id, input, day)
            .await
            .unwrap();

        assert_eq!(view.activity.articles_read, 1);
        assert_eq!(view.activity.trail_content_completed, 1);
        assert_eq!(view.activity.time_spent_minutes, 20);
    }

    #[tokio::test]
    async fn test_bookmark_does_not_count_as_activity() {
        let service = service();
        let user_id = Uuid::new_v4();
        let day = date("2025-03-10");

        let view = service
            .record_activity_on(user_id, RecordActivity::new(ActivityKind::Bookmark), day)
            .await
            .unwrap();

        assert!(!view.has_completed_activity);
    }

    #[tokio::test]
    async fn test_record_activity_drives_streak() {
        let service = service();
        let user_id = Uuid::new_v4();

        service
            .record_activity_on(user_id, RecordActivity::new(ActivityKind::Quiz), date("2025-03-10"))
            .await
            .unwrap();
        let view = service
            .record_activity_on(user_id, RecordActivity::new(ActivityKind::Quiz), date("2025-03-11"))
            .await
            .unwrap();

        // The ledger row carries the streak stamp written by the streak step.
        assert_eq!(view.activity.streak_day, 2);

        let streak = service.store.streak(user_id).await.unwrap().unwrap();
        assert_eq!(streak.current_streak, 2);
        assert_eq!(streak.total_active_days, 2);
    }

    #[tokio::test]
    async fn test_weekly_stats_aggregate() {
        let service = service();
        let user_id = Uuid::new_v4();
        let today = Utc::now().date_naive();

        for offset in 0..3 {
            let mut input = RecordActivity::new(ActivityKind::Question);
            input.metadata.time_spent_minutes = Some(10);
            service
                .record_activity_on(user_id, input, today - Duration::days(offset))
                .await
                .unwrap();
        }

        let stats = service.get_weekly_stats(user_id).await.unwrap();
        assert_eq!(stats.questions_completed, 3);
        assert_eq!(stats.time_spent_minutes, 30);
        assert_eq!(stats.active_days, 3);
    }

    #[tokio::test]
    async fn test_get_today_activity_is_lazy_and_stable() {
        let service = service();
        let user_id = Uuid::new_v4();

        let first = service.get_today_activity(user_id).await.unwrap();
        assert!(!first.has_completed_activity);

        let second = service.get_today_activity(user_id).await.unwrap();
        assert_eq!(first.activity.id, second.activity.id);
    }
}
