//! Gamification progress-tracking engine: converts domain events into
//! durable state changes (daily activity, streaks, milestone rewards,
//! mission progress, achievement unlocks) with idempotent, at-most-once
//! semantics on UTC day boundaries.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod locks;
pub mod models;
pub mod seed;
pub mod services;
pub mod store;

use error::EngineResult;
use events::DomainEvent;
use locks::UserLocks;
use services::{
    AchievementService, ActivityService, MissionService, NotificationService, StreakService,
};
use store::Store;

/// The engine facade: all services wired over one store and one per-user
/// lock registry.
#[derive(Clone)]
pub struct Engine {
    pub activity: ActivityService,
    pub streaks: StreakService,
    pub missions: MissionService,
    pub achievements: AchievementService,
    pub notifications: NotificationService,
    store: Arc<dyn Store>,
    locks: UserLocks,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let locks = UserLocks::new();
        let missions = MissionService::new(store.clone(), locks.clone());
        let streaks = StreakService::new(store.clone(), locks.clone(), missions.clone());
        let activity = ActivityService::new(
            store.clone(),
            locks.clone(),
            streaks.clone(),
            missions.clone(),
        );
        let achievements = AchievementService::new(store.clone(), locks.clone());
        let notifications = NotificationService::new(store.clone(), locks.clone());

        Self {
            activity,
            streaks,
            missions,
            achievements,
            notifications,
            store,
            locks,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run the full pipeline for one domain event under the user's lock:
    /// ledger, streak and mission updates for events that map to an
    /// activity, then achievement evaluation for every event.
    pub async fn process_event(&self, user_id: Uuid, event: &DomainEvent) -> EngineResult<()> {
        self.process_event_on(user_id, event, Utc::now().date_naive())
            .await
    }

    pub async fn process_event_on(
        &self,
        user_id: Uuid,
        event: &DomainEvent,
        date: NaiveDate,
    ) -> EngineResult<()> {
        let _guard = self.locks.acquire(user_id).await;

        if let Some(input) = event.activity() {
            self.activity.record_on_locked(user_id, input, date).await?;
        }
        self.achievements.handle_event_locked(user_id, event).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::activity::{ActivityKind, RecordActivity};
    use crate::store::MemoryStore;

    fn engine() -> Engine {
        Engine::new(Arc::new(MemoryStore::new()))
    }

    async fn seeded_engine() -> Engine {
        let engine = engine();
        seed::run(engine.store().as_ref()).await.unwrap();
        engine
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn article_read() -> DomainEvent {
        DomainEvent::ArticleRead {
            article_id: Uuid::new_v4(),
            category_id: None,
        }
    }

    #[tokio::test]
    async fn test_event_flows_through_ledger_missions_and_achievements() {
        let engine = seeded_engine().await;
        let user_id = Uuid::new_v4();
        let day = date("2025-03-10");

        engine.missions.assign_missions_to_user(user_id, day).await.unwrap();
        engine
            .process_event_on(user_id, &article_read(), day)
            .await
            .unwrap();

        // Ledger counted the read.
        let activity = engine
            .store()
            .daily_activity(user_id, day)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(activity.articles_read, 1);
        assert_eq!(activity.streak_day, 1);

        // Streak started.
        let streak = engine.store().streak(user_id).await.unwrap().unwrap();
        assert_eq!(streak.current_streak, 1);

        // The seeded "Read 1 Article" daily mission completed, and the
        // completion was credited back to the ledger.
        let overview = engine
            .missions
            .get_user_missions_on(user_id, day)
            .await
            .unwrap();
        let read_mission = overview
            .daily
            .iter()
            .find(|v| v.mission.title == "Read 1 Article")
            .unwrap();
        assert!(read_mission.assignment.is_completed);
        let activity = engine
            .store()
            .daily_activity(user_id, day)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(activity.missions_completed, 1);

        // The seeded "First Read" achievement unlocked and is queued.
        let pending = engine.notifications.list_unnotified(user_id).await.unwrap();
        assert!(pending
            .iter()
            .any(|view| view.achievement.slug == "first-article"));
    }

    #[tokio::test]
    async fn test_streak_milestone_rewards_flow_into_freeze_inventory() {
        let engine = seeded_engine().await;
        let user_id = Uuid::new_v4();

        for day in ["2025-03-01", "2025-03-02", "2025-03-03"] {
            engine
                .process_event_on(user_id, &article_read(), date(day))
                .await
                .unwrap();
        }

        // The 3-day milestone grants one freeze, exactly once.
        let overview = engine.streaks.get_user_streak(user_id).await.unwrap();
        assert_eq!(overview.streak.current_streak, 3);
        assert_eq!(overview.streak.freezes_available, 1);
        assert!(overview.can_use_freeze);

        let milestones = engine.streaks.get_user_milestones(user_id).await.unwrap();
        assert_eq!(milestones.len(), 1);
        assert_eq!(milestones[0].milestone.days, 3);
    }

    #[tokio::test]
    async fn test_non_activity_events_only_touch_achievements() {
        let engine = seeded_engine().await;
        let user_id = Uuid::new_v4();
        let day = date("2025-03-10");

        engine
            .process_event_on(user_id, &DomainEvent::FirstLogin, day)
            .await
            .unwrap();

        // No ledger row and no streak from a bare login event.
        assert!(engine
            .store()
            .daily_activity(user_id, day)
            .await
            .unwrap()
            .is_none());
        assert!(engine.store().streak(user_id).await.unwrap().is_none());

        let views = engine.achievements.get_user_achievements(user_id).await.unwrap();
        let first_login = views
            .iter()
            .find(|v| v.achievement.slug == "first-login")
            .unwrap();
        assert!(first_login.progress.is_unlocked);
    }

    #[tokio::test]
    async fn test_concurrent_events_for_same_user_do_not_lose_updates() {
        let engine = seeded_engine().await;
        let user_id = Uuid::new_v4();
        let day = date("2025-03-10");

        let mut handles = Vec::new();
        for _ in 0..10 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .activity
                    .record_activity_on(
                        user_id,
                        RecordActivity::new(ActivityKind::Question),
                        day,
                    )
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let activity = engine
            .store()
            .daily_activity(user_id, day)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(activity.questions_completed, 10);

        // The streak counted the day once despite ten updates.
        let streak = engine.store().streak(user_id).await.unwrap().unwrap();
        assert_eq!(streak.current_streak, 1);
        assert_eq!(streak.total_active_days, 1);
    }

    #[tokio::test]
    async fn test_batch_jobs_cover_seeded_users() {
        let engine = seeded_engine().await;
        let user_id = Uuid::new_v4();
        engine
            .store()
            .insert_user_ignore(user_id, "learner")
            .await
            .unwrap();

        let day = date("2025-03-10");
        engine.missions.assign_missions_to_all_users(day).await.unwrap();

        let overview = engine
            .missions
            .get_user_missions_on(user_id, day)
            .await
            .unwrap();
        assert_eq!(overview.daily.len(), 4);
        assert_eq!(overview.weekly.len(), 5);
        assert_eq!(overview.monthly.len(), 5);
    }
}
