use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::locks::UserLocks;
use crate::models::activity::{ActivityKind, RecordActivity};
use crate::models::mission::{
    CreateMissionRequest, Mission, MissionFrequency, MissionType, MissionsOverview,
    UpdateMissionRequest, UserMissionAssignment, UserMissionView,
};
use crate::store::Store;

/// Mission assignment and progress tracking.
///
/// Every user gets one assignment per active mission per period key; progress
/// accrues from matching activities. Assignment and completion are both
/// idempotent.
#[derive(Clone)]
pub struct MissionService {
    store: Arc<dyn Store>,
    locks: UserLocks,
}

impl MissionService {
    pub fn new(store: Arc<dyn Store>, locks: UserLocks) -> Self {
        Self { store, locks }
    }

    /// Assign all active missions to a user for the period containing `date`.
    /// Safe to call repeatedly: existing assignments are never duplicated or
    /// reset.
    pub async fn assign_missions_to_user(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> EngineResult<()> {
        let _guard = self.locks.acquire(user_id).await;
        self.assign_locked(user_id, date).await
    }

    pub(crate) async fn assign_locked(&self, user_id: Uuid, date: NaiveDate) -> EngineResult<()> {
        let key = period_key(date);
        let now = Utc::now();

        let active: Vec<Mission> = self
            .store
            .active_missions()
            .await?
            .into_iter()
            .filter(|m| m.is_valid_at(now))
            .collect();

        let existing: HashSet<Uuid> = self
            .store
            .assignments_for_date(user_id, key, false)
            .await?
            .into_iter()
            .map(|(a, _)| a.mission_id)
            .collect();

        let mut assigned = 0;
        for mission in active {
            if existing.contains(&mission.id) {
                continue;
            }
            let assignment = UserMissionAssignment::new(user_id, mission.id, key);
            if self.store.insert_assignment_ignore(&assignment).await? {
                assigned += 1;
            }
        }

        if assigned > 0 {
            tracing::debug!(user_id = %user_id, date = %key, assigned, "Missions assigned");
        }
        Ok(())
    }

    /// Assign missions to every known user. A failure for one user is logged
    /// and does not abort the batch.
    pub async fn assign_missions_to_all_users(&self, date: NaiveDate) -> EngineResult<()> {
        let users = self.store.list_user_ids().await?;
        let total = users.len();
        let mut failed = 0;

        for user_id in users {
            if let Err(e) = self.assign_missions_to_user(user_id, date).await {
                failed += 1;
                tracing::error!(user_id = %user_id, error = %e, "Mission assignment failed");
            }
        }

        tracing::info!(total, failed, date = %period_key(date), "Mission assignment batch done");
        Ok(())
    }

    /// Advance progress on today's incomplete missions matching an activity.
    pub async fn update_mission_progress(
        &self,
        user_id: Uuid,
        activity: &RecordActivity,
    ) -> EngineResult<()> {
        let _guard = self.locks.acquire(user_id).await;
        self.update_progress_locked(user_id, activity, Utc::now().date_naive())
            .await
    }

    pub(crate) async fn update_progress_locked(
        &self,
        user_id: Uuid,
        activity: &RecordActivity,
        date: NaiveDate,
    ) -> EngineResult<()> {
        let key = period_key(date);
        let assignments = self.store.assignments_for_date(user_id, key, true).await?;

        for (mut assignment, mission) in assignments {
            let Some(increment) = progress_increment(&mission, activity) else {
                continue;
            };

            assignment.current_progress += increment;
            assignment.updated_at = Utc::now();

            let completed = assignment.current_progress >= mission.target_value;
            if completed {
                assignment.is_completed = true;
                assignment.completed_at = Some(Utc::now());
            }
            self.store.save_assignment(&assignment).await?;

            if completed {
                self.store.increment_missions_completed(user_id, key).await?;
                tracing::info!(user_id = %user_id, mission = %mission.title, "Mission completed");
            }
        }
        Ok(())
    }

    /// Complete `login_daily` missions. Login is not an activity kind, so it
    /// goes through this explicit path instead of generic matching.
    pub async fn mark_login_mission(&self, user_id: Uuid) -> EngineResult<()> {
        let today = Utc::now().date_naive();
        self.mark_login_mission_on(user_id, today).await
    }

    pub async fn mark_login_mission_on(&self, user_id: Uuid, date: NaiveDate) -> EngineResult<()> {
        let _guard = self.locks.acquire(user_id).await;
        let key = period_key(date);
        let assignments = self.store.assignments_for_date(user_id, key, true).await?;

        for (mut assignment, mission) in assignments {
            if mission.mission_type != MissionType::LoginDaily {
                continue;
            }
            assignment.current_progress = mission.target_value;
            assignment.is_completed = true;
            assignment.completed_at = Some(Utc::now());
            assignment.updated_at = Utc::now();
            self.store.save_assignment(&assignment).await?;
            self.store.increment_missions_completed(user_id, key).await?;
        }
        Ok(())
    }

    /// Mirror the user's streak length into `complete_streak` missions.
    /// Invoked by the streak engine after the daily transition; streak
    /// missions never progress through generic activity matching.
    pub(crate) async fn sync_streak_missions_locked(
        &self,
        user_id: Uuid,
        current_streak: i32,
        date: NaiveDate,
    ) -> EngineResult<()> {
        let key = period_key(date);
        let assignments = self.store.assignments_for_date(user_id, key, true).await?;

        for (mut assignment, mission) in assignments {
            if mission.mission_type != MissionType::CompleteStreak {
                continue;
            }
            assignment.current_progress = current_streak;
            assignment.updated_at = Utc::now();

            let completed = assignment.current_progress >= mission.target_value;
            if completed {
                assignment.is_completed = true;
                assignment.completed_at = Some(Utc::now());
            }
            self.store.save_assignment(&assignment).await?;

            if completed {
                self.store.increment_missions_completed(user_id, key).await?;
                tracing::info!(user_id = %user_id, mission = %mission.title, "Mission completed");
            }
        }
        Ok(())
    }

    /// The user's missions for today, categorized by frequency. Assigns
    /// lazily when the scheduler has not run yet for this period.
    pub async fn get_user_missions(&self, user_id: Uuid) -> EngineResult<MissionsOverview> {
        self.get_user_missions_on(user_id, Utc::now().date_naive())
            .await
    }

    pub async fn get_user_missions_on(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> EngineResult<MissionsOverview> {
        let _guard = self.locks.acquire(user_id).await;
        let key = period_key(date);

        let mut assignments = self.store.assignments_for_date(user_id, key, false).await?;
        if assignments.is_empty() {
            self.assign_locked(user_id, date).await?;
            assignments = self.store.assignments_for_date(user_id, key, false).await?;
        }

        let mut overview = MissionsOverview::default();
        for (assignment, mission) in assignments {
            let view = UserMissionView {
                progress_percentage: progress_percentage(
                    assignment.current_progress,
                    mission.target_value,
                ),
                assignment,
                mission: mission.clone(),
            };
            match mission.frequency {
                MissionFrequency::Daily => overview.daily.push(view),
                MissionFrequency::Weekly => overview.weekly.push(view),
                MissionFrequency::Monthly => overview.monthly.push(view),
            }
        }
        Ok(overview)
    }

    // ---- admin catalog surface ----

    pub async fn list_missions(&self) -> EngineResult<Vec<Mission>> {
        self.store.missions().await
    }

    pub async fn get_mission(&self, id: Uuid) -> EngineResult<Mission> {
        self.store
            .mission(id)
            .await?
            .ok_or_else(|| EngineError::NotFound("Mission not found".into()))
    }

    pub async fn create_mission(&self, request: CreateMissionRequest) -> EngineResult<Mission> {
        let now = Utc::now();
        let mission = Mission {
            id: Uuid::new_v4(),
            title: request.title,
            description: request.description,
            mission_type: request.mission_type,
            frequency: request.frequency,
            status: request.status.unwrap_or_default(),
            target_value: request.target_value,
            valid_from: request.valid_from,
            valid_until: request.valid_until,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_mission(&mission).await?;
        Ok(mission)
    }

    pub async fn update_mission(
        &self,
        id: Uuid,
        request: UpdateMissionRequest,
    ) -> EngineResult<Mission> {
        let mut mission = self.get_mission(id).await?;

        if let Some(title) = request.title {
            mission.title = title;
        }
        if let Some(description) = request.description {
            mission.description = description;
        }
        if let Some(mission_type) = request.mission_type {
            mission.mission_type = mission_type;
        }
        if let Some(frequency) = request.frequency {
            mission.frequency = frequency;
        }
        if let Some(status) = request.status {
            mission.status = status;
        }
        if let Some(target_value) = request.target_value {
            mission.target_value = target_value;
        }
        if let Some(valid_from) = request.valid_from {
            mission.valid_from = Some(valid_from);
        }
        if let Some(valid_until) = request.valid_until {
            mission.valid_until = Some(valid_until);
        }
        mission.updated_at = Utc::now();

        self.store.save_mission(&mission).await?;
        Ok(mission)
    }

    pub async fn delete_mission(&self, id: Uuid) -> EngineResult<()> {
        if !self.store.delete_mission(id).await? {
            return Err(EngineError::NotFound("Mission not found".into()));
        }
        Ok(())
    }
}

/// The assignment-period key for a date. Daily granularity is used for all
/// frequencies; see DESIGN.md for the weekly/monthly discussion.
pub(crate) fn period_key(date: NaiveDate) -> NaiveDate {
    date
}

fn progress_increment(mission: &Mission, activity: &RecordActivity) -> Option<i32> {
    match mission.mission_type {
        MissionType::CompleteQuestions if activity.kind == ActivityKind::Question => Some(1),
        MissionType::CompleteQuiz if activity.kind == ActivityKind::Quiz => Some(1),
        MissionType::ReadArticle if activity.kind == ActivityKind::Article => Some(1),
        MissionType::CompleteTrailContent if activity.kind == ActivityKind::TrailContent => Some(1),
        MissionType::BookmarkArticles if activity.kind == ActivityKind::Bookmark => Some(1),
        MissionType::AchieveScore if activity.kind == ActivityKind::Quiz => {
            activity.metadata.score.filter(|score| *score > 0)
        }
        MissionType::SpendTimeLearning => {
            activity.metadata.time_spent_minutes.filter(|minutes| *minutes > 0)
        }
        // login_daily and complete_streak go through their explicit paths
        _ => None,
    }
}

fn progress_percentage(current: i32, target: i32) -> i32 {
    if target <= 0 {
        return 100;
    }
    let pct = (f64::from(current) / f64::from(target) * 100.0).round() as i32;
    pct.min(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::mission::{MissionFrequency, MissionStatus};
    use crate::store::MemoryStore;

    fn service() -> MissionService {
        MissionService::new(Arc::new(MemoryStore::new()), UserLocks::new())
    }

    fn mission_request(
        title: &str,
        mission_type: MissionType,
        frequency: MissionFrequency,
        target_value: i32,
    ) -> CreateMissionRequest {
        CreateMissionRequest {
            title: title.into(),
            description: format!("{title} mission"),
            mission_type,
            frequency,
            status: None,
            target_value,
            valid_from: None,
            valid_until: None,
        }
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_assignment_is_idempotent_and_preserves_progress() {
        let service = service();
        let user_id = Uuid::new_v4();
        let day = date("2025-03-10");

        service
            .create_mission(mission_request(
                "Answer 3 Questions",
                MissionType::CompleteQuestions,
                MissionFrequency::Daily,
                3,
            ))
            .await
            .unwrap();

        service.assign_missions_to_user(user_id, day).await.unwrap();
        service
            .update_progress_locked(
                user_id,
                &RecordActivity::new(ActivityKind::Question),
                day,
            )
            .await
            .unwrap();

        // Re-assignment must neither duplicate nor reset the in-flight row.
        service.assign_missions_to_user(user_id, day).await.unwrap();

        let overview = service.get_user_missions_on(user_id, day).await.unwrap();
        assert_eq!(overview.daily.len(), 1);
        assert_eq!(overview.daily[0].assignment.current_progress, 1);
        assert_eq!(overview.daily[0].progress_percentage, 33);
    }

    #[tokio::test]
    async fn test_completion_transition_happens_once() {
        let service = service();
        let user_id = Uuid::new_v4();
        let day = date("2025-03-10");

        service
            .create_mission(mission_request(
                "Read 1 Article",
                MissionType::ReadArticle,
                MissionFrequency::Daily,
                1,
            ))
            .await
            .unwrap();
        service.assign_missions_to_user(user_id, day).await.unwrap();

        let read = RecordActivity::new(ActivityKind::Article);
        service
            .update_progress_locked(user_id, &read, day)
            .await
            .unwrap();
        // Further events after completion must not touch the finished row.
        service
            .update_progress_locked(user_id, &read, day)
            .await
            .unwrap();

        let overview = service.get_user_missions_on(user_id, day).await.unwrap();
        assert_eq!(overview.daily.len(), 1);
        let view = &overview.daily[0];
        assert!(view.assignment.is_completed);
        assert_eq!(view.assignment.current_progress, 1);
        assert_eq!(view.progress_percentage, 100);
    }

    #[tokio::test]
    async fn test_score_and_time_missions_use_metric_increments() {
        let service = service();
        let user_id = Uuid::new_v4();
        let day = date("2025-03-10");

        service
            .create_mission(mission_request(
                "Score 50 Points",
                MissionType::AchieveScore,
                MissionFrequency::Weekly,
                50,
            ))
            .await
            .unwrap();
        service
            .create_mission(mission_request(
                "Study for 15 Minutes",
                MissionType::SpendTimeLearning,
                MissionFrequency::Daily,
                15,
            ))
            .await
            .unwrap();
        service.assign_missions_to_user(user_id, day).await.unwrap();

        let mut quiz = RecordActivity::new(ActivityKind::Quiz);
        quiz.metadata.score = Some(30);
        quiz.metadata.time_spent_minutes = Some(10);
        service
            .update_progress_locked(user_id, &quiz, day)
            .await
            .unwrap();

        let overview = service.get_user_missions_on(user_id, day).await.unwrap();
        let score = &overview.weekly[0];
        assert_eq!(score.assignment.current_progress, 30);
        assert_eq!(score.progress_percentage, 60);
        let time = &overview.daily[0];
        assert_eq!(time.assignment.current_progress, 10);
        assert!(!time.assignment.is_completed);
    }

    #[tokio::test]
    async fn test_login_mission_completes_via_explicit_call() {
        let service = service();
        let user_id = Uuid::new_v4();
        let day = date("2025-03-10");

        service
            .create_mission(mission_request(
                "Daily Login",
                MissionType::LoginDaily,
                MissionFrequency::Daily,
                1,
            ))
            .await
            .unwrap();
        service.assign_missions_to_user(user_id, day).await.unwrap();

        // Generic activity matching must not complete login missions.
        service
            .update_progress_locked(
                user_id,
                &RecordActivity::new(ActivityKind::Question),
                day,
            )
            .await
            .unwrap();
        let overview = service.get_user_missions_on(user_id, day).await.unwrap();
        assert!(!overview.daily[0].assignment.is_completed);

        service.mark_login_mission_on(user_id, day).await.unwrap();
        let overview = service.get_user_missions_on(user_id, day).await.unwrap();
        assert!(overview.daily[0].assignment.is_completed);
    }

    #[tokio::test]
    async fn test_lazy_assignment_on_read() {
        let service = service();
        let user_id = Uuid::new_v4();
        let day = date("2025-03-10");

        service
            .create_mission(mission_request(
                "Read 1 Article",
                MissionType::ReadArticle,
                MissionFrequency::Daily,
                1,
            ))
            .await
            .unwrap();

        // No scheduler ran; reading assigns on the fly.
        let overview = service.get_user_missions_on(user_id, day).await.unwrap();
        assert_eq!(overview.daily.len(), 1);
        assert_eq!(overview.daily[0].assignment.current_progress, 0);
    }

    #[tokio::test]
    async fn test_inactive_missions_are_not_assigned() {
        let service = service();
        let user_id = Uuid::new_v4();
        let day = date("2025-03-10");

        let mission = service
            .create_mission(mission_request(
                "Old Mission",
                MissionType::ReadArticle,
                MissionFrequency::Daily,
                1,
            ))
            .await
            .unwrap();
        service
            .update_mission(
                mission.id,
                UpdateMissionRequest {
                    status: Some(MissionStatus::Archived),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let overview = service.get_user_missions_on(user_id, day).await.unwrap();
        assert!(overview.daily.is_empty());
    }

    #[tokio::test]
    async fn test_mission_crud_not_found() {
        let service = service();
        let missing = Uuid::new_v4();

        assert!(matches!(
            service.get_mission(missing).await,
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            service.delete_mission(missing).await,
            Err(EngineError::NotFound(_))
        ));
    }
}
