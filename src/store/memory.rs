use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::Store;
use crate::error::EngineResult;
use crate::models::achievement::{AchievementDefinition, UserAchievementProgress};
use crate::models::activity::DailyActivity;
use crate::models::mission::{Mission, UserMissionAssignment};
use crate::models::streak::{StreakMilestone, StreakState, UserStreakMilestone};

/// In-memory store. Backs the test suite and demo setups; enforces the same
/// unique keys the SQL schema declares.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, String>,
    activities: HashMap<(Uuid, NaiveDate), DailyActivity>,
    streaks: HashMap<Uuid, StreakState>,
    milestones: Vec<StreakMilestone>,
    user_milestones: Vec<UserStreakMilestone>,
    missions: Vec<Mission>,
    assignments: Vec<UserMissionAssignment>,
    achievements: Vec<AchievementDefinition>,
    progress: HashMap<(Uuid, Uuid), UserAchievementProgress>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user_ignore(&self, id: Uuid, name: &str) -> EngineResult<bool> {
        let mut inner = self.inner.write().await;
        if inner.users.contains_key(&id) {
            return Ok(false);
        }
        inner.users.insert(id, name.to_string());
        Ok(true)
    }

    async fn list_user_ids(&self) -> EngineResult<Vec<Uuid>> {
        let inner = self.inner.read().await;
        Ok(inner.users.keys().copied().collect())
    }

    async fn daily_activity(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> EngineResult<Option<DailyActivity>> {
        let inner = self.inner.read().await;
        Ok(inner.activities.get(&(user_id, date)).cloned())
    }

    async fn insert_daily_activity(&self, row: &DailyActivity) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .activities
            .insert((row.user_id, row.activity_date), row.clone());
        Ok(())
    }

    async fn save_daily_activity(&self, row: &DailyActivity) -> EngineResult<()> {
        self.insert_daily_activity(row).await
    }

    async fn daily_activities_since(
        &self,
        user_id: Uuid,
        start: NaiveDate,
    ) -> EngineResult<Vec<DailyActivity>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<DailyActivity> = inner
            .activities
            .values()
            .filter(|a| a.user_id == user_id && a.activity_date >= start)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.activity_date.cmp(&a.activity_date));
        Ok(rows)
    }

    async fn increment_missions_completed(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(activity) = inner.activities.get_mut(&(user_id, date)) {
            activity.missions_completed += 1;
            activity.updated_at = chrono::Utc::now();
        }
        Ok(())
    }

    async fn streak(&self, user_id: Uuid) -> EngineResult<Option<StreakState>> {
        let inner = self.inner.read().await;
        Ok(inner.streaks.get(&user_id).cloned())
    }

    async fn insert_streak(&self, row: &StreakState) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        inner.streaks.insert(row.user_id, row.clone());
        Ok(())
    }

    async fn save_streak(&self, row: &StreakState) -> EngineResult<()> {
        self.insert_streak(row).await
    }

    async fn add_freezes(&self, user_id: Uuid, count: i32) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(streak) = inner.streaks.get_mut(&user_id) {
            streak.freezes_available += count;
            streak.updated_at = chrono::Utc::now();
        }
        Ok(())
    }

    async fn streaks_at_risk(&self, cutoff: NaiveDate) -> EngineResult<Vec<StreakState>> {
        let inner = self.inner.read().await;
        Ok(inner
            .streaks
            .values()
            .filter(|s| s.current_streak > 0 && s.last_activity_date.is_some_and(|d| d <= cutoff))
            .cloned()
            .collect())
    }

    async fn insert_milestone_ignore(&self, milestone: &StreakMilestone) -> EngineResult<bool> {
        let mut inner = self.inner.write().await;
        if inner.milestones.iter().any(|m| m.days == milestone.days) {
            return Ok(false);
        }
        inner.milestones.push(milestone.clone());
        Ok(true)
    }

    async fn milestones_up_to(&self, max_days: i32) -> EngineResult<Vec<StreakMilestone>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<StreakMilestone> = inner
            .milestones
            .iter()
            .filter(|m| m.days <= max_days)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.days);
        Ok(rows)
    }

    async fn next_milestone(&self, days: i32) -> EngineResult<Option<StreakMilestone>> {
        let inner = self.inner.read().await;
        Ok(inner
            .milestones
            .iter()
            .filter(|m| m.days > days)
            .min_by_key(|m| m.days)
            .cloned())
    }

    async fn user_milestones(
        &self,
        user_id: Uuid,
    ) -> EngineResult<Vec<(UserStreakMilestone, StreakMilestone)>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<(UserStreakMilestone, StreakMilestone)> = inner
            .user_milestones
            .iter()
            .filter(|um| um.user_id == user_id)
            .filter_map(|um| {
                inner
                    .milestones
                    .iter()
                    .find(|m| m.id == um.milestone_id)
                    .map(|m| (um.clone(), m.clone()))
            })
            .collect();
        rows.sort_by(|a, b| b.0.achieved_at.cmp(&a.0.achieved_at));
        Ok(rows)
    }

    async fn insert_user_milestone_ignore(
        &self,
        user_id: Uuid,
        milestone_id: Uuid,
    ) -> EngineResult<bool> {
        let mut inner = self.inner.write().await;
        if inner
            .user_milestones
            .iter()
            .any(|um| um.user_id == user_id && um.milestone_id == milestone_id)
        {
            return Ok(false);
        }
        inner.user_milestones.push(UserStreakMilestone {
            user_id,
            milestone_id,
            achieved_at: chrono::Utc::now(),
        });
        Ok(true)
    }

    async fn missions(&self) -> EngineResult<Vec<Mission>> {
        let inner = self.inner.read().await;
        Ok(inner.missions.clone())
    }

    async fn active_missions(&self) -> EngineResult<Vec<Mission>> {
        let inner = self.inner.read().await;
        Ok(inner
            .missions
            .iter()
            .filter(|m| m.status == crate::models::mission::MissionStatus::Active)
            .cloned()
            .collect())
    }

    async fn mission(&self, id: Uuid) -> EngineResult<Option<Mission>> {
        let inner = self.inner.read().await;
        Ok(inner.missions.iter().find(|m| m.id == id).cloned())
    }

    async fn mission_by_title(&self, title: &str) -> EngineResult<Option<Mission>> {
        let inner = self.inner.read().await;
        Ok(inner.missions.iter().find(|m| m.title == title).cloned())
    }

    async fn insert_mission(&self, mission: &Mission) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        inner.missions.push(mission.clone());
        Ok(())
    }

    async fn save_mission(&self, mission: &Mission) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.missions.iter_mut().find(|m| m.id == mission.id) {
            *existing = mission.clone();
        }
        Ok(())
    }

    async fn delete_mission(&self, id: Uuid) -> EngineResult<bool> {
        let mut inner = self.inner.write().await;
        let before = inner.missions.len();
        inner.missions.retain(|m| m.id != id);
        Ok(inner.missions.len() < before)
    }

    async fn insert_assignment_ignore(
        &self,
        assignment: &UserMissionAssignment,
    ) -> EngineResult<bool> {
        let mut inner = self.inner.write().await;
        if inner.assignments.iter().any(|a| {
            a.user_id == assignment.user_id
                && a.mission_id == assignment.mission_id
                && a.assigned_date == assignment.assigned_date
        }) {
            return Ok(false);
        }
        inner.assignments.push(assignment.clone());
        Ok(true)
    }

    async fn assignments_for_date(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        only_incomplete: bool,
    ) -> EngineResult<Vec<(UserMissionAssignment, Mission)>> {
        let inner = self.inner.read().await;
        Ok(inner
            .assignments
            .iter()
            .filter(|a| {
                a.user_id == user_id
                    && a.assigned_date == date
                    && (!only_incomplete || !a.is_completed)
            })
            .filter_map(|a| {
                inner
                    .missions
                    .iter()
                    .find(|m| m.id == a.mission_id)
                    .map(|m| (a.clone(), m.clone()))
            })
            .collect())
    }

    async fn save_assignment(&self, assignment: &UserMissionAssignment) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.assignments.iter_mut().find(|a| a.id == assignment.id) {
            *existing = assignment.clone();
        }
        Ok(())
    }

    async fn insert_achievement_ignore(
        &self,
        definition: &AchievementDefinition,
    ) -> EngineResult<bool> {
        let mut inner = self.inner.write().await;
        if inner.achievements.iter().any(|a| a.slug == definition.slug) {
            return Ok(false);
        }
        inner.achievements.push(definition.clone());
        Ok(true)
    }

    async fn active_achievements(&self) -> EngineResult<Vec<AchievementDefinition>> {
        let inner = self.inner.read().await;
        Ok(inner
            .achievements
            .iter()
            .filter(|a| a.status == crate::models::achievement::AchievementStatus::Active)
            .cloned()
            .collect())
    }

    async fn achievement(&self, id: Uuid) -> EngineResult<Option<AchievementDefinition>> {
        let inner = self.inner.read().await;
        Ok(inner.achievements.iter().find(|a| a.id == id).cloned())
    }

    async fn achievement_progress(
        &self,
        user_id: Uuid,
        achievement_id: Uuid,
    ) -> EngineResult<Option<UserAchievementProgress>> {
        let inner = self.inner.read().await;
        Ok(inner.progress.get(&(user_id, achievement_id)).cloned())
    }

    async fn insert_achievement_progress(
        &self,
        progress: &UserAchievementProgress,
    ) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .progress
            .insert((progress.user_id, progress.achievement_id), progress.clone());
        Ok(())
    }

    async fn save_achievement_progress(
        &self,
        progress: &UserAchievementProgress,
    ) -> EngineResult<()> {
        self.insert_achievement_progress(progress).await
    }

    async fn user_achievements(
        &self,
        user_id: Uuid,
    ) -> EngineResult<Vec<(UserAchievementProgress, AchievementDefinition)>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<(UserAchievementProgress, AchievementDefinition)> = inner
            .progress
            .values()
            .filter(|p| p.user_id == user_id)
            .filter_map(|p| {
                inner
                    .achievements
                    .iter()
                    .find(|a| a.id == p.achievement_id)
                    .map(|a| (p.clone(), a.clone()))
            })
            .collect();
        rows.sort_by_key(|(_, a)| a.display_order);
        Ok(rows)
    }

    async fn unnotified_achievements(
        &self,
        user_id: Uuid,
    ) -> EngineResult<Vec<(UserAchievementProgress, AchievementDefinition)>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<(UserAchievementProgress, AchievementDefinition)> = inner
            .progress
            .values()
            .filter(|p| p.user_id == user_id && p.is_unlocked && p.notified_at.is_none())
            .filter_map(|p| {
                inner
                    .achievements
                    .iter()
                    .find(|a| a.id == p.achievement_id)
                    .map(|a| (p.clone(), a.clone()))
            })
            .collect();
        rows.sort_by_key(|(p, _)| p.unlocked_at);
        Ok(rows)
    }
}
