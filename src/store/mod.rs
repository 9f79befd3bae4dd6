mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::achievement::{AchievementDefinition, UserAchievementProgress};
use crate::models::activity::DailyActivity;
use crate::models::mission::{Mission, UserMissionAssignment};
use crate::models::streak::{StreakMilestone, StreakState, UserStreakMilestone};

/// The relational store the engine runs against: point lookups and saves by
/// key, date-filtered scans, and atomic insert-ignore-duplicate primitives.
///
/// `insert_*_ignore` methods return whether a row was actually inserted;
/// a duplicate-key conflict is reported as `Ok(false)`, never as an error.
#[async_trait]
pub trait Store: Send + Sync {
    // ---- users ----

    async fn insert_user_ignore(&self, id: Uuid, name: &str) -> EngineResult<bool>;
    async fn list_user_ids(&self) -> EngineResult<Vec<Uuid>>;

    // ---- daily activities ----

    async fn daily_activity(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> EngineResult<Option<DailyActivity>>;
    async fn insert_daily_activity(&self, row: &DailyActivity) -> EngineResult<()>;
    async fn save_daily_activity(&self, row: &DailyActivity) -> EngineResult<()>;
    /// Activities on or after `start`, newest first.
    async fn daily_activities_since(
        &self,
        user_id: Uuid,
        start: NaiveDate,
    ) -> EngineResult<Vec<DailyActivity>>;
    async fn increment_missions_completed(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> EngineResult<()>;

    // ---- streaks ----

    async fn streak(&self, user_id: Uuid) -> EngineResult<Option<StreakState>>;
    async fn insert_streak(&self, row: &StreakState) -> EngineResult<()>;
    async fn save_streak(&self, row: &StreakState) -> EngineResult<()>;
    async fn add_freezes(&self, user_id: Uuid, count: i32) -> EngineResult<()>;
    /// Streaks with `current_streak > 0` and `last_activity_date <= cutoff`.
    async fn streaks_at_risk(&self, cutoff: NaiveDate) -> EngineResult<Vec<StreakState>>;

    // ---- streak milestones ----

    /// Keyed on the unique `days` threshold.
    async fn insert_milestone_ignore(&self, milestone: &StreakMilestone) -> EngineResult<bool>;
    /// Catalog milestones with `days <= max_days`, ascending.
    async fn milestones_up_to(&self, max_days: i32) -> EngineResult<Vec<StreakMilestone>>;
    /// The closest catalog milestone strictly above `days`.
    async fn next_milestone(&self, days: i32) -> EngineResult<Option<StreakMilestone>>;
    /// Milestones the user has achieved, newest first.
    async fn user_milestones(
        &self,
        user_id: Uuid,
    ) -> EngineResult<Vec<(UserStreakMilestone, StreakMilestone)>>;
    async fn insert_user_milestone_ignore(
        &self,
        user_id: Uuid,
        milestone_id: Uuid,
    ) -> EngineResult<bool>;

    // ---- missions ----

    async fn missions(&self) -> EngineResult<Vec<Mission>>;
    async fn active_missions(&self) -> EngineResult<Vec<Mission>>;
    async fn mission(&self, id: Uuid) -> EngineResult<Option<Mission>>;
    async fn mission_by_title(&self, title: &str) -> EngineResult<Option<Mission>>;
    async fn insert_mission(&self, mission: &Mission) -> EngineResult<()>;
    async fn save_mission(&self, mission: &Mission) -> EngineResult<()>;
    async fn delete_mission(&self, id: Uuid) -> EngineResult<bool>;

    /// Keyed on the unique (user, mission, assigned_date) triple.
    async fn insert_assignment_ignore(
        &self,
        assignment: &UserMissionAssignment,
    ) -> EngineResult<bool>;
    async fn assignments_for_date(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        only_incomplete: bool,
    ) -> EngineResult<Vec<(UserMissionAssignment, Mission)>>;
    async fn save_assignment(&self, assignment: &UserMissionAssignment) -> EngineResult<()>;

    // ---- achievements ----

    /// Keyed on the unique slug.
    async fn insert_achievement_ignore(
        &self,
        definition: &AchievementDefinition,
    ) -> EngineResult<bool>;
    async fn active_achievements(&self) -> EngineResult<Vec<AchievementDefinition>>;
    async fn achievement(&self, id: Uuid) -> EngineResult<Option<AchievementDefinition>>;
    async fn achievement_progress(
        &self,
        user_id: Uuid,
        achievement_id: Uuid,
    ) -> EngineResult<Option<UserAchievementProgress>>;
    async fn insert_achievement_progress(
        &self,
        progress: &UserAchievementProgress,
    ) -> EngineResult<()>;
    async fn save_achievement_progress(
        &self,
        progress: &UserAchievementProgress,
    ) -> EngineResult<()>;
    /// All progress rows for the user, joined with their definitions,
    /// ordered by the definition's display order.
    async fn user_achievements(
        &self,
        user_id: Uuid,
    ) -> EngineResult<Vec<(UserAchievementProgress, AchievementDefinition)>>;
    /// Unlocked rows not yet notified, oldest unlock first.
    async fn unnotified_achievements(
        &self,
        user_id: Uuid,
    ) -> EngineResult<Vec<(UserAchievementProgress, AchievementDefinition)>>;
}
