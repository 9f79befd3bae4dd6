use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::Store;
use crate::error::{EngineError, EngineResult};
use crate::models::achievement::{
    AchievementCategory, AchievementDefinition, AchievementDifficulty, AchievementStatus,
    AchievementVisibility, UserAchievementProgress,
};
use crate::models::activity::DailyActivity;
use crate::models::mission::{Mission, MissionStatus, UserMissionAssignment};
use crate::models::streak::{StreakMilestone, StreakState, UserStreakMilestone};

/// Postgres-backed store. Unique keys declared in the migrations enforce the
/// idempotent-insert semantics; `ON CONFLICT DO NOTHING` reports duplicates
/// as `Ok(false)`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// `achievements` row with the trigger config still encoded as jsonb.
#[derive(FromRow)]
struct AchievementRow {
    id: Uuid,
    slug: String,
    name: String,
    description: String,
    category: AchievementCategory,
    difficulty: AchievementDifficulty,
    status: AchievementStatus,
    visibility: AchievementVisibility,
    trigger_config: serde_json::Value,
    display_order: i32,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AchievementRow {
    fn into_definition(self) -> EngineResult<AchievementDefinition> {
        let trigger = serde_json::from_value(self.trigger_config)
            .map_err(|e| EngineError::Internal(anyhow::anyhow!("bad trigger config: {e}")))?;
        Ok(AchievementDefinition {
            id: self.id,
            slug: self.slug,
            name: self.name,
            description: self.description,
            category: self.category,
            difficulty: self.difficulty,
            status: self.status,
            visibility: self.visibility,
            trigger,
            display_order: self.display_order,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn trigger_json(definition: &AchievementDefinition) -> EngineResult<serde_json::Value> {
    serde_json::to_value(&definition.trigger)
        .map_err(|e| EngineError::Internal(anyhow::anyhow!("trigger config encode: {e}")))
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user_ignore(&self, id: Uuid, name: &str) -> EngineResult<bool> {
        let result = sqlx::query(
            "INSERT INTO users (id, name) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
        )
        .bind(id)
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_user_ids(&self) -> EngineResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn daily_activity(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> EngineResult<Option<DailyActivity>> {
        let row = sqlx::query_as::<_, DailyActivity>(
            "SELECT * FROM user_daily_activities WHERE user_id = $1 AND activity_date = $2",
        )
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_daily_activity(&self, row: &DailyActivity) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_daily_activities
                (id, user_id, activity_date, questions_completed, quizzes_completed,
                 articles_read, trail_content_completed, trails_completed,
                 time_spent_minutes, missions_completed, streak_day, freeze_used,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(row.id)
        .bind(row.user_id)
        .bind(row.activity_date)
        .bind(row.questions_completed)
        .bind(row.quizzes_completed)
        .bind(row.articles_read)
        .bind(row.trail_content_completed)
        .bind(row.trails_completed)
        .bind(row.time_spent_minutes)
        .bind(row.missions_completed)
        .bind(row.streak_day)
        .bind(row.freeze_used)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_daily_activity(&self, row: &DailyActivity) -> EngineResult<()> {
        sqlx::query(
            r#"
            UPDATE user_daily_activities SET
                questions_completed = $2,
                quizzes_completed = $3,
                articles_read = $4,
                trail_content_completed = $5,
                trails_completed = $6,
                time_spent_minutes = $7,
                missions_completed = $8,
                streak_day = $9,
                freeze_used = $10,
                updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(row.id)
        .bind(row.questions_completed)
        .bind(row.quizzes_completed)
        .bind(row.articles_read)
        .bind(row.trail_content_completed)
        .bind(row.trails_completed)
        .bind(row.time_spent_minutes)
        .bind(row.missions_completed)
        .bind(row.streak_day)
        .bind(row.freeze_used)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn daily_activities_since(
        &self,
        user_id: Uuid,
        start: NaiveDate,
    ) -> EngineResult<Vec<DailyActivity>> {
        let rows = sqlx::query_as::<_, DailyActivity>(
            r#"
            SELECT * FROM user_daily_activities
            WHERE user_id = $1 AND activity_date >= $2
            ORDER BY activity_date DESC
            "#,
        )
        .bind(user_id)
        .bind(start)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn increment_missions_completed(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> EngineResult<()> {
        sqlx::query(
            r#"
            UPDATE user_daily_activities
            SET missions_completed = missions_completed + 1, updated_at = NOW()
            WHERE user_id = $1 AND activity_date = $2
            "#,
        )
        .bind(user_id)
        .bind(date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn streak(&self, user_id: Uuid) -> EngineResult<Option<StreakState>> {
        let row = sqlx::query_as::<_, StreakState>("SELECT * FROM user_streaks WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert_streak(&self, row: &StreakState) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_streaks
                (id, user_id, current_streak, longest_streak, last_activity_date,
                 current_streak_start_date, total_active_days, freezes_available,
                 freezes_used, last_freeze_used_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(row.id)
        .bind(row.user_id)
        .bind(row.current_streak)
        .bind(row.longest_streak)
        .bind(row.last_activity_date)
        .bind(row.current_streak_start_date)
        .bind(row.total_active_days)
        .bind(row.freezes_available)
        .bind(row.freezes_used)
        .bind(row.last_freeze_used_at)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_streak(&self, row: &StreakState) -> EngineResult<()> {
        sqlx::query(
            r#"
            UPDATE user_streaks SET
                current_streak = $2,
                longest_streak = $3,
                last_activity_date = $4,
                current_streak_start_date = $5,
                total_active_days = $6,
                freezes_available = $7,
                freezes_used = $8,
                last_freeze_used_at = $9,
                updated_at = $10
            WHERE user_id = $1
            "#,
        )
        .bind(row.user_id)
        .bind(row.current_streak)
        .bind(row.longest_streak)
        .bind(row.last_activity_date)
        .bind(row.current_streak_start_date)
        .bind(row.total_active_days)
        .bind(row.freezes_available)
        .bind(row.freezes_used)
        .bind(row.last_freeze_used_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_freezes(&self, user_id: Uuid, count: i32) -> EngineResult<()> {
        sqlx::query(
            r#"
            UPDATE user_streaks
            SET freezes_available = freezes_available + $2, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn streaks_at_risk(&self, cutoff: NaiveDate) -> EngineResult<Vec<StreakState>> {
        let rows = sqlx::query_as::<_, StreakState>(
            r#"
            SELECT * FROM user_streaks
            WHERE current_streak > 0 AND last_activity_date <= $1
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_milestone_ignore(&self, milestone: &StreakMilestone) -> EngineResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO streak_milestones (id, days, title, description, freeze_reward, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (days) DO NOTHING
            "#,
        )
        .bind(milestone.id)
        .bind(milestone.days)
        .bind(&milestone.title)
        .bind(&milestone.description)
        .bind(milestone.freeze_reward)
        .bind(milestone.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn milestones_up_to(&self, max_days: i32) -> EngineResult<Vec<StreakMilestone>> {
        let rows = sqlx::query_as::<_, StreakMilestone>(
            "SELECT * FROM streak_milestones WHERE days <= $1 ORDER BY days ASC",
        )
        .bind(max_days)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn next_milestone(&self, days: i32) -> EngineResult<Option<StreakMilestone>> {
        let row = sqlx::query_as::<_, StreakMilestone>(
            "SELECT * FROM streak_milestones WHERE days > $1 ORDER BY days ASC LIMIT 1",
        )
        .bind(days)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn user_milestones(
        &self,
        user_id: Uuid,
    ) -> EngineResult<Vec<(UserStreakMilestone, StreakMilestone)>> {
        #[derive(FromRow)]
        struct Row {
            user_id: Uuid,
            milestone_id: Uuid,
            achieved_at: DateTime<Utc>,
            id: Uuid,
            days: i32,
            title: String,
            description: Option<String>,
            freeze_reward: i32,
            created_at: DateTime<Utc>,
        }

        let rows = sqlx::query_as::<_, Row>(
            r#"
            SELECT um.user_id, um.milestone_id, um.achieved_at,
                   m.id, m.days, m.title, m.description, m.freeze_reward, m.created_at
            FROM user_streak_milestones um
            JOIN streak_milestones m ON m.id = um.milestone_id
            WHERE um.user_id = $1
            ORDER BY um.achieved_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    UserStreakMilestone {
                        user_id: r.user_id,
                        milestone_id: r.milestone_id,
                        achieved_at: r.achieved_at,
                    },
                    StreakMilestone {
                        id: r.id,
                        days: r.days,
                        title: r.title,
                        description: r.description,
                        freeze_reward: r.freeze_reward,
                        created_at: r.created_at,
                    },
                )
            })
            .collect())
    }

    async fn insert_user_milestone_ignore(
        &self,
        user_id: Uuid,
        milestone_id: Uuid,
    ) -> EngineResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_streak_milestones (user_id, milestone_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, milestone_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(milestone_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn missions(&self) -> EngineResult<Vec<Mission>> {
        let rows =
            sqlx::query_as::<_, Mission>("SELECT * FROM missions ORDER BY frequency, title")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn active_missions(&self) -> EngineResult<Vec<Mission>> {
        let rows = sqlx::query_as::<_, Mission>(
            "SELECT * FROM missions WHERE status = $1 ORDER BY frequency, title",
        )
        .bind(MissionStatus::Active)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn mission(&self, id: Uuid) -> EngineResult<Option<Mission>> {
        let row = sqlx::query_as::<_, Mission>("SELECT * FROM missions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn mission_by_title(&self, title: &str) -> EngineResult<Option<Mission>> {
        let row = sqlx::query_as::<_, Mission>("SELECT * FROM missions WHERE title = $1")
            .bind(title)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert_mission(&self, mission: &Mission) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO missions
                (id, title, description, mission_type, frequency, status, target_value,
                 valid_from, valid_until, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(mission.id)
        .bind(&mission.title)
        .bind(&mission.description)
        .bind(mission.mission_type)
        .bind(mission.frequency)
        .bind(mission.status)
        .bind(mission.target_value)
        .bind(mission.valid_from)
        .bind(mission.valid_until)
        .bind(mission.created_at)
        .bind(mission.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_mission(&self, mission: &Mission) -> EngineResult<()> {
        sqlx::query(
            r#"
            UPDATE missions SET
                title = $2,
                description = $3,
                mission_type = $4,
                frequency = $5,
                status = $6,
                target_value = $7,
                valid_from = $8,
                valid_until = $9,
                updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(mission.id)
        .bind(&mission.title)
        .bind(&mission.description)
        .bind(mission.mission_type)
        .bind(mission.frequency)
        .bind(mission.status)
        .bind(mission.target_value)
        .bind(mission.valid_from)
        .bind(mission.valid_until)
        .bind(mission.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_mission(&self, id: Uuid) -> EngineResult<bool> {
        let result = sqlx::query("DELETE FROM missions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_assignment_ignore(
        &self,
        assignment: &UserMissionAssignment,
    ) -> EngineResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_missions
                (id, user_id, mission_id, assigned_date, current_progress,
                 is_completed, completed_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (user_id, mission_id, assigned_date) DO NOTHING
            "#,
        )
        .bind(assignment.id)
        .bind(assignment.user_id)
        .bind(assignment.mission_id)
        .bind(assignment.assigned_date)
        .bind(assignment.current_progress)
        .bind(assignment.is_completed)
        .bind(assignment.completed_at)
        .bind(assignment.created_at)
        .bind(assignment.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn assignments_for_date(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        only_incomplete: bool,
    ) -> EngineResult<Vec<(UserMissionAssignment, Mission)>> {
        let assignments = if only_incomplete {
            sqlx::query_as::<_, UserMissionAssignment>(
                r#"
                SELECT * FROM user_missions
                WHERE user_id = $1 AND assigned_date = $2 AND is_completed = FALSE
                "#,
            )
            .bind(user_id)
            .bind(date)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, UserMissionAssignment>(
                "SELECT * FROM user_missions WHERE user_id = $1 AND assigned_date = $2",
            )
            .bind(user_id)
            .bind(date)
            .fetch_all(&self.pool)
            .await?
        };

        let mut rows = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let mission =
                sqlx::query_as::<_, Mission>("SELECT * FROM missions WHERE id = $1")
                    .bind(assignment.mission_id)
                    .fetch_optional(&self.pool)
                    .await?;
            if let Some(mission) = mission {
                rows.push((assignment, mission));
            }
        }
        Ok(rows)
    }

    async fn save_assignment(&self, assignment: &UserMissionAssignment) -> EngineResult<()> {
        sqlx::query(
            r#"
            UPDATE user_missions SET
                current_progress = $2,
                is_completed = $3,
                completed_at = $4,
                updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(assignment.id)
        .bind(assignment.current_progress)
        .bind(assignment.is_completed)
        .bind(assignment.completed_at)
        .bind(assignment.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_achievement_ignore(
        &self,
        definition: &AchievementDefinition,
    ) -> EngineResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO achievements
                (id, slug, name, description, category, difficulty, status, visibility,
                 trigger_config, display_order, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (slug) DO NOTHING
            "#,
        )
        .bind(definition.id)
        .bind(&definition.slug)
        .bind(&definition.name)
        .bind(&definition.description)
        .bind(definition.category)
        .bind(definition.difficulty)
        .bind(definition.status)
        .bind(definition.visibility)
        .bind(trigger_json(definition)?)
        .bind(definition.display_order)
        .bind(definition.created_by)
        .bind(definition.created_at)
        .bind(definition.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn active_achievements(&self) -> EngineResult<Vec<AchievementDefinition>> {
        let rows = sqlx::query_as::<_, AchievementRow>(
            "SELECT * FROM achievements WHERE status = $1 ORDER BY display_order ASC",
        )
        .bind(AchievementStatus::Active)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AchievementRow::into_definition).collect()
    }

    async fn achievement(&self, id: Uuid) -> EngineResult<Option<AchievementDefinition>> {
        let row = sqlx::query_as::<_, AchievementRow>("SELECT * FROM achievements WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(AchievementRow::into_definition).transpose()
    }

    async fn achievement_progress(
        &self,
        user_id: Uuid,
        achievement_id: Uuid,
    ) -> EngineResult<Option<UserAchievementProgress>> {
        let row = sqlx::query_as::<_, UserAchievementProgress>(
            "SELECT * FROM user_achievements WHERE user_id = $1 AND achievement_id = $2",
        )
        .bind(user_id)
        .bind(achievement_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_achievement_progress(
        &self,
        progress: &UserAchievementProgress,
    ) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_achievements
                (user_id, achievement_id, current_value, target_value, progress_percentage,
                 is_unlocked, unlocked_at, accumulator, notified_at, viewed_at,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(progress.user_id)
        .bind(progress.achievement_id)
        .bind(progress.current_value)
        .bind(progress.target_value)
        .bind(progress.progress_percentage)
        .bind(progress.is_unlocked)
        .bind(progress.unlocked_at)
        .bind(&progress.accumulator)
        .bind(progress.notified_at)
        .bind(progress.viewed_at)
        .bind(progress.created_at)
        .bind(progress.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_achievement_progress(
        &self,
        progress: &UserAchievementProgress,
    ) -> EngineResult<()> {
        sqlx::query(
            r#"
            UPDATE user_achievements SET
                current_value = $3,
                target_value = $4,
                progress_percentage = $5,
                is_unlocked = $6,
                unlocked_at = $7,
                accumulator = $8,
                notified_at = $9,
                viewed_at = $10,
                updated_at = $11
            WHERE user_id = $1 AND achievement_id = $2
            "#,
        )
        .bind(progress.user_id)
        .bind(progress.achievement_id)
        .bind(progress.current_value)
        .bind(progress.target_value)
        .bind(progress.progress_percentage)
        .bind(progress.is_unlocked)
        .bind(progress.unlocked_at)
        .bind(&progress.accumulator)
        .bind(progress.notified_at)
        .bind(progress.viewed_at)
        .bind(progress.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn user_achievements(
        &self,
        user_id: Uuid,
    ) -> EngineResult<Vec<(UserAchievementProgress, AchievementDefinition)>> {
        let progress_rows = sqlx::query_as::<_, UserAchievementProgress>(
            r#"
            SELECT ua.* FROM user_achievements ua
            JOIN achievements a ON a.id = ua.achievement_id
            WHERE ua.user_id = $1
            ORDER BY a.display_order ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        self.join_definitions(progress_rows).await
    }

    async fn unnotified_achievements(
        &self,
        user_id: Uuid,
    ) -> EngineResult<Vec<(UserAchievementProgress, AchievementDefinition)>> {
        let progress_rows = sqlx::query_as::<_, UserAchievementProgress>(
            r#"
            SELECT * FROM user_achievements
            WHERE user_id = $1 AND is_unlocked = TRUE AND notified_at IS NULL
            ORDER BY unlocked_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        self.join_definitions(progress_rows).await
    }
}

impl PgStore {
    async fn join_definitions(
        &self,
        progress_rows: Vec<UserAchievementProgress>,
    ) -> EngineResult<Vec<(UserAchievementProgress, AchievementDefinition)>> {
        let mut rows = Vec::with_capacity(progress_rows.len());
        for progress in progress_rows {
            let definition =
                sqlx::query_as::<_, AchievementRow>("SELECT * FROM achievements WHERE id = $1")
                    .bind(progress.achievement_id)
                    .fetch_optional(&self.pool)
                    .await?;
            if let Some(definition) = definition {
                rows.push((progress, definition.into_definition()?));
            }
        }
        Ok(rows)
    }
}
