use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "mission_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MissionType {
    CompleteQuestions,
    CompleteQuiz,
    CompleteTrailContent,
    ReadArticle,
    BookmarkArticles,
    LoginDaily,
    AchieveScore,
    SpendTimeLearning,
    CompleteStreak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "mission_frequency", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MissionFrequency {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "mission_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MissionStatus {
    Active,
    Inactive,
    Archived,
}

impl Default for MissionStatus {
    fn default() -> Self {
        Self::Active
    }
}

/// Catalog entry describing a recurring mission.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Mission {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub mission_type: MissionType,
    pub frequency: MissionFrequency,
    pub status: MissionStatus,
    pub target_value: i32,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Mission {
    /// Whether the mission's validity window (when set) covers `at`.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        if let Some(from) = self.valid_from {
            if at < from {
                return false;
            }
        }
        if let Some(until) = self.valid_until {
            if at > until {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateMissionRequest {
    pub title: String,
    pub description: String,
    pub mission_type: MissionType,
    pub frequency: MissionFrequency,
    pub status: Option<MissionStatus>,
    pub target_value: i32,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateMissionRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub mission_type: Option<MissionType>,
    pub frequency: Option<MissionFrequency>,
    pub status: Option<MissionStatus>,
    pub target_value: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

/// One user's instance of a mission for an assignment period.
/// Unique per (user, mission, assigned_date); never deleted or re-created
/// once present for a period.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserMissionAssignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub mission_id: Uuid,
    pub assigned_date: NaiveDate,
    pub current_progress: i32,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserMissionAssignment {
    pub fn new(user_id: Uuid, mission_id: Uuid, assigned_date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            mission_id,
            assigned_date,
            current_progress: 0,
            is_completed: false,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserMissionView {
    #[serde(flatten)]
    pub assignment: UserMissionAssignment,
    pub mission: Mission,
    pub progress_percentage: i32,
}

/// User missions for the current period, categorized by frequency.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MissionsOverview {
    pub daily: Vec<UserMissionView>,
    pub weekly: Vec<UserMissionView>,
    pub monthly: Vec<UserMissionView>,
}
