use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Per-user streak state. Invariants: `longest_streak >= current_streak`,
/// and `current_streak == 0` implies `current_streak_start_date` is null.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StreakState {
    pub id: Uuid,
    pub user_id: Uuid,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_activity_date: Option<NaiveDate>,
    pub current_streak_start_date: Option<NaiveDate>,
    pub total_active_days: i32,
    pub freezes_available: i32,
    pub freezes_used: i32,
    pub last_freeze_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StreakState {
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            current_streak: 0,
            longest_streak: 0,
            last_activity_date: None,
            current_streak_start_date: None,
            total_active_days: 0,
            freezes_available: 0,
            freezes_used: 0,
            last_freeze_used_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Static catalog entry: a streak length that grants a one-time reward.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StreakMilestone {
    pub id: Uuid,
    pub days: i32,
    pub title: String,
    pub description: Option<String>,
    pub freeze_reward: i32,
    pub created_at: DateTime<Utc>,
}

impl StreakMilestone {
    pub fn new(days: i32, title: &str, description: &str, freeze_reward: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            days,
            title: title.to_string(),
            description: Some(description.to_string()),
            freeze_reward,
            created_at: Utc::now(),
        }
    }
}

/// Append-only (user, milestone) join row. Its unique key is the
/// idempotency ledger for milestone rewards.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserStreakMilestone {
    pub user_id: Uuid,
    pub milestone_id: Uuid,
    pub achieved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreakOverview {
    #[serde(flatten)]
    pub streak: StreakState,
    pub can_use_freeze: bool,
    pub days_until_next_milestone: Option<i32>,
    pub next_milestone: Option<StreakMilestone>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AchievedMilestone {
    pub milestone: StreakMilestone,
    pub achieved_at: DateTime<Utc>,
}
