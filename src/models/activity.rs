use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One row per (user, UTC calendar day). Created lazily on the first
/// activity of the day, mutated by every subsequent one, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DailyActivity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub activity_date: NaiveDate,
    pub questions_completed: i32,
    pub quizzes_completed: i32,
    pub articles_read: i32,
    pub trail_content_completed: i32,
    pub trails_completed: i32,
    pub time_spent_minutes: i32,
    pub missions_completed: i32,
    pub streak_day: i32,
    pub freeze_used: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DailyActivity {
    pub fn new(user_id: Uuid, activity_date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            activity_date,
            questions_completed: 0,
            quizzes_completed: 0,
            articles_read: 0,
            trail_content_completed: 0,
            trails_completed: 0,
            time_spent_minutes: 0,
            missions_completed: 0,
            streak_day: 0,
            freeze_used: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether any counted activity happened on this day. Freeze use and
    /// time spent alone do not count.
    pub fn has_completed_activity(&self) -> bool {
        self.questions_completed > 0
            || self.quizzes_completed > 0
            || self.articles_read > 0
            || self.trail_content_completed > 0
            || self.trails_completed > 0
    }
}

/// The kind of activity being recorded against the daily ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Question,
    Quiz,
    Article,
    TrailContent,
    TrailCompleted,
    /// Tracked by bookmark missions but not counted in the daily stats.
    Bookmark,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ActivityMetadata {
    pub question_id: Option<Uuid>,
    pub quiz_id: Option<Uuid>,
    pub article_id: Option<Uuid>,
    pub trail_content_id: Option<Uuid>,
    pub trail_id: Option<Uuid>,
    pub score: Option<i32>,
    pub time_spent_minutes: Option<i32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RecordActivity {
    pub kind: ActivityKind,
    #[serde(default)]
    pub metadata: ActivityMetadata,
}

impl RecordActivity {
    pub fn new(kind: ActivityKind) -> Self {
        Self {
            kind,
            metadata: ActivityMetadata::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyActivityView {
    #[serde(flatten)]
    pub activity: DailyActivity,
    pub has_completed_activity: bool,
}

impl From<DailyActivity> for DailyActivityView {
    fn from(activity: DailyActivity) -> Self {
        let has_completed_activity = activity.has_completed_activity();
        Self {
            activity,
            has_completed_activity,
        }
    }
}

/// Aggregate over the last 7 calendar days.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WeeklyStats {
    pub questions_completed: i32,
    pub quizzes_completed: i32,
    pub articles_read: i32,
    pub trail_content_completed: i32,
    pub trails_completed: i32,
    pub time_spent_minutes: i32,
    pub active_days: usize,
}
