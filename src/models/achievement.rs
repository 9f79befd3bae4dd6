use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::events::DomainEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "achievement_category", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AchievementCategory {
    Trails,
    Wiki,
    Questions,
    Certification,
    Engagement,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "achievement_difficulty", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AchievementDifficulty {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "achievement_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AchievementStatus {
    Draft,
    Active,
    Inactive,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "achievement_visibility", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AchievementVisibility {
    Public,
    Secret,
}

/// Trigger configuration, one variant per trigger kind.
///
/// Persisted as jsonb discriminated by the `type` field, so definitions
/// round-trip through the catalog without runtime shape-guessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerConfig {
    CompleteTrails {
        count: i32,
    },
    CompleteTrailsPerfect {
        count: i32,
    },
    CompleteSpecificTrail {
        trail_id: Uuid,
        #[serde(default)]
        perfect_score: bool,
    },
    ReadArticlesCount {
        count: i32,
        #[serde(default)]
        category_id: Option<Uuid>,
    },
    ReadSpecificArticle {
        article_id: Uuid,
    },
    BookmarkArticlesCount {
        count: i32,
    },
    QuestionsAnsweredCount {
        count: i32,
    },
    QuestionAccuracyRate {
        accuracy_percentage: f64,
        minimum_questions: i32,
    },
    CompleteQuizCount {
        count: i32,
    },
    FirstCertificate,
    CertificateHighScore {
        score_percentage: f64,
    },
    FirstLogin,
    OnboardingComplete,
    LoginStreak {
        streak_days: i32,
    },
}

impl TriggerConfig {
    /// The numeric target progress accumulates toward. Boolean-style
    /// triggers use 1 so a single qualifying event completes them.
    pub fn target_value(&self) -> f64 {
        match self {
            Self::CompleteTrails { count }
            | Self::CompleteTrailsPerfect { count }
            | Self::ReadArticlesCount { count, .. }
            | Self::BookmarkArticlesCount { count }
            | Self::QuestionsAnsweredCount { count }
            | Self::CompleteQuizCount { count } => f64::from(*count),
            Self::QuestionAccuracyRate {
                accuracy_percentage, ..
            } => *accuracy_percentage,
            Self::LoginStreak { streak_days } => f64::from(*streak_days),
            Self::CompleteSpecificTrail { .. }
            | Self::ReadSpecificArticle { .. }
            | Self::FirstCertificate
            | Self::CertificateHighScore { .. }
            | Self::FirstLogin
            | Self::OnboardingComplete => 1.0,
        }
    }

    /// Whether an incoming event qualifies for this trigger. Resource,
    /// category, perfection and score conditions are resolved here so the
    /// progress computation only has to accumulate.
    pub fn matches_event(&self, event: &DomainEvent) -> bool {
        match (self, event) {
            (Self::CompleteTrails { .. }, DomainEvent::TrailCompleted { .. }) => true,
            (
                Self::CompleteTrailsPerfect { .. },
                DomainEvent::TrailCompleted { perfect_score, .. },
            ) => *perfect_score,
            (
                Self::CompleteSpecificTrail {
                    trail_id,
                    perfect_score: require_perfect,
                },
                DomainEvent::TrailCompleted {
                    trail_id: completed,
                    perfect_score,
                    ..
                },
            ) => trail_id == completed && (!require_perfect || *perfect_score),
            (
                Self::ReadArticlesCount { category_id, .. },
                DomainEvent::ArticleRead {
                    category_id: event_category,
                    ..
                },
            ) => match category_id {
                Some(required) => event_category.as_ref() == Some(required),
                None => true,
            },
            (
                Self::ReadSpecificArticle { article_id },
                DomainEvent::ArticleRead {
                    article_id: read, ..
                },
            ) => article_id == read,
            (Self::BookmarkArticlesCount { .. }, DomainEvent::BookmarkCreated { .. }) => true,
            (Self::QuestionsAnsweredCount { .. }, DomainEvent::QuestionAnswered { .. }) => true,
            (Self::QuestionAccuracyRate { .. }, DomainEvent::QuestionAnswered { .. }) => true,
            (Self::CompleteQuizCount { .. }, DomainEvent::QuizCompleted { .. }) => true,
            (Self::FirstCertificate, DomainEvent::CertificateEarned { .. }) => true,
            (
                Self::CertificateHighScore { score_percentage },
                DomainEvent::CertificateEarned {
                    score_percentage: scored,
                    ..
                },
            ) => scored >= score_percentage,
            (Self::FirstLogin, DomainEvent::FirstLogin) => true,
            (Self::OnboardingComplete, DomainEvent::OnboardingComplete) => true,
            (Self::LoginStreak { .. }, DomainEvent::LoginStreak { .. }) => true,
            _ => false,
        }
    }
}

/// Catalog entry describing one achievement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementDefinition {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub category: AchievementCategory,
    pub difficulty: AchievementDifficulty,
    pub status: AchievementStatus,
    pub visibility: AchievementVisibility,
    pub trigger: TriggerConfig,
    pub display_order: i32,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-user progress toward one achievement. `is_unlocked` transitions
/// false -> true exactly once; `unlocked_at` is immutable after being set;
/// `notified_at` transitions null -> non-null exactly once per unlock.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserAchievementProgress {
    pub user_id: Uuid,
    pub achievement_id: Uuid,
    pub current_value: f64,
    pub target_value: f64,
    pub progress_percentage: f64,
    pub is_unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
    pub accumulator: serde_json::Value,
    pub notified_at: Option<DateTime<Utc>>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAchievementProgress {
    pub fn new(user_id: Uuid, achievement_id: Uuid, target_value: f64) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            achievement_id,
            current_value: 0.0,
            target_value,
            progress_percentage: 0.0,
            is_unlocked: false,
            unlocked_at: None,
            accumulator: serde_json::json!({}),
            notified_at: None,
            viewed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Running state for accuracy-rate triggers, kept in the progress row's
/// accumulator payload.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AccuracyAccumulator {
    pub correct: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserAchievementView {
    #[serde(flatten)]
    pub progress: UserAchievementProgress,
    pub achievement: AchievementDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationStats {
    pub total_unlocked: usize,
    pub notified: usize,
    pub pending: usize,
    pub viewed: usize,
}
