use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::activity::{ActivityKind, ActivityMetadata, RecordActivity};

/// A domain event emitted by a content module after its own transactional
/// work commits. Dispatched by exhaustive matching; each variant carries
/// the concrete payload its consumers need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    TrailCompleted {
        trail_id: Uuid,
        score: i32,
        perfect_score: bool,
    },
    TrailContentCompleted {
        trail_content_id: Uuid,
    },
    ArticleRead {
        article_id: Uuid,
        category_id: Option<Uuid>,
    },
    QuestionAnswered {
        question_id: Uuid,
        is_correct: bool,
    },
    QuizCompleted {
        quiz_id: Uuid,
        score: i32,
        total_questions: i32,
    },
    CertificateEarned {
        certificate_id: Uuid,
        score_percentage: f64,
    },
    BookmarkCreated {
        article_id: Uuid,
    },
    FirstLogin,
    OnboardingComplete,
    LoginStreak {
        current_streak: i32,
    },
}

impl DomainEvent {
    /// The activity-ledger entry this event maps to, if any. Login,
    /// onboarding, streak and certificate events reach the achievement
    /// engine but are not daily activities themselves.
    pub fn activity(&self) -> Option<RecordActivity> {
        match self {
            Self::TrailCompleted { trail_id, score, .. } => Some(RecordActivity {
                kind: ActivityKind::TrailCompleted,
                metadata: ActivityMetadata {
                    trail_id: Some(*trail_id),
                    score: Some(*score),
                    ..Default::default()
                },
            }),
            Self::TrailContentCompleted { trail_content_id } => Some(RecordActivity {
                kind: ActivityKind::TrailContent,
                metadata: ActivityMetadata {
                    trail_content_id: Some(*trail_content_id),
                    ..Default::default()
                },
            }),
            Self::ArticleRead { article_id, .. } => Some(RecordActivity {
                kind: ActivityKind::Article,
                metadata: ActivityMetadata {
                    article_id: Some(*article_id),
                    ..Default::default()
                },
            }),
            Self::QuestionAnswered { question_id, .. } => Some(RecordActivity {
                kind: ActivityKind::Question,
                metadata: ActivityMetadata {
                    question_id: Some(*question_id),
                    ..Default::default()
                },
            }),
            Self::QuizCompleted { quiz_id, score, .. } => Some(RecordActivity {
                kind: ActivityKind::Quiz,
                metadata: ActivityMetadata {
                    quiz_id: Some(*quiz_id),
                    score: Some(*score),
                    ..Default::default()
                },
            }),
            Self::BookmarkCreated { article_id } => Some(RecordActivity {
                kind: ActivityKind::Bookmark,
                metadata: ActivityMetadata {
                    article_id: Some(*article_id),
                    ..Default::default()
                },
            }),
            Self::CertificateEarned { .. }
            | Self::FirstLogin
            | Self::OnboardingComplete
            | Self::LoginStreak { .. } => None,
        }
    }
}
