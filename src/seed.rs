use chrono::Utc;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::achievement::{
    AchievementCategory, AchievementDefinition, AchievementDifficulty, AchievementStatus,
    AchievementVisibility, TriggerConfig,
};
use crate::models::mission::{Mission, MissionFrequency, MissionStatus, MissionType};
use crate::models::streak::StreakMilestone;
use crate::store::Store;

/// Service account owning the seeded achievement catalog. Provisioned
/// idempotently before anything else runs.
pub const SYSTEM_USER_ID: Uuid = Uuid::from_u128(0x5d1c_7a2e_0000_4000_8000_000000000001);
pub const SYSTEM_USER_NAME: &str = "studytrail-system";

/// Provision the built-in catalogs. Every insert is keyed on a natural
/// unique column (user id, milestone days, mission title, achievement
/// slug), so re-running the seed is always a no-op.
pub async fn run(store: &dyn Store) -> EngineResult<()> {
    ensure_system_user(store).await?;
    seed_milestones(store).await?;
    seed_missions(store).await?;
    seed_achievements(store).await?;
    tracing::info!("Seed complete");
    Ok(())
}

pub async fn ensure_system_user(store: &dyn Store) -> EngineResult<()> {
    if store
        .insert_user_ignore(SYSTEM_USER_ID, SYSTEM_USER_NAME)
        .await?
    {
        tracing::info!(user_id = %SYSTEM_USER_ID, "System user provisioned");
    }
    Ok(())
}

async fn seed_milestones(store: &dyn Store) -> EngineResult<()> {
    let catalog = [
        (3, "Dedicated Beginner", "Kept a streak going for 3 days", 1),
        (7, "One Strong Week", "Seven consecutive days of studying", 2),
        (14, "Two Solid Weeks", "14 days of uninterrupted dedication", 3),
        (30, "Monthly Champion", "A full month of daily studying", 5),
        (60, "Consistency Master", "60 days of learning without a break", 8),
        (100, "Knowledge Legend", "A 100-day streak", 15),
    ];

    let mut created = 0;
    for (days, title, description, freeze_reward) in catalog {
        let milestone = StreakMilestone::new(days, title, description, freeze_reward);
        if store.insert_milestone_ignore(&milestone).await? {
            created += 1;
        }
    }
    tracing::info!(created, "Streak milestones seeded");
    Ok(())
}

async fn seed_missions(store: &dyn Store) -> EngineResult<()> {
    use MissionFrequency::{Daily, Monthly, Weekly};
    use MissionType::{
        CompleteQuestions, CompleteQuiz, CompleteStreak, CompleteTrailContent, LoginDaily,
        ReadArticle, SpendTimeLearning,
    };

    let catalog = [
        // Daily
        ("Answer 3 Questions", "Answer 3 questions today to test your knowledge", CompleteQuestions, Daily, 3),
        ("Read 1 Article", "Read at least 1 wiki article today", ReadArticle, Daily, 1),
        ("Study for 15 Minutes", "Spend at least 15 minutes studying today", SpendTimeLearning, Daily, 15),
        ("Daily Login", "Log in every day to keep your streak alive", LoginDaily, Daily, 1),
        // Weekly
        ("Answer 15 Questions", "Answer 15 questions over the week", CompleteQuestions, Weekly, 15),
        ("Complete 2 Quizzes", "Finish 2 full quizzes this week", CompleteQuiz, Weekly, 2),
        ("Read 5 Articles", "Read 5 wiki articles during the week", ReadArticle, Weekly, 5),
        ("Complete 3 Trail Units", "Finish 3 trail content units this week", CompleteTrailContent, Weekly, 3),
        ("Keep Your Streak", "Hold a 7-day streak", CompleteStreak, Weekly, 7),
        // Monthly
        ("Question Master", "Answer 100 questions this month", CompleteQuestions, Monthly, 100),
        ("Quiz Expert", "Complete 10 quizzes this month", CompleteQuiz, Monthly, 10),
        ("Voracious Reader", "Read 20 wiki articles this month", ReadArticle, Monthly, 20),
        ("Dedicated Student", "Study for 10 hours this month", SpendTimeLearning, Monthly, 600),
        ("Golden Streak", "Hold a 30-day streak", CompleteStreak, Monthly, 30),
    ];

    let mut created = 0;
    for (title, description, mission_type, frequency, target_value) in catalog {
        if store.mission_by_title(title).await?.is_some() {
            continue;
        }
        let now = Utc::now();
        let mission = Mission {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            mission_type,
            frequency,
            status: MissionStatus::Active,
            target_value,
            valid_from: None,
            valid_until: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_mission(&mission).await?;
        created += 1;
    }
    tracing::info!(created, "Missions seeded");
    Ok(())
}

async fn seed_achievements(store: &dyn Store) -> EngineResult<()> {
    use AchievementCategory::{Certification, Engagement, General, Questions, Trails, Wiki};
    use AchievementDifficulty::{Bronze, Gold, Platinum, Silver};

    let catalog = [
        achievement("first-login", "Welcome!", "Logged in for the first time", General, Bronze, 1, TriggerConfig::FirstLogin, AchievementVisibility::Public),
        achievement("welcome-aboard", "Welcome Aboard", "Completed the onboarding tour", General, Bronze, 2, TriggerConfig::OnboardingComplete, AchievementVisibility::Public),
        achievement("login-streak-7", "Week One", "Kept a 7-day login streak", Engagement, Silver, 3, TriggerConfig::LoginStreak { streak_days: 7 }, AchievementVisibility::Public),
        achievement("login-streak-30", "Habit Formed", "Kept a 30-day login streak", Engagement, Gold, 4, TriggerConfig::LoginStreak { streak_days: 30 }, AchievementVisibility::Public),
        achievement("first-trail", "Trailblazer", "Completed your first trail", Trails, Bronze, 5, TriggerConfig::CompleteTrails { count: 1 }, AchievementVisibility::Public),
        achievement("trail-master-5", "Pathfinder", "Completed 5 trails", Trails, Silver, 6, TriggerConfig::CompleteTrails { count: 5 }, AchievementVisibility::Public),
        achievement("trail-master-10", "Trail Master", "Completed 10 trails", Trails, Gold, 7, TriggerConfig::CompleteTrails { count: 10 }, AchievementVisibility::Public),
        achievement("perfect-trail", "Flawless", "Completed a trail with a perfect score", Trails, Gold, 8, TriggerConfig::CompleteTrailsPerfect { count: 1 }, AchievementVisibility::Public),
        achievement("perfectionist", "Perfectionist", "Completed 5 trails with perfect scores", Trails, Platinum, 9, TriggerConfig::CompleteTrailsPerfect { count: 5 }, AchievementVisibility::Secret),
        achievement("first-article", "First Read", "Read your first wiki article", Wiki, Bronze, 10, TriggerConfig::ReadArticlesCount { count: 1, category_id: None }, AchievementVisibility::Public),
        achievement("article-reader-10", "Curious Mind", "Read 10 wiki articles", Wiki, Silver, 11, TriggerConfig::ReadArticlesCount { count: 10, category_id: None }, AchievementVisibility::Public),
        achievement("article-reader-50", "Walking Library", "Read 50 wiki articles", Wiki, Gold, 12, TriggerConfig::ReadArticlesCount { count: 50, category_id: None }, AchievementVisibility::Public),
        achievement("bookworm", "Bookworm", "Bookmarked 10 articles", Wiki, Bronze, 13, TriggerConfig::BookmarkArticlesCount { count: 10 }, AchievementVisibility::Public),
        achievement("first-question", "Ice Breaker", "Answered your first question", Questions, Bronze, 14, TriggerConfig::QuestionsAnsweredCount { count: 1 }, AchievementVisibility::Public),
        achievement("question-master-100", "Inquisitor", "Answered 100 questions", Questions, Gold, 15, TriggerConfig::QuestionsAnsweredCount { count: 100 }, AchievementVisibility::Public),
        achievement("sharpshooter", "Sharpshooter", "Held 90% accuracy over at least 20 questions", Questions, Platinum, 16, TriggerConfig::QuestionAccuracyRate { accuracy_percentage: 90.0, minimum_questions: 20 }, AchievementVisibility::Public),
        achievement("quiz-champion", "Quiz Champion", "Completed 10 quizzes", Questions, Silver, 17, TriggerConfig::CompleteQuizCount { count: 10 }, AchievementVisibility::Public),
        achievement("first-certificate", "Certified", "Earned your first certificate", Certification, Silver, 18, TriggerConfig::FirstCertificate, AchievementVisibility::Public),
        achievement("certified-excellence", "Excellence", "Earned a certificate with a 90%+ score", Certification, Gold, 19, TriggerConfig::CertificateHighScore { score_percentage: 90.0 }, AchievementVisibility::Public),
    ];

    let mut created = 0;
    for definition in catalog {
        if store.insert_achievement_ignore(&definition).await? {
            created += 1;
        }
    }
    tracing::info!(created, "Achievements seeded");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn achievement(
    slug: &str,
    name: &str,
    description: &str,
    category: AchievementCategory,
    difficulty: AchievementDifficulty,
    display_order: i32,
    trigger: TriggerConfig,
    visibility: AchievementVisibility,
) -> AchievementDefinition {
    let now = Utc::now();
    AchievementDefinition {
        id: Uuid::new_v4(),
        slug: slug.into(),
        name: name.into(),
        description: description.into(),
        category,
        difficulty,
        status: AchievementStatus::Active,
        visibility,
        trigger,
        display_order,
        created_by: SYSTEM_USER_ID,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let store = MemoryStore::new();

        run(&store).await.unwrap();
        let missions_first = store.missions().await.unwrap().len();
        let achievements_first = store.active_achievements().await.unwrap().len();

        run(&store).await.unwrap();
        assert_eq!(store.missions().await.unwrap().len(), missions_first);
        assert_eq!(
            store.active_achievements().await.unwrap().len(),
            achievements_first
        );
        assert_eq!(store.list_user_ids().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_seed_populates_catalogs() {
        let store = MemoryStore::new();
        run(&store).await.unwrap();

        assert_eq!(store.milestones_up_to(100).await.unwrap().len(), 6);
        assert_eq!(store.missions().await.unwrap().len(), 14);
        assert_eq!(store.active_achievements().await.unwrap().len(), 19);
    }
}
