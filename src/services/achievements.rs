use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::events::DomainEvent;
use crate::locks::UserLocks;
use crate::models::achievement::{
    AccuracyAccumulator, AchievementDefinition, AchievementVisibility, TriggerConfig,
    UserAchievementProgress, UserAchievementView,
};
use crate::store::Store;

/// The rules evaluator: matches domain events against achievement
/// definitions, accumulates progress and performs the one-way unlock
/// transition.
#[derive(Clone)]
pub struct AchievementService {
    store: Arc<dyn Store>,
    locks: UserLocks,
}

impl AchievementService {
    pub fn new(store: Arc<dyn Store>, locks: UserLocks) -> Self {
        Self { store, locks }
    }

    /// Evaluate one domain event against every relevant active definition.
    /// Safe to call any number of times; unlocked achievements stay
    /// unlocked and their `unlocked_at` never changes.
    pub async fn handle_event(&self, user_id: Uuid, event: &DomainEvent) -> EngineResult<()> {
        let _guard = self.locks.acquire(user_id).await;
        self.handle_event_locked(user_id, event).await
    }

    pub(crate) async fn handle_event_locked(
        &self,
        user_id: Uuid,
        event: &DomainEvent,
    ) -> EngineResult<()> {
        let definitions = self.store.active_achievements().await?;

        let mut evaluated = 0;
        let mut unlocked = 0;
        for definition in definitions {
            if !definition.trigger.matches_event(event) {
                continue;
            }
            evaluated += 1;
            if self.evaluate(user_id, &definition, event).await? {
                unlocked += 1;
            }
        }

        tracing::debug!(
            user_id = %user_id,
            event = ?event,
            evaluated,
            unlocked,
            "Achievement event processed"
        );
        Ok(())
    }

    /// Per-user progress for every achievement the user has touched.
    /// Secret achievements stay hidden until unlocked.
    pub async fn get_user_achievements(
        &self,
        user_id: Uuid,
    ) -> EngineResult<Vec<UserAchievementView>> {
        let rows = self.store.user_achievements(user_id).await?;
        Ok(rows
            .into_iter()
            .filter(|(progress, definition)| {
                definition.visibility != AchievementVisibility::Secret || progress.is_unlocked
            })
            .map(|(progress, achievement)| UserAchievementView {
                progress,
                achievement,
            })
            .collect())
    }

    /// Returns whether this evaluation newly unlocked the achievement.
    async fn evaluate(
        &self,
        user_id: Uuid,
        definition: &AchievementDefinition,
        event: &DomainEvent,
    ) -> EngineResult<bool> {
        let existing = self
            .store
            .achievement_progress(user_id, definition.id)
            .await?;

        if existing.as_ref().is_some_and(|p| p.is_unlocked) {
            return Ok(false);
        }

        let mut progress = match existing {
            Some(progress) => progress,
            None => {
                let progress = UserAchievementProgress::new(
                    user_id,
                    definition.id,
                    definition.trigger.target_value(),
                );
                self.store.insert_achievement_progress(&progress).await?;
                progress
            }
        };

        progress.current_value = next_value(&definition.trigger, &mut progress, event)?;
        progress.progress_percentage =
            progress_percentage(progress.current_value, progress.target_value);

        let newly_unlocked = progress.current_value >= progress.target_value;
        if newly_unlocked {
            // Unlock fields are written together with the progress update;
            // the record is never visible half-transitioned.
            progress.is_unlocked = true;
            progress.unlocked_at = Some(Utc::now());
            progress.progress_percentage = 100.0;
            tracing::info!(
                user_id = %user_id,
                achievement = %definition.slug,
                "Achievement unlocked"
            );
        }
        progress.updated_at = Utc::now();
        self.store.save_achievement_progress(&progress).await?;

        Ok(newly_unlocked)
    }
}

/// The next progress value for a qualifying event. Qualification itself
/// (resource ids, categories, perfection, score thresholds) was already
/// settled by `TriggerConfig::matches_event`.
fn next_value(
    trigger: &TriggerConfig,
    progress: &mut UserAchievementProgress,
    event: &DomainEvent,
) -> EngineResult<f64> {
    match trigger {
        TriggerConfig::CompleteTrails { .. }
        | TriggerConfig::CompleteTrailsPerfect { .. }
        | TriggerConfig::ReadArticlesCount { .. }
        | TriggerConfig::BookmarkArticlesCount { .. }
        | TriggerConfig::QuestionsAnsweredCount { .. }
        | TriggerConfig::CompleteQuizCount { .. } => Ok(progress.current_value + 1.0),

        TriggerConfig::CompleteSpecificTrail { .. }
        | TriggerConfig::ReadSpecificArticle { .. }
        | TriggerConfig::FirstCertificate
        | TriggerConfig::CertificateHighScore { .. }
        | TriggerConfig::FirstLogin
        | TriggerConfig::OnboardingComplete => Ok(1.0),

        TriggerConfig::QuestionAccuracyRate {
            minimum_questions, ..
        } => {
            let mut acc: AccuracyAccumulator =
                serde_json::from_value(progress.accumulator.clone()).unwrap_or_default();
            acc.total += 1;
            if matches!(
                event,
                DomainEvent::QuestionAnswered {
                    is_correct: true,
                    ..
                }
            ) {
                acc.correct += 1;
            }
            progress.accumulator = serde_json::to_value(acc)
                .map_err(|e| EngineError::Internal(anyhow::anyhow!("accumulator encode: {e}")))?;

            // The rate only counts once the sample is large enough.
            if acc.total < i64::from(*minimum_questions) {
                return Ok(0.0);
            }
            let rate = acc.correct as f64 / acc.total as f64 * 100.0;
            Ok((rate * 100.0).round() / 100.0)
        }

        TriggerConfig::LoginStreak { .. } => match event {
            // Mirrors the streak engine's value instead of accumulating.
            DomainEvent::LoginStreak { current_streak } => Ok(f64::from(*current_streak)),
            _ => Ok(progress.current_value),
        },
    }
}

fn progress_percentage(value: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 100.0;
    }
    (value / target * 100.0).round().clamp(0.0, 100.0)
}
