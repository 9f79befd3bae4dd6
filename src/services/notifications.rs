use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::locks::UserLocks;
use crate::models::achievement::{NotificationStats, UserAchievementView};
use crate::store::Store;

/// Tracks which unlocked achievements have been shown to the user.
///
/// Clients poll `list_unnotified` and commit each display with the
/// idempotent `mark_notified`; an unlock stays in the queue until marked.
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn Store>,
    locks: UserLocks,
}

impl NotificationService {
    pub fn new(store: Arc<dyn Store>, locks: UserLocks) -> Self {
        Self { store, locks }
    }

    /// Unlocked achievements not yet shown, oldest unlock first.
    pub async fn list_unnotified(&self, user_id: Uuid) -> EngineResult<Vec<UserAchievementView>> {
        let rows = self.store.unnotified_achievements(user_id).await?;
        Ok(rows
            .into_iter()
            .map(|(progress, achievement)| UserAchievementView {
                progress,
                achievement,
            })
            .collect())
    }

    /// Record that the unlock was shown. Repeated delivery attempts are
    /// no-ops: `notified_at` is only ever written once.
    pub async fn mark_notified(&self, user_id: Uuid, achievement_id: Uuid) -> EngineResult<()> {
        let _guard = self.locks.acquire(user_id).await;

        let mut progress = self
            .store
            .achievement_progress(user_id, achievement_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("Achievement progress not found".into()))?;

        if !progress.is_unlocked || progress.notified_at.is_some() {
            return Ok(());
        }

        progress.notified_at = Some(Utc::now());
        progress.updated_at = Utc::now();
        self.store.save_achievement_progress(&progress).await?;

        tracing::debug!(user_id = %user_id, achievement_id = %achievement_id, "Unlock notified");
        Ok(())
    }

    /// Record that the user opened the achievement. Idempotent like
    /// `mark_notified`.
    pub async fn mark_viewed(&self, user_id: Uuid, achievement_id: Uuid) -> EngineResult<()> {
        let _guard = self.locks.acquire(user_id).await;

        let mut progress = self
            .store
            .achievement_progress(user_id, achievement_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("Achievement progress not found".into()))?;

        if progress.viewed_at.is_some() {
            return Ok(());
        }

        progress.viewed_at = Some(Utc::now());
        progress.updated_at = Utc::now();
        self.store.save_achievement_progress(&progress).await
    }

    pub async fn notification_stats(&self, user_id: Uuid) -> EngineResult<NotificationStats> {
        let rows = self.store.user_achievements(user_id).await?;
        let unlocked: Vec<_> = rows
            .iter()
            .filter(|(progress, _)| progress.is_unlocked)
            .collect();

        let notified = unlocked
            .iter()
            .filter(|(progress, _)| progress.notified_at.is_some())
            .count();
        let viewed = unlocked
            .iter()
            .filter(|(progress, _)| progress.viewed_at.is_some())
            .count();

        Ok(NotificationStats {
            total_unlocked: unlocked.len(),
            notified,
            pending: unlocked.len() - notified,
            viewed,
        })
    }
}
