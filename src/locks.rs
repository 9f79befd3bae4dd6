use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Sharded per-user lock registry.
///
/// Every read-modify-write entry point (activity recording, streak updates,
/// mission progress, achievement evaluation) acquires the user's lock before
/// touching shared per-user rows, so concurrent events for the same user
/// cannot lose updates. Different users never contend.
#[derive(Clone, Default)]
pub struct UserLocks {
    entries: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Acquire the lock for a user, creating it on first use. The returned
    /// guard serializes all engine writes for that user until dropped.
    pub async fn acquire(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut entries = self.entries.lock().await;
            entries
                .entry(user_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        lock.lock_owned().await
    }

    /// Drop entries no one is currently holding (call from a background task).
    pub async fn cleanup(&self) {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_user_is_serialized() {
        let locks = UserLocks::new();
        let user_id = Uuid::new_v4();

        let guard = locks.acquire(user_id).await;

        let locks2 = locks.clone();
        let contender = tokio::spawn(async move {
            let _guard = locks2.acquire(user_id).await;
        });

        // The second acquire must not complete while the guard is held.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_users_do_not_contend() {
        let locks = UserLocks::new();

        let _guard = locks.acquire(Uuid::new_v4()).await;
        // A different user acquires immediately even while the first is held.
        let _other = locks.acquire(Uuid::new_v4()).await;
    }

    #[tokio::test]
    async fn test_cleanup_retains_held_locks() {
        let locks = UserLocks::new();
        let held = Uuid::new_v4();
        let released = Uuid::new_v4();

        let guard = locks.acquire(held).await;
        drop(locks.acquire(released).await);

        locks.cleanup().await;

        let entries = locks.entries.lock().await;
        assert!(entries.contains_key(&held));
        assert!(!entries.contains_key(&released));
        drop(entries);
        drop(guard);
    }
}
