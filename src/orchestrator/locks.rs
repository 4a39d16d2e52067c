//! Per-actor mutual exclusion

use crate::orchestrator::key::ActorKey;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async lock per actor key
///
/// Holding the guard makes the caller the only writer of that actor's
/// record; different keys never wait on each other.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<ActorKey, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    /// No locks yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    ///
    /// Locks nobody holds or waits for are dropped from the map.
    pub async fn lock(&self, key: &ActorKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|k, lock| k == key || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let key = ActorKey::Subscription(Uuid::new_v4());
        let log = Arc::new(Mutex::new(Vec::new()));

        let guard = locks.lock(&key).await;

        let task = {
            let (locks, key, log) = (Arc::clone(&locks), key.clone(), Arc::clone(&log));
            tokio::spawn(async move {
                let _guard = locks.lock(&key).await;
                log.lock().await.push("second");
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        log.lock().await.push("first");
        drop(guard);
        task.await.unwrap();

        assert_eq!(*log.lock().await, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_released_locks_are_pruned() {
        let locks = KeyedLocks::new();
        let held = ActorKey::Subscription(Uuid::new_v4());
        let _held = locks.lock(&held).await;

        for _ in 0..3 {
            drop(locks.lock(&ActorKey::Subscription(Uuid::new_v4())).await);
        }
        let last = ActorKey::Subscription(Uuid::new_v4());
        let _last = locks.lock(&last).await;

        let map = locks.locks.lock().await;
        assert_eq!(map.len(), 2);
        assert!(map.contains_key(&held));
        assert!(map.contains_key(&last));
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock(&ActorKey::Subscription(Uuid::new_v4())).await;
        let _b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.lock(&ActorKey::Subscription(Uuid::new_v4())),
        )
        .await
        .unwrap();
    }
}
