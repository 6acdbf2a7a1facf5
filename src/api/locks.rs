//! Per-user exclusion for calculations.

use crate::domain::UserId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per user; calculations of different users never contend.
#[derive(Debug, Clone, Default)]
pub struct UserLocks {
    inner: Arc<Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other calculation of `user` is running.
    ///
    /// Entries nobody holds or waits on are dropped here, so the map only
    /// tracks users with a calculation in flight.
    pub async fn acquire(&self, user: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = match self.inner.lock() {
                Ok(map) => map,
                Err(poisoned) => poisoned.into_inner(),
            };
            map.retain(|id, lock| *id == user || Arc::strong_count(lock) > 1);
            map.entry(user).or_default().clone()
        };
        lock.lock_owned().await
    }

    fn tracked(&self) -> usize {
        match self.inner.lock() {
            Ok(map) => map.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_user_is_serialized() {
        let locks = UserLocks::new();
        let guard = locks.acquire(UserId::new(1)).await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move { other.acquire(UserId::new(1)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        assert!(waiter.await.is_ok());
    }

    #[tokio::test]
    async fn test_different_users_do_not_contend() {
        let locks = UserLocks::new();
        let _a = locks.acquire(UserId::new(1)).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.acquire(UserId::new(2))).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_released_users_are_evicted() {
        let locks = UserLocks::new();
        for id in 1..=50 {
            drop(locks.acquire(UserId::new(id)).await);
        }
        let held = locks.acquire(UserId::new(100)).await;
        assert_eq!(locks.tracked(), 1);

        let _other = locks.acquire(UserId::new(101)).await;
        assert_eq!(locks.tracked(), 2);
        drop(held);
    }
}
