//! Per-user serialization.
//!
//! Events for different users run concurrently; events for the same
//! user must not. Each user gets one async mutex, held across the
//! whole critical section (topic provisioning + transport call +
//! correspondence record), so two near-simultaneous first messages
//! from a new user cannot both provision a topic.

use dashmap::DashMap;
use mailroom_types::UserId;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Registry of per-user mutexes.
#[derive(Debug, Clone, Default)]
pub struct UserLocks {
    inner: Arc<DashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex serializing work for one user, created on first use.
    pub fn for_user(&self, user: UserId) -> Arc<Mutex<()>> {
        self.inner
            .entry(user)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Number of users with a registered lock (for diagnostics).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no locks have been handed out yet.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_user_yields_the_same_mutex() {
        let locks = UserLocks::new();
        let a = locks.for_user(UserId::new(42));
        let b = locks.for_user(UserId::new(42));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn different_users_get_independent_mutexes() {
        let locks = UserLocks::new();
        let a = locks.for_user(UserId::new(1));
        let b = locks.for_user(UserId::new(2));
        assert!(!Arc::ptr_eq(&a, &b));

        // Holding one must not block the other.
        let _guard_a = a.lock().await;
        tokio::time::timeout(Duration::from_millis(50), b.lock())
            .await
            .expect("lock for another user must be free");
    }

    #[tokio::test]
    async fn same_user_work_is_serialized() {
        let locks = UserLocks::new();
        let in_section = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let in_section = in_section.clone();
            let overlaps = overlaps.clone();
            handles.push(tokio::spawn(async move {
                let lock = locks.for_user(UserId::new(99));
                let _guard = lock.lock().await;
                if in_section.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_section.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }
}
