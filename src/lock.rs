//! Per-repository working-copy lock
//!
//! Each repository has a single shared local clone. Anything that reads or
//! mutates it must hold that repository's lock. Different repositories never
//! contend; operations on the same repository serialize, whatever they are.
//! There is no timeout: release is tied to dropping the guard.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::trace;

type Slots = Arc<Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>>;

/// Pool of exclusive locks keyed by repository ID
///
/// A repository only has a slot while someone holds or waits for its lock.
#[derive(Debug, Clone, Default)]
pub struct RepoLocks {
    slots: Slots,
}

/// Reference to one slot; the slot leaves the pool with its last reference
#[derive(Debug)]
struct Slot {
    slots: Slots,
    repo_id: i64,
    mutex: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // Pool entry plus this one: nobody else holds or waits.
        if Arc::strong_count(&self.mutex) == 2 {
            slots.remove(&self.repo_id);
        }
    }
}

/// Held lock on one repository's working copy, released on drop
#[derive(Debug)]
pub struct RepoGuard {
    repo_id: i64,
    // Declared before `_slot` so the lock is released before the slot is pruned.
    _guard: OwnedMutexGuard<()>,
    _slot: Slot,
}

impl RepoGuard {
    /// Repository this guard protects
    pub const fn repo_id(&self) -> i64 {
        self.repo_id
    }
}

impl Drop for RepoGuard {
    fn drop(&mut self) {
        trace!(repo_id = self.repo_id, "released working-copy lock");
    }
}

impl RepoLocks {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, repo_id: i64) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let mutex = Arc::clone(slots.entry(repo_id).or_default());
        Slot {
            slots: Arc::clone(&self.slots),
            repo_id,
            mutex,
        }
    }

    /// Wait for exclusive access to a repository's working copy
    pub async fn lock(&self, repo_id: i64) -> RepoGuard {
        let slot = self.slot(repo_id);
        let guard = Arc::clone(&slot.mutex).lock_owned().await;
        trace!(repo_id, "acquired working-copy lock");
        RepoGuard {
            repo_id,
            _guard: guard,
            _slot: slot,
        }
    }

    /// Take the lock only if nobody holds it
    pub fn try_lock(&self, repo_id: i64) -> Option<RepoGuard> {
        let slot = self.slot(repo_id);
        let guard = Arc::clone(&slot.mutex).try_lock_owned().ok()?;
        Some(RepoGuard {
            repo_id,
            _guard: guard,
            _slot: slot,
        })
    }

    /// Whether the repository's lock is currently held
    pub fn is_locked(&self, repo_id: i64) -> bool {
        self.try_lock(repo_id).is_none()
    }

    /// Number of repositories with a holder or waiter
    pub fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_repo_serializes() {
        let locks = RepoLocks::new();
        let guard = locks.lock(1).await;
        assert_eq!(guard.repo_id(), 1);
        assert!(locks.try_lock(1).is_none());
        drop(guard);
        assert!(locks.try_lock(1).is_some());
    }

    #[tokio::test]
    async fn test_different_repos_independent() {
        let locks = RepoLocks::new();
        let _a = locks.lock(1).await;
        let b = locks.try_lock(2);
        assert!(b.is_some());
        assert!(locks.is_locked(1));
    }

    #[tokio::test]
    async fn test_released_on_error_path() {
        async fn failing(locks: &RepoLocks) -> Result<(), &'static str> {
            let _guard = locks.lock(7).await;
            Err("boom")
        }

        let locks = RepoLocks::new();
        assert!(failing(&locks).await.is_err());
        assert!(!locks.is_locked(7));
    }

    #[tokio::test]
    async fn test_no_overlap_under_contention() {
        let locks = RepoLocks::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = Arc::clone(&inside);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(3).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slot_removed_after_release() {
        let locks = RepoLocks::new();
        let guard = locks.lock(1).await;
        let _other = locks.lock(2).await;
        assert_eq!(locks.tracked(), 2);

        drop(guard);
        assert_eq!(locks.tracked(), 1);
        assert!(!locks.is_locked(1));
        assert_eq!(locks.tracked(), 1);
    }

    #[tokio::test]
    async fn test_waiter_keeps_slot_until_done() {
        let locks = RepoLocks::new();
        let guard = locks.lock(4).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(4).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);
        assert_eq!(locks.tracked(), 1);

        waiter.await.unwrap();
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_wait_leaves_no_slot() {
        let locks = RepoLocks::new();
        let guard = locks.lock(5).await;

        let timed_out = tokio::time::timeout(Duration::from_millis(10), locks.lock(5)).await;
        assert!(timed_out.is_err());
        assert_eq!(locks.tracked(), 1);

        drop(guard);
        assert_eq!(locks.tracked(), 0);
    }
}
