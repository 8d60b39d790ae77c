//! Deduplicating job queue for mergeability tests
//!
//! Keys are pending from `add` until the consumer calls `remove`. Adding a
//! key that is already pending does nothing, so at most one request per key
//! is ever waiting. The consumer removes a key *before* running its job: a
//! request that arrives while the job runs is queued again, and `exists`
//! tells the consumer its result is about to be superseded.
//!
//! The channel is unbounded: the pending set already caps it at one entry per
//! key, and adding never waits for the consumer.

use crate::error::Result;
use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{error, trace};

/// A queue holding each key at most once
#[derive(Debug)]
pub struct UniqueQueue<K> {
    pending: Mutex<HashSet<K>>,
    sender: mpsc::UnboundedSender<K>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<K>>>,
}

impl<K> UniqueQueue<K>
where
    K: Eq + Hash + Clone + Display + Send,
{
    /// Create an empty queue
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            pending: Mutex::new(HashSet::new()),
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashSet<K>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the key pending; returns `false` when it already was
    fn claim(&self, key: &K) -> bool {
        self.pending().insert(key.clone())
    }

    fn send(&self, key: K) {
        trace!(%key, "queued");
        if self.sender.send(key).is_err() {
            // Receiver gone: nobody will ever drain this queue.
            error!("test queue consumer has shut down; request dropped");
        }
    }

    /// Request a job for `key`; no-op if one is already pending
    ///
    /// Returns whether a new request was queued.
    pub fn add(&self, key: K) -> bool {
        if !self.claim(&key) {
            return false;
        }
        self.send(key);
        true
    }

    /// Like [`add`](Self::add), running `before_send` once the key is claimed
    /// but before the consumer can see it
    ///
    /// A failing callback is logged and the request is still queued.
    pub async fn add_with<F, Fut>(&self, key: K, before_send: F) -> bool
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<()>> + Send,
    {
        if !self.claim(&key) {
            return false;
        }
        if let Err(e) = before_send().await {
            error!(%key, error = %e, "test queue callback failed");
        }
        self.send(key);
        true
    }

    /// Clear the pending mark for `key`
    pub fn remove(&self, key: &K) {
        self.pending().remove(key);
    }

    /// Whether a request for `key` is pending
    pub fn exists(&self, key: &K) -> bool {
        self.pending().contains(key)
    }

    /// Number of pending keys
    pub fn len(&self) -> usize {
        self.pending().len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.pending().is_empty()
    }

    /// Take the consuming end; only the first caller gets it
    pub fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<K>> {
        self.receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl<K> Default for UniqueQueue<K>
where
    K: Eq + Hash + Clone + Display + Send,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_duplicate_add_is_noop() {
        let queue = UniqueQueue::new();
        assert!(queue.add(5_i64));
        assert!(!queue.add(5));
        assert!(!queue.add(5));
        assert_eq!(queue.len(), 1);

        let mut rx = queue.take_receiver().unwrap();
        assert_eq!(rx.recv().await, Some(5));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_remove_allows_requeue() {
        let queue = UniqueQueue::new();
        queue.add(1_i64);
        assert!(queue.exists(&1));
        queue.remove(&1);
        assert!(!queue.exists(&1));
        assert!(queue.is_empty());
        assert!(queue.add(1));
    }

    #[tokio::test]
    async fn test_add_with_runs_callback_once() {
        let queue = UniqueQueue::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            queue
                .add_with(9_i64, || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_add_with_failing_callback_still_queues() {
        let queue = UniqueQueue::new();
        let queued = queue
            .add_with(3_i64, || async { Err(Error::Store("db down".to_string())) })
            .await;

        assert!(queued);
        assert!(queue.exists(&3));
        let mut rx = queue.take_receiver().unwrap();
        assert_eq!(rx.recv().await, Some(3));
    }

    #[test]
    fn test_receiver_taken_once() {
        let queue: UniqueQueue<i64> = UniqueQueue::new();
        assert!(queue.take_receiver().is_some());
        assert!(queue.take_receiver().is_none());
    }

    #[test]
    fn test_adds_never_wait_for_consumer() {
        let queue = UniqueQueue::new();
        for id in 0..5_000_i64 {
            assert!(queue.add(id));
        }
        assert_eq!(queue.len(), 5_000);
    }

    #[tokio::test]
    async fn test_concurrent_adds_dedup() {
        let queue = Arc::new(UniqueQueue::new());
        let mut handles = Vec::new();
        for i in 0..32_i64 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move { queue.add(i % 4) }));
        }
        let mut queued = 0;
        for handle in handles {
            if handle.await.unwrap() {
                queued += 1;
            }
        }
        assert_eq!(queued, 4);
        assert_eq!(queue.len(), 4);
    }
}
