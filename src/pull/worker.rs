//! Background consumer of the mergeability test queue

use super::Engine;
use crate::error::{Error, Result};
use crate::types::PullRequestStatus;
use std::future::Future;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Single consumer draining the test queue of an [`Engine`]
///
/// A failing job is logged and dropped; nothing a job does can stop the loop.
pub struct TestWorker {
    engine: Engine,
    receiver: mpsc::UnboundedReceiver<i64>,
}

impl TestWorker {
    /// Attach to the engine's queue
    ///
    /// Fails if another worker already consumes it.
    pub fn new(engine: Engine) -> Result<Self> {
        let receiver = engine
            .queue()
            .take_receiver()
            .ok_or_else(|| Error::Internal("test queue already has a consumer".to_string()))?;
        Ok(Self { engine, receiver })
    }

    /// Re-test pull requests left in the checking state, e.g. by a crash
    ///
    /// Returns how many were tested.
    pub async fn recover(&self) -> usize {
        let pending = match self
            .engine
            .services()
            .pulls
            .list_by_status(PullRequestStatus::Checking)
            .await
        {
            Ok(prs) => prs,
            Err(e) => {
                error!(error = %e, "failed to list pull requests awaiting a test");
                return 0;
            }
        };

        let count = pending.len();
        for pr in pending {
            self.handle(pr.id).await;
        }
        count
    }

    /// Recover, then process queued tests until `shutdown` resolves or the
    /// queue closes
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let recovered = self.recover().await;
        info!(recovered, "test worker started");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("test worker shutting down");
                    break;
                }
                next = self.receiver.recv() => match next {
                    Some(id) => self.handle(id).await,
                    None => {
                        info!("test queue closed");
                        break;
                    }
                },
            }
        }
    }

    /// Wait for the next queued test and run it
    ///
    /// Returns `false` once the queue is closed.
    pub async fn process_next(&mut self) -> bool {
        match self.receiver.recv().await {
            Some(id) => {
                self.handle(id).await;
                true
            }
            None => false,
        }
    }

    /// Run every test queued right now without waiting for more
    pub async fn drain(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(id) = self.receiver.try_recv() {
            self.handle(id).await;
            processed += 1;
        }
        processed
    }

    async fn handle(&self, id: i64) {
        debug!(pr = id, "running mergeability test");
        // Cleared first so a request arriving mid-test queues a fresh run.
        self.engine.queue().remove(&id);

        match self.engine.test_pull_request(id).await {
            Ok(Some(status)) => debug!(pr = id, %status, "test finished"),
            Ok(None) => debug!(pr = id, "test finished without status change"),
            Err(e) if e.is_not_found() => {
                debug!(pr = id, error = %e, "pull request gone, result discarded");
            }
            Err(Error::AlreadyMerged(_)) => {
                debug!(pr = id, "merged during test, result discarded");
            }
            Err(e) => error!(pr = id, error = %e, "mergeability test failed"),
        }
    }
}
