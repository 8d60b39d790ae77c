//! Pull request engine
//!
//! [`Engine`] is the entry point used by request handlers: it opens pull
//! requests, refreshes their patches after pushes, feeds the mergeability
//! test queue and performs merges. The queue is drained by a single
//! [`TestWorker`].

mod events;
mod worker;

pub use worker::TestWorker;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::git::{Git, ops};
use crate::lock::RepoLocks;
use crate::merge::{MergeRequest, ProgressCallback, create_merge_plan, execute_merge};
use crate::notify::{Notifier, PullRequestAction};
use crate::patch::{self, Patch};
use crate::queue::UniqueQueue;
use crate::relay;
use crate::store::{IssueStore, PullRequestStore, RepositoryStore, UserStore};
use crate::types::{
    MergeRecord, MergeStyle, PatchTest, PullRequest, PullRequestStatus, Repository, User,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// External services the engine reads from and reports to
#[derive(Clone)]
pub struct Collaborators {
    /// Pull request rows
    pub pulls: Arc<dyn PullRequestStore>,
    /// Repository metadata and settings
    pub repos: Arc<dyn RepositoryStore>,
    /// Issues backing pull requests
    pub issues: Arc<dyn IssueStore>,
    /// Users
    pub users: Arc<dyn UserStore>,
    /// Webhooks and activity feed
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// Use one store for every lookup
    pub fn from_store<S>(store: Arc<S>, notifier: Arc<dyn Notifier>) -> Self
    where
        S: PullRequestStore + RepositoryStore + IssueStore + UserStore + 'static,
    {
        Self {
            pulls: store.clone(),
            repos: store.clone(),
            issues: store.clone(),
            users: store,
            notifier,
        }
    }
}

/// Input for [`Engine::new_pull_request`]
#[derive(Debug, Clone)]
pub struct NewPullRequest {
    /// Issue created for the pull request; its repository is the base
    pub issue_id: i64,
    /// Repository holding the head branch
    pub head_repo_id: i64,
    /// Head branch
    pub head_branch: String,
    /// Base branch
    pub base_branch: String,
    /// Initial patch, usually from [`Engine::compute_patch`]
    pub patch: Patch,
}

/// Pull request operations with injected queue, lock pool and collaborators
#[derive(Clone)]
pub struct Engine {
    config: Arc<Config>,
    git: Git,
    locks: RepoLocks,
    queue: Arc<UniqueQueue<i64>>,
    services: Collaborators,
}

impl Engine {
    /// Create an engine
    ///
    /// Engines sharing a queue and lock pool coordinate with each other; tests
    /// give every engine its own.
    pub fn new(
        config: Config,
        services: Collaborators,
        locks: RepoLocks,
        queue: Arc<UniqueQueue<i64>>,
    ) -> Self {
        let git = Git::new(&config.git);
        Self {
            config: Arc::new(config),
            git,
            locks,
            queue,
            services,
        }
    }

    /// Engine with a fresh queue and a fresh lock pool
    pub fn with_defaults(config: Config, services: Collaborators) -> Self {
        let queue = Arc::new(UniqueQueue::new());
        Self::new(config, services, RepoLocks::new(), queue)
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Git runner in use
    pub const fn git(&self) -> &Git {
        &self.git
    }

    /// Working-copy lock pool
    pub const fn locks(&self) -> &RepoLocks {
        &self.locks
    }

    /// Mergeability test queue
    pub fn queue(&self) -> &UniqueQueue<i64> {
        &self.queue
    }

    /// Collaborator services
    pub const fn services(&self) -> &Collaborators {
        &self.services
    }

    async fn base_repo(&self, pr: &PullRequest) -> Result<Repository> {
        self.services.repos.get_repository(pr.base_repo_id).await
    }

    async fn head_repo(&self, pr: &PullRequest) -> Result<Repository> {
        match self.services.repos.get_repository(pr.head_repo_id).await {
            Err(Error::RepoNotFound(_)) => Err(Error::HeadRepoMissing(pr.id)),
            other => other,
        }
    }

    // =========================================================================
    // Patches
    // =========================================================================

    /// Diff of a head branch against a base branch, for opening a pull request
    pub async fn compute_patch(
        &self,
        head_repo_id: i64,
        head_branch: &str,
        base_repo_id: i64,
        base_branch: &str,
    ) -> Result<Patch> {
        let head = self.services.repos.get_repository(head_repo_id).await?;
        let base = self.services.repos.get_repository(base_repo_id).await?;
        patch::compute_patch(&self.git, &head, &base, head_branch, base_branch).await
    }

    /// Regenerate the stored patch of `pr` and persist its new merge base
    pub async fn update_patch(&self, pr: &PullRequest) -> Result<String> {
        let head = self.head_repo(pr).await?;
        let base = self.base_repo(pr).await?;
        let merge_base = patch::update_patch(&self.git, pr, &head, &base).await?;
        self.services
            .pulls
            .update_merge_base(pr.id, &merge_base)
            .await?;
        Ok(merge_base)
    }

    /// Dry-run the stored patch of `pr` against its base branch
    pub async fn test_patch(&self, pr: &PullRequest) -> Result<PatchTest> {
        let base = self.base_repo(pr).await?;
        patch::test_patch(&self.git, &self.locks, &self.config, pr, &base).await
    }

    /// Persist the outcome of a test unless a newer test is already pending
    ///
    /// Returns the stored status, or `None` when nothing was written.
    pub async fn check_and_update_status(
        &self,
        pr: &PullRequest,
        outcome: PatchTest,
    ) -> Result<Option<PullRequestStatus>> {
        let status = match outcome {
            PatchTest::Skipped => return Ok(None),
            PatchTest::Clean => PullRequestStatus::Mergeable,
            PatchTest::Conflict => PullRequestStatus::Conflict,
        };
        if self.queue.exists(&pr.id) {
            debug!(pr = pr.id, "newer test pending, result not stored");
            return Ok(None);
        }
        self.services.pulls.update_status(pr.id, status).await?;
        info!(pr = pr.id, %status, "mergeability updated");
        Ok(Some(status))
    }

    /// Test a pull request now and store the result
    ///
    /// Merged pull requests are left alone.
    pub async fn test_pull_request(&self, pr_id: i64) -> Result<Option<PullRequestStatus>> {
        let pr = self.services.pulls.get_pull_request(pr_id).await?;
        if pr.has_merged {
            debug!(pr = pr_id, "already merged, not testing");
            return Ok(None);
        }
        let outcome = self.test_patch(&pr).await?;
        self.check_and_update_status(&pr, outcome).await
    }

    /// Publish the head branch of `pr` as `refs/pull/<index>/head` in the base
    pub async fn push_to_base_repo(&self, pr: &PullRequest) -> Result<()> {
        let head = self.head_repo(pr).await?;
        let base = self.base_repo(pr).await?;
        relay::push_to_base_repo(&self.git, pr, &head, &base).await
    }

    // =========================================================================
    // Queueing
    // =========================================================================

    /// Queue a mergeability test, marking the pull request as checking
    ///
    /// Returns `false` when a test was already pending.
    pub async fn add_to_task_queue(&self, pr: &PullRequest) -> bool {
        let pulls = Arc::clone(&self.services.pulls);
        let id = pr.id;
        self.queue
            .add_with(id, || async move {
                pulls.update_status(id, PullRequestStatus::Checking).await
            })
            .await
    }

    /// React to a push of `branch` in `repo_id`
    ///
    /// Pull requests whose head is the branch get a fresh patch, an updated
    /// pull ref and a new test; with `is_sync` their webhooks fire as well.
    /// Pull requests based on the branch are re-tested. Returns how many tests
    /// were queued.
    pub async fn add_test_pull_request_task(
        &self,
        doer: &User,
        repo_id: i64,
        branch: &str,
        is_sync: bool,
    ) -> Result<usize> {
        debug!(repo_id, branch, is_sync, "testing pull requests after push");
        let mut queued = 0;

        let by_head = self
            .services
            .pulls
            .list_unmerged_by_head(repo_id, branch)
            .await?;
        if is_sync {
            for pr in &by_head {
                self.notify_pull_request(pr, PullRequestAction::Synchronized, doer)
                    .await;
            }
        }
        for pr in &by_head {
            if let Err(e) = self.update_patch(pr).await {
                warn!(pr = pr.id, error = %e, "failed to update patch");
                continue;
            }
            if let Err(e) = self.push_to_base_repo(pr).await {
                warn!(pr = pr.id, error = %e, "failed to push to base repository");
                continue;
            }
            if self.add_to_task_queue(pr).await {
                queued += 1;
            }
        }

        let by_base = self
            .services
            .pulls
            .list_unmerged_by_base(repo_id, branch)
            .await?;
        for pr in &by_base {
            if self.add_to_task_queue(pr).await {
                queued += 1;
            }
        }

        Ok(queued)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open a pull request on the base repository of its issue
    ///
    /// Stores the patch, tests it synchronously, inserts the row and publishes
    /// the head ref. Once the row is inserted the pull request counts as
    /// opened: a failed ref push or notification is only logged, and the ref
    /// is published again on the next push of the head branch.
    pub async fn new_pull_request(&self, poster: &User, new: NewPullRequest) -> Result<PullRequest> {
        let issue = self.services.issues.get_issue(new.issue_id).await?;
        let base = self.services.repos.get_repository(issue.repo_id).await?;
        let head = self.services.repos.get_repository(new.head_repo_id).await?;

        let mut pr = PullRequest::new(
            0,
            issue.index,
            issue.id,
            (&head, &new.head_branch),
            (&base, &new.base_branch),
        );
        pr.merge_base = new.patch.merge_base;

        patch::save_patch(&base, pr.index, &new.patch.diff).await?;
        pr.status = match patch::test_patch(&self.git, &self.locks, &self.config, &pr, &base)
            .await?
        {
            PatchTest::Clean => PullRequestStatus::Mergeable,
            PatchTest::Conflict => PullRequestStatus::Conflict,
            PatchTest::Skipped => PullRequestStatus::Checking,
        };

        let pr = self.services.pulls.create_pull_request(pr).await?;
        if let Err(e) = relay::push_to_base_repo(&self.git, &pr, &head, &base).await {
            warn!(pr = pr.id, error = %e, "failed to push to base repository");
        }
        info!(pr = pr.id, repo = %base.full_name(), index = pr.index, status = %pr.status, "opened pull request");

        self.notify_opened(&pr, &base, &issue, poster).await;
        Ok(pr)
    }

    /// Merge a pull request
    ///
    /// Callers must refuse pull requests that are not mergeable; this method
    /// does not re-test. A requested rebase falls back to a merge commit when
    /// the base repository disallows rebase merges. Before returning, pull
    /// requests based on the same branch are queued for a new test.
    pub async fn merge(
        &self,
        pr_id: i64,
        doer: &User,
        style: MergeStyle,
        description: &str,
        progress: &dyn ProgressCallback,
    ) -> Result<PullRequest> {
        let pr = self.services.pulls.get_pull_request(pr_id).await?;
        if pr.has_merged {
            return Err(Error::AlreadyMerged(pr_id));
        }
        let head = self.head_repo(&pr).await?;
        let base = self.base_repo(&pr).await?;

        let plan = create_merge_plan(&MergeRequest {
            pr: &pr,
            head: &head,
            base: &base,
            merger: doer,
            style,
            description,
        });

        let outcome = {
            let _guard = self.locks.lock(base.id).await;
            execute_merge(&self.git, &self.config, &plan, doer, progress).await?
        };

        let merged_commit_id = ops::branch_commit_id(&self.git, &head.path, &pr.head_branch).await?;
        let record = MergeRecord {
            merged_commit_id,
            merger_id: doer.id,
            merged_at: Utc::now(),
            style: outcome.style,
        };
        let merged = self.services.pulls.complete_merge(pr.id, &record).await?;

        self.notify_merged(&merged, &head, &base, doer, &outcome)
            .await;

        if let Err(e) = self
            .add_test_pull_request_task(doer, merged.base_repo_id, &merged.base_branch, false)
            .await
        {
            warn!(repo_id = merged.base_repo_id, branch = %merged.base_branch, error = %e, "failed to queue tests after merge");
        }

        Ok(merged)
    }

    /// Drop every pull request based on a repository, with its patches
    pub async fn delete_repository_pulls(&self, repo_id: i64) -> Result<usize> {
        let removed = self.services.pulls.delete_by_base_repo(repo_id).await?;
        for pr in &removed {
            self.queue.remove(&pr.id);
        }

        match self.services.repos.get_repository(repo_id).await {
            Ok(repo) => match tokio::fs::remove_dir_all(repo.pulls_dir()).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        info!(repo_id, count = removed.len(), "deleted pull requests");
        Ok(removed.len())
    }
}
