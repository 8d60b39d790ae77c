//! Collaborator interfaces for persisted entities
//!
//! The engine never touches a database directly. Pull requests, repositories,
//! issues and users are reached through these traits; [`MemoryStore`] implements all
//! of them and optionally persists to a TOML file.

mod file;
mod memory;

pub use file::{load_state, save_state};
pub use memory::{MemoryStore, StoreState};

use crate::error::Result;
use crate::types::{Issue, MergeRecord, PullRequest, PullRequestStatus, Repository, User};
use async_trait::async_trait;

/// Persistence for pull request rows
#[async_trait]
pub trait PullRequestStore: Send + Sync {
    /// Load a pull request by ID
    async fn get_pull_request(&self, id: i64) -> Result<PullRequest>;

    /// Insert a new pull request, assigning its ID
    async fn create_pull_request(&self, pr: PullRequest) -> Result<PullRequest>;

    /// Set the mergeability status
    ///
    /// Fails with `AlreadyMerged` for merged pull requests, whose status is frozen.
    async fn update_status(&self, id: i64, status: PullRequestStatus) -> Result<()>;

    /// Record a freshly computed merge base
    async fn update_merge_base(&self, id: i64, merge_base: &str) -> Result<()>;

    /// Mark the pull request merged and close its issue, atomically
    async fn complete_merge(&self, id: i64, record: &MergeRecord) -> Result<PullRequest>;

    /// Unmerged pull requests currently in the given status
    async fn list_by_status(&self, status: PullRequestStatus) -> Result<Vec<PullRequest>>;

    /// Open, unmerged pull requests whose head is `branch` of `repo_id`
    async fn list_unmerged_by_head(&self, repo_id: i64, branch: &str)
    -> Result<Vec<PullRequest>>;

    /// Open, unmerged pull requests whose base is `branch` of `repo_id`
    async fn list_unmerged_by_base(&self, repo_id: i64, branch: &str)
    -> Result<Vec<PullRequest>>;

    /// Delete every pull request based on `repo_id`, returning what was removed
    async fn delete_by_base_repo(&self, repo_id: i64) -> Result<Vec<PullRequest>>;
}

/// Lookup of hosted repositories and their settings
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    /// Load a repository by ID
    async fn get_repository(&self, id: i64) -> Result<Repository>;
}

/// Loader for the issue that owns a pull request
#[async_trait]
pub trait IssueStore: Send + Sync {
    /// Load an issue by ID
    async fn get_issue(&self, id: i64) -> Result<Issue>;
}

/// Lookup of users acting on pull requests
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Load a user by ID
    async fn get_user(&self, id: i64) -> Result<User>;
}
