//! In-process store implementing every collaborator trait

use super::file::save_state;
use super::{IssueStore, PullRequestStore, RepositoryStore, UserStore};
use crate::error::{Error, Result};
use crate::types::{Issue, MergeRecord, PullRequest, PullRequestStatus, Repository, User};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

/// Every entity the store knows about
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreState {
    /// Last assigned pull request ID
    pub last_pull_id: i64,
    /// Last assigned issue ID
    pub last_issue_id: i64,
    /// Known repositories
    pub repositories: Vec<Repository>,
    /// Known users
    pub users: Vec<User>,
    /// Issues, including those backing pull requests
    pub issues: Vec<Issue>,
    /// Pull requests
    pub pull_requests: Vec<PullRequest>,
}

impl StoreState {
    fn pull(&self, id: i64) -> Result<&PullRequest> {
        self.pull_requests
            .iter()
            .find(|p| p.id == id)
            .ok_or(Error::PullRequestNotFound(id))
    }

    fn pull_mut(&mut self, id: i64) -> Result<&mut PullRequest> {
        self.pull_requests
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(Error::PullRequestNotFound(id))
    }

    fn issue_is_open(&self, issue_id: i64) -> bool {
        self.issues
            .iter()
            .any(|i| i.id == issue_id && !i.is_closed)
    }

    fn open_unmerged(&self, filter: impl Fn(&PullRequest) -> bool) -> Vec<PullRequest> {
        self.pull_requests
            .iter()
            .filter(|p| !p.has_merged && self.issue_is_open(p.issue_id) && filter(p))
            .cloned()
            .collect()
    }
}

/// Mutex-guarded [`StoreState`], optionally written through to a TOML file
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub(super) state: Mutex<StoreState>,
    pub(super) path: Option<PathBuf>,
}

impl MemoryStore {
    /// Empty, non-persistent store
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-persistent store seeded with `state`
    pub fn from_state(state: StoreState) -> Self {
        Self {
            state: Mutex::new(state),
            path: None,
        }
    }

    fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> T {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Apply `f` to a copy of the state and keep it only if it was persisted
    fn mutate<T>(&self, f: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = state.clone();
        let out = f(&mut next)?;
        if let Some(ref path) = self.path {
            save_state(path, &next)?;
        }
        *state = next;
        Ok(out)
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> StoreState {
        self.read(Clone::clone)
    }

    /// Insert or replace a repository
    pub fn add_repository(&self, repo: Repository) -> Result<()> {
        self.mutate(|s| {
            s.repositories.retain(|r| r.id != repo.id);
            s.repositories.push(repo);
            Ok(())
        })
    }

    /// Insert or replace a user
    pub fn add_user(&self, user: User) -> Result<()> {
        self.mutate(|s| {
            s.users.retain(|u| u.id != user.id);
            s.users.push(user);
            Ok(())
        })
    }

    /// Create an open issue with the next index of its repository
    pub fn create_issue(
        &self,
        repo_id: i64,
        poster_id: i64,
        title: &str,
        body: &str,
    ) -> Result<Issue> {
        self.mutate(|s| {
            if !s.repositories.iter().any(|r| r.id == repo_id) {
                return Err(Error::RepoNotFound(repo_id));
            }
            let index = s
                .issues
                .iter()
                .filter(|i| i.repo_id == repo_id)
                .map(|i| i.index)
                .max()
                .unwrap_or(0)
                + 1;
            s.last_issue_id += 1;
            let issue = Issue {
                id: s.last_issue_id,
                index,
                repo_id,
                poster_id,
                title: title.to_string(),
                body: body.to_string(),
                is_closed: false,
            };
            s.issues.push(issue.clone());
            Ok(issue)
        })
    }

    /// Delete a single pull request row
    pub fn remove_pull_request(&self, id: i64) -> Result<()> {
        self.mutate(|s| {
            s.pull(id)?;
            s.pull_requests.retain(|p| p.id != id);
            Ok(())
        })
    }

    /// All pull requests, optionally limited to one base repository
    pub fn pull_requests(&self, base_repo_id: Option<i64>) -> Vec<PullRequest> {
        self.read(|s| {
            s.pull_requests
                .iter()
                .filter(|p| base_repo_id.is_none_or(|id| p.base_repo_id == id))
                .cloned()
                .collect()
        })
    }
}

#[async_trait]
impl PullRequestStore for MemoryStore {
    async fn get_pull_request(&self, id: i64) -> Result<PullRequest> {
        self.read(|s| s.pull(id).cloned())
    }

    async fn create_pull_request(&self, mut pr: PullRequest) -> Result<PullRequest> {
        self.mutate(|s| {
            s.last_pull_id += 1;
            pr.id = s.last_pull_id;
            s.pull_requests.push(pr.clone());
            Ok(pr)
        })
    }

    async fn update_status(&self, id: i64, status: PullRequestStatus) -> Result<()> {
        self.mutate(|s| {
            let pr = s.pull_mut(id)?;
            if pr.has_merged {
                return Err(Error::AlreadyMerged(id));
            }
            pr.status = status;
            Ok(())
        })
    }

    async fn update_merge_base(&self, id: i64, merge_base: &str) -> Result<()> {
        self.mutate(|s| {
            let pr = s.pull_mut(id)?;
            if pr.has_merged {
                return Err(Error::AlreadyMerged(id));
            }
            pr.merge_base = merge_base.to_string();
            Ok(())
        })
    }

    async fn complete_merge(&self, id: i64, record: &MergeRecord) -> Result<PullRequest> {
        self.mutate(|s| {
            let pr = s.pull(id)?;
            if pr.has_merged {
                return Err(Error::AlreadyMerged(id));
            }
            let issue_id = pr.issue_id;
            let issue = s
                .issues
                .iter_mut()
                .find(|i| i.id == issue_id)
                .ok_or(Error::IssueNotFound(issue_id))?;
            issue.is_closed = true;

            let pr = s.pull_mut(id)?;
            pr.has_merged = true;
            pr.merged_commit_id = Some(record.merged_commit_id.clone());
            pr.merger_id = Some(record.merger_id);
            pr.merged_at = Some(record.merged_at);
            Ok(pr.clone())
        })
    }

    async fn list_by_status(&self, status: PullRequestStatus) -> Result<Vec<PullRequest>> {
        Ok(self.read(|s| {
            s.pull_requests
                .iter()
                .filter(|p| !p.has_merged && p.status == status)
                .cloned()
                .collect()
        }))
    }

    async fn list_unmerged_by_head(
        &self,
        repo_id: i64,
        branch: &str,
    ) -> Result<Vec<PullRequest>> {
        Ok(self.read(|s| {
            s.open_unmerged(|p| p.head_repo_id == repo_id && p.head_branch == branch)
        }))
    }

    async fn list_unmerged_by_base(
        &self,
        repo_id: i64,
        branch: &str,
    ) -> Result<Vec<PullRequest>> {
        Ok(self.read(|s| {
            s.open_unmerged(|p| p.base_repo_id == repo_id && p.base_branch == branch)
        }))
    }

    async fn delete_by_base_repo(&self, repo_id: i64) -> Result<Vec<PullRequest>> {
        self.mutate(|s| {
            let (removed, kept) = std::mem::take(&mut s.pull_requests)
                .into_iter()
                .partition(|p| p.base_repo_id == repo_id);
            s.pull_requests = kept;
            Ok(removed)
        })
    }
}

#[async_trait]
impl RepositoryStore for MemoryStore {
    async fn get_repository(&self, id: i64) -> Result<Repository> {
        self.read(|s| s.repositories.iter().find(|r| r.id == id).cloned())
            .ok_or(Error::RepoNotFound(id))
    }
}

#[async_trait]
impl IssueStore for MemoryStore {
    async fn get_issue(&self, id: i64) -> Result<Issue> {
        self.read(|s| s.issues.iter().find(|i| i.id == id).cloned())
            .ok_or(Error::IssueNotFound(id))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user(&self, id: i64) -> Result<User> {
        self.read(|s| s.users.iter().find(|u| u.id == id).cloned())
            .ok_or(Error::UserNotFound(id))
    }
}
