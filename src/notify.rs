//! Notifications emitted after pull request events
//!
//! Delivery belongs to collaborators: the engine hands over typed payloads and
//! only logs failures. Nothing here can roll back a completed merge.

use crate::error::Result;
use crate::types::{Issue, PullRequest, Repository, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// What happened to a pull request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestAction {
    /// Pull request was opened
    Opened,
    /// New commits were pushed to the head branch
    Synchronized,
    /// Pull request was closed by merging
    Closed,
}

/// Pull request fields exposed in webhook payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestView {
    /// Row ID
    pub id: i64,
    /// Per-repository index
    pub index: i64,
    /// Issue title
    pub title: String,
    /// Issue body
    pub body: String,
    /// Head branch
    pub head_branch: String,
    /// Base branch
    pub base_branch: String,
    /// `None` while checking
    pub mergeable: Option<bool>,
    /// Whether merged
    pub has_merged: bool,
    /// Merged head commit
    pub merged_commit_id: Option<String>,
    /// When merged
    pub merged_at: Option<DateTime<Utc>>,
}

impl PullRequestView {
    /// Combine a pull request with its issue
    pub fn new(pr: &PullRequest, issue: &Issue) -> Self {
        Self {
            id: pr.id,
            index: pr.index,
            title: issue.title.clone(),
            body: issue.body.clone(),
            head_branch: pr.head_branch.clone(),
            base_branch: pr.base_branch.clone(),
            mergeable: pr.mergeable(),
            has_merged: pr.has_merged,
            merged_commit_id: pr.merged_commit_id.clone(),
            merged_at: pr.merged_at,
        }
    }
}

/// Payload of a pull request webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestPayload {
    /// Event kind
    pub action: PullRequestAction,
    /// Pull request index
    pub index: i64,
    /// Pull request snapshot
    pub pull_request: PullRequestView,
    /// `owner/name` of the base repository
    pub repository: String,
    /// Login of the acting user
    pub sender: String,
}

/// Payload of a push webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    /// Updated ref, e.g. `refs/heads/main`
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// Commit the ref pointed at before
    pub before: String,
    /// Commit the ref points at now
    pub after: String,
    /// Pushed commits, newest first
    pub commits: Vec<String>,
    /// `owner/name` of the pushed repository
    pub repository: String,
    /// Login of the acting user
    pub sender: String,
}

/// A webhook event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HookEvent {
    /// Pull request event
    PullRequest(PullRequestPayload),
    /// Push event
    Push(PushPayload),
}

/// Kind of activity feed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// A pull request was opened
    CreatePullRequest,
    /// A pull request was merged
    MergePullRequest,
}

/// Activity feed entry for repository watchers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Entry kind
    pub kind: ActionKind,
    /// Acting user
    pub actor: String,
    /// Repository acted upon
    pub repo_id: i64,
    /// `<index>|<title>`
    pub content: String,
}

impl Action {
    /// Feed entry for a pull request event
    pub fn for_pull(kind: ActionKind, actor: &User, repo: &Repository, issue: &Issue) -> Self {
        Self {
            kind,
            actor: actor.name.clone(),
            repo_id: repo.id,
            content: format!("{}|{}", issue.index, issue.title),
        }
    }
}

/// Fire-and-forget notification sink
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Queue webhooks of `repo` for the event
    async fn prepare_webhooks(&self, repo: &Repository, event: HookEvent) -> Result<()>;

    /// Record an activity feed entry for watchers
    async fn record_action(&self, action: Action) -> Result<()>;
}

/// Notifier that writes events to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn prepare_webhooks(&self, repo: &Repository, event: HookEvent) -> Result<()> {
        let payload = serde_json::to_string(&event)
            .map_err(|e| crate::error::Error::Internal(format!("serialize payload: {e}")))?;
        info!(repo = %repo.full_name(), %payload, "webhook");
        Ok(())
    }

    async fn record_action(&self, action: Action) -> Result<()> {
        info!(kind = ?action.kind, actor = %action.actor, repo_id = action.repo_id, content = %action.content, "action");
        Ok(())
    }
}
