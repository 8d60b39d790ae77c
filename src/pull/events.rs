//! Notifications sent by the engine
//!
//! Every failure here is logged and swallowed: by the time these run, the
//! pull request change has been persisted.

use super::Engine;
use crate::git::ops;
use crate::merge::MergeOutcome;
use crate::notify::{
    Action, ActionKind, HookEvent, PullRequestAction, PullRequestPayload, PullRequestView,
    PushPayload,
};
use crate::types::{Issue, MergeStyle, PullRequest, Repository, User};
use tracing::warn;

impl Engine {
    fn pull_request_event(
        pr: &PullRequest,
        issue: &Issue,
        base: &Repository,
        action: PullRequestAction,
        sender: &User,
    ) -> HookEvent {
        HookEvent::PullRequest(PullRequestPayload {
            action,
            index: pr.index,
            pull_request: PullRequestView::new(pr, issue),
            repository: base.full_name(),
            sender: sender.name.clone(),
        })
    }

    async fn send_webhook(&self, repo: &Repository, event: HookEvent) {
        if let Err(e) = self.services.notifier.prepare_webhooks(repo, event).await {
            warn!(repo = %repo.full_name(), error = %e, "failed to prepare webhooks");
        }
    }

    async fn send_action(&self, action: Action) {
        if let Err(e) = self.services.notifier.record_action(action).await {
            warn!(error = %e, "failed to record action");
        }
    }

    /// Fire a pull request webhook, loading the issue and base repository
    pub(super) async fn notify_pull_request(
        &self,
        pr: &PullRequest,
        action: PullRequestAction,
        sender: &User,
    ) {
        let issue = match self.services.issues.get_issue(pr.issue_id).await {
            Ok(issue) => issue,
            Err(e) => {
                warn!(pr = pr.id, error = %e, "cannot notify: issue lookup failed");
                return;
            }
        };
        let base = match self.base_repo(pr).await {
            Ok(base) => base,
            Err(e) => {
                warn!(pr = pr.id, error = %e, "cannot notify: repository lookup failed");
                return;
            }
        };
        let event = Self::pull_request_event(pr, &issue, &base, action, sender);
        self.send_webhook(&base, event).await;
    }

    pub(super) async fn notify_opened(
        &self,
        pr: &PullRequest,
        base: &Repository,
        issue: &Issue,
        poster: &User,
    ) {
        self.send_action(Action::for_pull(
            ActionKind::CreatePullRequest,
            poster,
            base,
            issue,
        ))
        .await;
        let event = Self::pull_request_event(pr, issue, base, PullRequestAction::Opened, poster);
        self.send_webhook(base, event).await;
    }

    /// Feed entry, `closed` webhook and push webhook for a completed merge
    pub(super) async fn notify_merged(
        &self,
        pr: &PullRequest,
        head: &Repository,
        base: &Repository,
        doer: &User,
        outcome: &MergeOutcome,
    ) {
        let issue = match self.services.issues.get_issue(pr.issue_id).await {
            Ok(issue) => issue,
            Err(e) => {
                warn!(pr = pr.id, error = %e, "cannot notify merge: issue lookup failed");
                return;
            }
        };

        self.send_action(Action::for_pull(
            ActionKind::MergePullRequest,
            doer,
            base,
            &issue,
        ))
        .await;
        let event = Self::pull_request_event(pr, &issue, base, PullRequestAction::Closed, doer);
        self.send_webhook(base, event).await;

        let mut commits = match pr.merged_commit_id.as_deref() {
            Some(merged) if !pr.merge_base.is_empty() => {
                let range = format!("{}...{merged}", pr.merge_base);
                ops::rev_list(&self.git, &head.path, &range)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(pr = pr.id, error = %e, "failed to list merged commits");
                        Vec::new()
                    })
            }
            _ => Vec::new(),
        };
        if outcome.style == MergeStyle::Regular {
            commits.insert(0, outcome.base_commit_id.clone());
        }

        let push = HookEvent::Push(PushPayload {
            ref_name: format!("refs/heads/{}", pr.base_branch),
            before: pr.merge_base.clone(),
            after: outcome.base_commit_id.clone(),
            commits,
            repository: base.full_name(),
            sender: doer.name.clone(),
        });
        self.send_webhook(base, push).await;
    }
}
