//! Expose head branch commits inside the base repository
//!
//! Reviewers of a fork pull request read its commits from the base repository
//! under `refs/pull/<index>/head`, so no access to the fork is needed.

use crate::error::Result;
use crate::git::{Git, GitStep, ops};
use crate::types::{PullRequest, Repository};
use tracing::{debug, warn};

/// Push the head branch of `pr` to its synthetic ref in the base repository
pub async fn push_to_base_repo(
    git: &Git,
    pr: &PullRequest,
    head: &Repository,
    base: &Repository,
) -> Result<()> {
    let remote = format!("tmp-pull-{}", pr.id);
    ops::remote_add(git, &head.path, &remote, &base.path).await?;

    let result = push_head_ref(git, pr, head, base, &remote).await;

    if let Err(e) = ops::remote_remove(git, &head.path, &remote).await {
        warn!(repo = %head.full_name(), %remote, error = %e, "failed to remove temporary remote");
    }

    result
}

async fn push_head_ref(
    git: &Git,
    pr: &PullRequest,
    head: &Repository,
    base: &Repository,
    remote: &str,
) -> Result<()> {
    let head_ref = pr.head_ref();

    // Drop the loose ref of an earlier push; the update below is forced anyway.
    let stale = base.path.join(&head_ref);
    match tokio::fs::remove_file(&stale).await {
        Ok(()) => debug!(path = %stale.display(), "removed stale pull ref"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    git.command(GitStep::Push)
        .args(["push", "--quiet", "--force", remote])
        .arg(format!("refs/heads/{}:{head_ref}", pr.head_branch))
        .current_dir(&head.path)
        .run()
        .await?;

    debug!(pr = pr.id, %head_ref, base = %base.full_name(), "pushed head to base");
    Ok(())
}
