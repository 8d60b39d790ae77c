//! Repository-level git operations built on [`GitCommand`](super::GitCommand)

use super::{Git, GitStep};
use crate::error::Result;
use std::path::Path;
use tracing::debug;

/// Add a named remote to the repository at `repo`
pub async fn remote_add(git: &Git, repo: &Path, name: &str, url: &Path) -> Result<()> {
    git.command(GitStep::RemoteAdd)
        .args(["remote", "add", name])
        .arg(url)
        .current_dir(repo)
        .run()
        .await?;
    Ok(())
}

/// Remove a named remote from the repository at `repo`
pub async fn remote_remove(git: &Git, repo: &Path, name: &str) -> Result<()> {
    git.command(GitStep::RemoteRemove)
        .args(["remote", "remove", name])
        .current_dir(repo)
        .run()
        .await?;
    Ok(())
}

/// Fetch a remote into the repository at `repo`
pub async fn fetch(git: &Git, repo: &Path, remote: &str) -> Result<()> {
    git.command(GitStep::Fetch)
        .args(["fetch", "--quiet", remote])
        .current_dir(repo)
        .run()
        .await?;
    Ok(())
}

/// Most recent common ancestor of two revisions
pub async fn merge_base(git: &Git, repo: &Path, a: &str, b: &str) -> Result<String> {
    let out = git
        .command(GitStep::MergeBase)
        .args(["merge-base", a, b])
        .current_dir(repo)
        .run()
        .await?;
    Ok(out.trim().to_string())
}

/// Binary diff between two revisions, suitable for `git apply`
pub async fn diff_binary(git: &Git, repo: &Path, from: &str, to: &str) -> Result<Vec<u8>> {
    git.command(GitStep::Diff)
        .args(["diff", "--binary", "--full-index", from, to])
        .current_dir(repo)
        .output()
        .await
}

/// Commit ID at the tip of a local branch
pub async fn branch_commit_id(git: &Git, repo: &Path, branch: &str) -> Result<String> {
    let out = git
        .command(GitStep::RevParse)
        .args(["rev-parse", "--verify"])
        .arg(format!("refs/heads/{branch}^{{commit}}"))
        .current_dir(repo)
        .run()
        .await?;
    Ok(out.trim().to_string())
}

/// Commit ID `HEAD` points at
pub async fn head_commit_id(git: &Git, repo: &Path) -> Result<String> {
    let out = git
        .command(GitStep::RevParse)
        .args(["rev-parse", "--verify", "HEAD^{commit}"])
        .current_dir(repo)
        .run()
        .await?;
    Ok(out.trim().to_string())
}

/// Commit IDs in a revision range, newest first
pub async fn rev_list(git: &Git, repo: &Path, range: &str) -> Result<Vec<String>> {
    let out = git
        .command(GitStep::RevList)
        .args(["rev-list", range])
        .current_dir(repo)
        .run()
        .await?;
    Ok(out.lines().map(str::to_string).collect())
}

/// Make the local working copy at `local` mirror `branch` of `origin_path`
///
/// Clones when the copy does not exist yet. Otherwise fetches, force-checks out
/// the branch (discarding local changes) and hard-resets to the upstream tip so
/// that force pushes are picked up.
///
/// Callers must hold the repository's working-copy lock.
pub async fn update_local_copy_branch(
    git: &Git,
    origin_path: &Path,
    local: &Path,
    branch: &str,
) -> Result<()> {
    if !tokio::fs::try_exists(local).await.unwrap_or(false) {
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!(local = %local.display(), branch, "cloning local copy");
        git.command(GitStep::Clone)
            .args(["clone", "--quiet", "-b", branch])
            .arg(origin_path)
            .arg(local)
            .run()
            .await?;
        return Ok(());
    }

    git.command(GitStep::Fetch)
        .args(["fetch", "--quiet", "--prune", "origin"])
        .current_dir(local)
        .run()
        .await?;

    git.command(GitStep::Checkout)
        .args(["checkout", "--quiet", "-f", branch])
        .current_dir(local)
        .run()
        .await?;

    git.command(GitStep::Reset)
        .args(["reset", "--quiet", "--hard"])
        .arg(format!("origin/{branch}"))
        .current_dir(local)
        .run()
        .await?;

    Ok(())
}
