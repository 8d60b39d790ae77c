//! Patch generation and mergeability testing
//!
//! A pull request's patch is the binary diff from its merge base to the head
//! branch tip, stored under the base repository. Testing applies that patch
//! with `git apply --check` against the shared working copy of the base
//! repository, so it never mutates a permanent repository.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::git::{Git, GitStep, ops};
use crate::lock::RepoLocks;
use crate::types::{PatchTest, PullRequest, Repository};
use std::path::Path;
use tracing::{debug, info, warn};

/// Merge base and diff of a head branch against a base branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    /// Common ancestor the diff starts from
    pub merge_base: String,
    /// Output of `git diff --binary`
    pub diff: Vec<u8>,
}

/// Compute the patch of `head_branch` (in `head`) against `base_branch` (in `base`)
///
/// A temporary remote pointing at the base repository is added to the head
/// repository for the duration of the call and removed on every path.
pub async fn compute_patch(
    git: &Git,
    head: &Repository,
    base: &Repository,
    head_branch: &str,
    base_branch: &str,
) -> Result<Patch> {
    let remote = format!("tmp-{}", uuid::Uuid::new_v4().simple());
    ops::remote_add(git, &head.path, &remote, &base.path).await?;

    let result = diff_against_remote(git, &head.path, &remote, head_branch, base_branch).await;

    if let Err(e) = ops::remote_remove(git, &head.path, &remote).await {
        warn!(repo = %head.full_name(), %remote, error = %e, "failed to remove temporary remote");
    }

    result
}

async fn diff_against_remote(
    git: &Git,
    repo: &Path,
    remote: &str,
    head_branch: &str,
    base_branch: &str,
) -> Result<Patch> {
    ops::fetch(git, repo, remote).await?;
    let tracking = format!("remotes/{remote}/{base_branch}");
    let merge_base = ops::merge_base(git, repo, &tracking, head_branch).await?;
    let diff = ops::diff_binary(git, repo, &merge_base, head_branch).await?;
    Ok(Patch { merge_base, diff })
}

/// Write a patch for the pull request with `index` into `base`
pub async fn save_patch(base: &Repository, index: i64, diff: &[u8]) -> Result<()> {
    tokio::fs::create_dir_all(base.pulls_dir()).await?;
    tokio::fs::write(base.patch_path(index), diff).await?;
    Ok(())
}

/// Recompute and store the patch of `pr`, returning the new merge base
pub async fn update_patch(
    git: &Git,
    pr: &PullRequest,
    head: &Repository,
    base: &Repository,
) -> Result<String> {
    let patch = compute_patch(git, head, base, &pr.head_branch, &pr.base_branch).await?;
    save_patch(base, pr.index, &patch.diff).await?;
    debug!(
        pr = pr.id,
        merge_base = %patch.merge_base,
        bytes = patch.diff.len(),
        "updated patch"
    );
    Ok(patch.merge_base)
}

/// Dry-run the stored patch of `pr` against the current base branch
///
/// A missing patch file is reported as [`PatchTest::Skipped`], not an error.
/// Holds the base repository's working-copy lock while touching the local copy.
pub async fn test_patch(
    git: &Git,
    locks: &RepoLocks,
    config: &Config,
    pr: &PullRequest,
    base: &Repository,
) -> Result<PatchTest> {
    let patch_path = base.patch_path(pr.index);
    if !tokio::fs::try_exists(&patch_path).await.unwrap_or(false) {
        info!(
            pr = pr.id,
            path = %patch_path.display(),
            "patch file missing, skipping test"
        );
        return Ok(PatchTest::Skipped);
    }

    let _guard = locks.lock(base.id).await;

    let local = config.local_copy_path(base.id);
    ops::update_local_copy_branch(git, &base.path, &local, &pr.base_branch).await?;

    let mut cmd = git.command(GitStep::Apply).args(["apply", "--check"]);
    if base.settings.ignore_whitespace {
        cmd = cmd.arg("--ignore-whitespace");
    }

    match cmd.arg(&patch_path).current_dir(&local).run().await {
        Ok(_) => Ok(PatchTest::Clean),
        Err(Error::Git { stderr, .. }) => {
            debug!(pr = pr.id, %stderr, "patch does not apply");
            Ok(PatchTest::Conflict)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PullSettings;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn repo_at(path: PathBuf) -> Repository {
        Repository {
            id: 1,
            owner_name: "acme".to_string(),
            name: "widgets".to_string(),
            path,
            default_branch: "main".to_string(),
            settings: PullSettings::default(),
        }
    }

    #[tokio::test]
    async fn test_save_patch_creates_pulls_dir() {
        let temp = TempDir::new().unwrap();
        let base = repo_at(temp.path().to_path_buf());

        save_patch(&base, 4, b"diff --git a/x b/x\n").await.unwrap();

        let written = std::fs::read(base.patch_path(4)).unwrap();
        assert_eq!(written, b"diff --git a/x b/x\n");
    }

    #[tokio::test]
    async fn test_missing_patch_is_skipped_without_locking() {
        let temp = TempDir::new().unwrap();
        let base = repo_at(temp.path().join("base.git"));
        let pr = PullRequest::new(1, 1, 1, (&base, "feature"), (&base, "main"));
        let locks = RepoLocks::new();
        let _held = locks.lock(base.id).await;

        // Would deadlock if the lock were taken before the existence check.
        let outcome = test_patch(
            &Git::default(),
            &locks,
            &Config::with_data_dir(temp.path()),
            &pr,
            &base,
        )
        .await
        .unwrap();

        assert_eq!(outcome, PatchTest::Skipped);
    }

    #[tokio::test]
    async fn test_compute_patch_unknown_repo_names_step() {
        let temp = TempDir::new().unwrap();
        let head = repo_at(temp.path().join("missing"));
        let base = repo_at(temp.path().join("also-missing"));

        let err = compute_patch(&Git::default(), &head, &base, "feature", "main")
            .await
            .unwrap_err();
        // Spawning in a missing directory is an IO error; inside a non-repo it is `remote add`.
        assert!(matches!(err, Error::Io(_)) || err.step() == Some(GitStep::RemoteAdd));
    }
}
