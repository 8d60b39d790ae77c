//! Merge execution - effectful operations
//!
//! Runs a [`MergePlan`] in a disposable clone. The temporary directory is
//! removed when this function returns, whatever the outcome; the base
//! repository itself is only touched by the final push.

use crate::config::Config;
use crate::error::Result;
use crate::git::{Git, ops};
use crate::merge::plan::{MergePlan, MergeStep};
use crate::types::{MergeStyle, User};
use async_trait::async_trait;
use tracing::{debug, info};

/// Progress reporting for merge execution
#[async_trait]
pub trait ProgressCallback: Send + Sync {
    /// Called before each step runs
    async fn on_step(&self, step: &MergeStep);

    /// Free-form status message
    async fn on_message(&self, message: &str);
}

/// Progress callback that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

#[async_trait]
impl ProgressCallback for NoopProgress {
    async fn on_step(&self, _step: &MergeStep) {}

    async fn on_message(&self, _message: &str) {}
}

/// Result of a successful merge execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Style that was used
    pub style: MergeStyle,
    /// Base branch tip after the push
    pub base_commit_id: String,
}

/// Execute the merge plan (EFFECTFUL)
///
/// `merger` is the committer of every new commit. Any failing step aborts the
/// merge with that step attached to the error.
pub async fn execute_merge(
    git: &Git,
    config: &Config,
    plan: &MergePlan,
    merger: &User,
    progress: &dyn ProgressCallback,
) -> Result<MergeOutcome> {
    let parent = config.temp_repos_dir();
    tokio::fs::create_dir_all(&parent).await?;
    let tmp = tempfile::Builder::new()
        .prefix(&format!("merge-{}-", plan.pr_id))
        .tempdir_in(&parent)?;
    let workdir = tmp.path();

    if plan.downgraded() {
        progress
            .on_message("Rebase merges are disabled; creating a merge commit instead")
            .await;
    }

    for step in &plan.steps {
        progress.on_step(step).await;
        git.command(step.git_step())
            .args(step.args(workdir))
            .current_dir(workdir)
            .env("GIT_COMMITTER_NAME", &merger.name)
            .env("GIT_COMMITTER_EMAIL", &merger.email)
            .run()
            .await?;
        debug!(pr = plan.pr_id, %step, "merge step done");
    }

    let base_commit_id = ops::head_commit_id(git, workdir).await?;
    info!(
        pr = plan.pr_id,
        style = %plan.style,
        base = %plan.base_branch,
        commit = %base_commit_id,
        "merged"
    );

    Ok(MergeOutcome {
        style: plan.style,
        base_commit_id,
    })
}
