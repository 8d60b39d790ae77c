//! Sync, test and recover commands - keep mergeability status current

use crate::cli::context::CommandContext;
use crate::cli::style::{Stylize, check, spinner_style};
use anstream::println;
use indicatif::ProgressBar;
use pullmerge::error::Result;
use pullmerge::store::PullRequestStore;
use pullmerge::TestWorker;
use std::time::Duration;

/// Options for the sync command
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Repository that received the push
    pub repo_id: i64,
    /// Branch that was pushed
    pub branch: String,
    /// Acting user ID
    pub doer_id: i64,
    /// Fire `synchronized` webhooks for pull requests from the branch
    pub webhooks: bool,
}

/// Run the sync command: refresh pull requests after a push and test them
pub async fn run_sync(ctx: &CommandContext, options: SyncOptions) -> Result<()> {
    let doer = ctx.user(options.doer_id).await?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(spinner_style());
    spinner.set_message(format!(
        "Updating pull requests for {}...",
        options.branch.accent()
    ));
    spinner.enable_steady_tick(Duration::from_millis(80));

    let queued = ctx
        .engine
        .add_test_pull_request_task(&doer, options.repo_id, &options.branch, options.webhooks)
        .await;
    let queued = match queued {
        Ok(n) => n,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e);
        }
    };

    spinner.set_message(format!("Testing {queued} pull request(s)..."));
    let mut worker = TestWorker::new(ctx.engine.clone())?;
    let tested = worker.drain().await;

    spinner.finish_with_message(format!(
        "{} Tested {} pull request(s) touching {}",
        check(),
        tested,
        options.branch.accent()
    ));
    Ok(())
}

/// Run the test command: test one pull request now
pub async fn run_test(ctx: &CommandContext, pr_id: i64) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(spinner_style());
    spinner.set_message(format!("Testing pull request {}...", pr_id.to_string().accent()));
    spinner.enable_steady_tick(Duration::from_millis(80));

    let result = ctx.engine.test_pull_request(pr_id).await;
    spinner.finish_and_clear();
    result?;

    let pr = ctx.store.get_pull_request(pr_id).await?;
    let status = if pr.has_merged {
        "merged".muted()
    } else if pr.can_auto_merge() {
        pr.status.to_string().success()
    } else if pr.is_checking() {
        pr.status.to_string().warn()
    } else {
        pr.status.to_string().error()
    };
    println!("Pull request {}: {status}", pr.id.to_string().accent());
    Ok(())
}

/// Run the recover command: re-test pull requests stuck in checking
///
/// Each invocation owns its own queue, so pull requests are only ever left
/// checking by a run that stopped before testing them.
pub async fn run_recover(ctx: &CommandContext) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(spinner_style());
    spinner.set_message("Re-testing pull requests left checking...");
    spinner.enable_steady_tick(Duration::from_millis(80));

    let worker = TestWorker::new(ctx.engine.clone())?;
    let tested = worker.recover().await;

    spinner.finish_with_message(format!("{} Re-tested {tested} pull request(s)", check()));
    Ok(())
}
