//! Merge command - merge a mergeable pull request

use crate::cli::CliProgress;
use crate::cli::context::CommandContext;
use crate::cli::style::{Stylize, arrow, check};
use anstream::println;
use dialoguer::Confirm;
use pullmerge::error::{Error, Result};
use pullmerge::merge::{MergePlan, MergeRequest, create_merge_plan};
use pullmerge::store::{PullRequestStore, RepositoryStore};
use pullmerge::types::{MergeStyle, PullRequestStatus};
use pullmerge::TestWorker;

/// Options for the merge command
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Pull request ID
    pub pr_id: i64,
    /// Acting user ID
    pub doer_id: i64,
    /// Requested style, as typed
    pub style: String,
    /// Extra commit message paragraph
    pub message: String,
    /// Show the plan without merging
    pub dry_run: bool,
    /// Skip the confirmation prompt
    pub yes: bool,
}

/// Run the merge command
pub async fn run_merge(ctx: &CommandContext, options: MergeOptions) -> Result<()> {
    // Rejected before anything touches git.
    let style: MergeStyle = options.style.parse()?;

    // =========================================================================
    // Phase 1: GATHER
    // =========================================================================

    let pr = ctx.store.get_pull_request(options.pr_id).await?;
    if pr.has_merged {
        return Err(Error::AlreadyMerged(pr.id));
    }
    if pr.status != PullRequestStatus::Mergeable {
        println!(
            "{} pull request {} is {}; it cannot be merged",
            "✗".error(),
            pr.id.to_string().accent(),
            pr.status.to_string().warn()
        );
        if pr.is_checking() {
            println!("{}", "  Run 'pullmerge test' to check it now.".muted());
        }
        return Ok(());
    }

    let doer = ctx.user(options.doer_id).await?;
    let head = ctx
        .store
        .get_repository(pr.head_repo_id)
        .await
        .map_err(|_| Error::HeadRepoMissing(pr.id))?;
    let base = ctx.store.get_repository(pr.base_repo_id).await?;

    // =========================================================================
    // Phase 2: PLAN
    // =========================================================================

    let plan = create_merge_plan(&MergeRequest {
        pr: &pr,
        head: &head,
        base: &base,
        merger: &doer,
        style,
        description: &options.message,
    });

    if options.dry_run {
        report_merge_plan(&plan);
        println!("{}", "Run without --dry-run to execute.".muted());
        return Ok(());
    }

    if !options.yes {
        report_merge_plan(&plan);
        if !Confirm::new()
            .with_prompt("Proceed with merge?")
            .default(true)
            .interact()
            .map_err(|e| Error::Internal(format!("Failed to read confirmation: {e}")))?
        {
            println!("{}", "Aborted".muted());
            return Ok(());
        }
        println!();
    }

    // =========================================================================
    // Phase 3: EXECUTE
    // =========================================================================

    let progress = CliProgress::spinner(format!(
        "Merging {} into {}...",
        pr.head_branch.accent(),
        pr.base_branch.accent()
    ));
    let merged = match ctx
        .engine
        .merge(pr.id, &doer, style, &options.message, &progress)
        .await
    {
        Ok(merged) => merged,
        Err(e) => {
            progress.abandon();
            return Err(e);
        }
    };
    progress.finish(format!(
        "{} Merged pull request {} ({})",
        check(),
        merged.id.to_string().accent(),
        plan.style
    ));
    if let Some(ref commit) = merged.merged_commit_id {
        println!("   Head commit: {}", commit.muted());
    }

    // The merge queued re-tests of everything targeting the moved branch.
    let mut worker = TestWorker::new(ctx.engine.clone())?;
    let tested = worker.drain().await;
    if tested > 0 {
        println!(
            "{}",
            format!("Re-tested {tested} pull request(s) on {}", merged.base_branch).muted()
        );
    }

    Ok(())
}

fn report_merge_plan(plan: &MergePlan) {
    println!(
        "{} ({}):",
        "Merge plan".emphasis(),
        plan.style.to_string().accent()
    );
    if plan.downgraded() {
        println!(
            "  {}",
            "Rebase merges are disabled for this repository; a merge commit will be created."
                .warn()
        );
    }
    for step in &plan.steps {
        println!("  {} {step}", arrow());
    }
    println!();
}
