//! Open, status, push-ref and delete-repo commands

use crate::cli::context::CommandContext;
use crate::cli::style::{Stylize, check, spinner_style};
use anstream::println;
use indicatif::ProgressBar;
use pullmerge::error::Result;
use pullmerge::pull::NewPullRequest;
use pullmerge::store::{IssueStore, PullRequestStore};
use pullmerge::types::PullRequest;
use std::time::Duration;

/// Options for the open command
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Base repository ID
    pub repo_id: i64,
    /// Base branch
    pub base: String,
    /// Head repository ID, defaults to the base repository
    pub head_repo_id: Option<i64>,
    /// Head branch
    pub head: String,
    /// Poster user ID
    pub poster_id: i64,
    /// Title
    pub title: String,
    /// Body
    pub body: String,
}

/// Run the open command
pub async fn run_open(ctx: &CommandContext, options: OpenOptions) -> Result<()> {
    let poster = ctx.user(options.poster_id).await?;
    let head_repo_id = options.head_repo_id.unwrap_or(options.repo_id);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(spinner_style());
    spinner.set_message(format!(
        "Comparing {} with {}...",
        options.head.accent(),
        options.base.accent()
    ));
    spinner.enable_steady_tick(Duration::from_millis(80));

    let patch = match ctx
        .engine
        .compute_patch(head_repo_id, &options.head, options.repo_id, &options.base)
        .await
    {
        Ok(patch) => patch,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e);
        }
    };

    let issue = ctx.store.create_issue(
        options.repo_id,
        poster.id,
        &options.title,
        &options.body,
    )?;
    spinner.set_message("Testing mergeability...");
    let opened = ctx
        .engine
        .new_pull_request(
            &poster,
            NewPullRequest {
                issue_id: issue.id,
                head_repo_id,
                head_branch: options.head.clone(),
                base_branch: options.base.clone(),
                patch,
            },
        )
        .await;
    let pr = match opened {
        Ok(pr) => pr,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e);
        }
    };

    spinner.finish_with_message(format!(
        "{} Opened pull request {} (#{}): {}",
        check(),
        pr.id.to_string().accent(),
        pr.index,
        status_label(&pr)
    ));
    Ok(())
}

/// Run the status command
pub async fn run_status(ctx: &CommandContext, repo_id: Option<i64>) -> Result<()> {
    let prs = ctx.store.pull_requests(repo_id);
    if prs.is_empty() {
        println!("{}", "No pull requests.".muted());
        return Ok(());
    }

    for pr in &prs {
        let title = match ctx.store.get_issue(pr.issue_id).await {
            Ok(issue) => issue.title,
            Err(_) => String::new(),
        };
        println!(
            "{:>4}  #{:<4} {} {} {}  {}  {}",
            pr.id.to_string().accent(),
            pr.index,
            pr.head_branch,
            "→".muted(),
            pr.base_branch,
            status_label(pr),
            title
        );
    }
    Ok(())
}

/// Run the push-ref command
pub async fn run_push_ref(ctx: &CommandContext, pr_id: i64) -> Result<()> {
    let pr = ctx.store.get_pull_request(pr_id).await?;
    ctx.engine.push_to_base_repo(&pr).await?;
    println!(
        "{} Updated {}",
        check(),
        pr.head_ref().accent()
    );
    Ok(())
}

/// Run the delete-repo command
pub async fn run_delete_repo(ctx: &CommandContext, repo_id: i64) -> Result<()> {
    let removed = ctx.engine.delete_repository_pulls(repo_id).await?;
    println!(
        "{} Removed {removed} pull request(s) of repository {}",
        check(),
        repo_id.to_string().accent()
    );
    Ok(())
}

fn status_label(pr: &PullRequest) -> String {
    if pr.has_merged {
        return "merged".muted();
    }
    let label = pr.status.to_string();
    match pr.mergeable() {
        Some(true) => label.success(),
        Some(false) => label.error(),
        None => label.warn(),
    }
}
