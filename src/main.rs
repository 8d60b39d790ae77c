//! pullmerge CLI

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::admin::RepoOptions;
use cli::context::CommandContext;
use cli::merge::MergeOptions;
use cli::pulls::OpenOptions;
use cli::sync::SyncOptions;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pullmerge",
    version,
    about = "Pull request mergeability testing and merging for git repositories"
)]
struct Cli {
    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory holding state, working copies and temp clones
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register repositories
    Repo {
        #[command(subcommand)]
        action: RepoAction,
    },
    /// Register users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Open a pull request and test it
    Open {
        /// Base repository ID
        #[arg(long)]
        repo: i64,
        /// Base branch
        #[arg(long)]
        base: String,
        /// Head repository ID (default: the base repository)
        #[arg(long)]
        head_repo: Option<i64>,
        /// Head branch
        #[arg(long)]
        head: String,
        /// Poster user ID
        #[arg(long)]
        poster: i64,
        /// Title
        #[arg(long)]
        title: String,
        /// Body
        #[arg(long, default_value = "")]
        body: String,
    },
    /// Refresh and re-test pull requests after a push to a branch
    Sync {
        /// Repository that received the push
        #[arg(long)]
        repo: i64,
        /// Branch that was pushed
        #[arg(long)]
        branch: String,
        /// Acting user ID
        #[arg(long)]
        doer: i64,
        /// Do not fire synchronized webhooks
        #[arg(long)]
        no_webhooks: bool,
    },
    /// Test one pull request now
    Test {
        /// Pull request ID
        pr: i64,
    },
    /// Merge a mergeable pull request
    Merge {
        /// Pull request ID
        pr: i64,
        /// Acting user ID
        #[arg(long)]
        doer: i64,
        /// Merge style: create_merge_commit or rebase_before_merging
        #[arg(long, default_value = "create_merge_commit")]
        style: String,
        /// Extra commit message paragraph
        #[arg(long, short, default_value = "")]
        message: String,
        /// Show the plan without merging
        #[arg(long)]
        dry_run: bool,
        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },
    /// Publish a pull request's head branch as refs/pull/<index>/head
    PushRef {
        /// Pull request ID
        pr: i64,
    },
    /// Re-test pull requests left checking by an interrupted run, then exit
    Recover,
    /// List pull requests and their status
    Status {
        /// Only pull requests based on this repository
        #[arg(long)]
        repo: Option<i64>,
    },
    /// Remove every pull request of a repository
    DeleteRepo {
        /// Repository ID
        repo: i64,
    },
}

#[derive(Subcommand)]
enum RepoAction {
    /// Register or replace a repository
    Add {
        /// Repository ID
        #[arg(long)]
        id: i64,
        /// Owner name
        #[arg(long)]
        owner: String,
        /// Repository name
        #[arg(long)]
        name: String,
        /// Path of the bare repository
        #[arg(long)]
        path: PathBuf,
        /// Default branch
        #[arg(long, default_value = "main")]
        default_branch: String,
        /// Disallow rebase merges
        #[arg(long)]
        no_rebase: bool,
        /// Ignore whitespace when testing patches
        #[arg(long)]
        ignore_whitespace: bool,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Register or replace a user
    Add {
        /// User ID
        #[arg(long)]
        id: i64,
        /// Login name
        #[arg(long)]
        name: String,
        /// Email
        #[arg(long)]
        email: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("PULLMERGE_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = CommandContext::new(cli.config.as_deref(), cli.data_dir)?;

    match cli.command {
        Commands::Repo {
            action:
                RepoAction::Add {
                    id,
                    owner,
                    name,
                    path,
                    default_branch,
                    no_rebase,
                    ignore_whitespace,
                },
        } => cli::admin::run_repo_add(
            &ctx,
            RepoOptions {
                id,
                owner,
                name,
                path,
                default_branch,
                no_rebase,
                ignore_whitespace,
            },
        )?,
        Commands::User {
            action: UserAction::Add { id, name, email },
        } => cli::admin::run_user_add(&ctx, id, name, email)?,
        Commands::Open {
            repo,
            base,
            head_repo,
            head,
            poster,
            title,
            body,
        } => {
            cli::pulls::run_open(
                &ctx,
                OpenOptions {
                    repo_id: repo,
                    base,
                    head_repo_id: head_repo,
                    head,
                    poster_id: poster,
                    title,
                    body,
                },
            )
            .await?;
        }
        Commands::Sync {
            repo,
            branch,
            doer,
            no_webhooks,
        } => {
            cli::sync::run_sync(
                &ctx,
                SyncOptions {
                    repo_id: repo,
                    branch,
                    doer_id: doer,
                    webhooks: !no_webhooks,
                },
            )
            .await?;
        }
        Commands::Test { pr } => cli::sync::run_test(&ctx, pr).await?,
        Commands::Merge {
            pr,
            doer,
            style,
            message,
            dry_run,
            yes,
        } => {
            cli::merge::run_merge(
                &ctx,
                MergeOptions {
                    pr_id: pr,
                    doer_id: doer,
                    style,
                    message,
                    dry_run,
                    yes,
                },
            )
            .await?;
        }
        Commands::PushRef { pr } => cli::pulls::run_push_ref(&ctx, pr).await?,
        Commands::Recover => cli::sync::run_recover(&ctx).await?,
        Commands::Status { repo } => cli::pulls::run_status(&ctx, repo).await?,
        Commands::DeleteRepo { repo } => cli::pulls::run_delete_repo(&ctx, repo).await?,
    }

    Ok(())
}
