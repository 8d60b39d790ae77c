//! Repo and user commands - register entities in the local state file

use crate::cli::context::CommandContext;
use crate::cli::style::{Stylize, check};
use anstream::println;
use pullmerge::error::{Error, Result};
use pullmerge::types::{PullSettings, Repository, User};
use std::path::PathBuf;

/// Options for `repo add`
#[derive(Debug, Clone)]
pub struct RepoOptions {
    /// Repository ID
    pub id: i64,
    /// Owner name
    pub owner: String,
    /// Repository name
    pub name: String,
    /// Path of the bare repository
    pub path: PathBuf,
    /// Default branch
    pub default_branch: String,
    /// Disallow rebase merges
    pub no_rebase: bool,
    /// Ignore whitespace when testing patches
    pub ignore_whitespace: bool,
}

/// Register or replace a repository
pub fn run_repo_add(ctx: &CommandContext, options: RepoOptions) -> Result<()> {
    let path = options
        .path
        .canonicalize()
        .map_err(|e| Error::Config(format!("{}: {e}", options.path.display())))?;
    let repo = Repository {
        id: options.id,
        owner_name: options.owner,
        name: options.name,
        path,
        default_branch: options.default_branch,
        settings: PullSettings {
            allow_rebase: !options.no_rebase,
            ignore_whitespace: options.ignore_whitespace,
        },
    };
    let full_name = repo.full_name();
    ctx.store.add_repository(repo)?;
    println!(
        "{} Registered repository {} ({})",
        check(),
        full_name.accent(),
        options.id
    );
    Ok(())
}

/// Register or replace a user
pub fn run_user_add(ctx: &CommandContext, id: i64, name: String, email: String) -> Result<()> {
    let user = User { id, name, email };
    let signature = user.signature();
    ctx.store.add_user(user)?;
    println!("{} Registered user {}", check(), signature.emphasis());
    Ok(())
}
