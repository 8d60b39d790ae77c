//! Merge planning - pure functions for creating merge plans
//!
//! Everything a merge will do is decided here, from already-resolved
//! repositories and users. No I/O happens in this module, so every style
//! decision and command line can be unit tested.

use crate::git::GitStep;
use crate::types::{MergeStyle, PullRequest, Repository, User};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

/// Name of the remote pointing at the head repository inside the temp clone
pub const HEAD_REMOTE: &str = "head_repo";

/// A single git command in the merge plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeStep {
    /// Clone the base repository into the work directory
    Clone {
        /// Base repository path
        source: PathBuf,
        /// Branch to check out
        branch: String,
    },
    /// Add a remote for the head repository
    AddRemote {
        /// Remote name
        name: String,
        /// Head repository path
        url: PathBuf,
    },
    /// Fetch the head repository
    Fetch {
        /// Remote name
        remote: String,
    },
    /// Merge the head branch, stopping before the commit
    MergeNoCommit {
        /// Remote-tracking head branch
        target: String,
    },
    /// Record the merge commit
    Commit {
        /// `Name <email>` of the merger
        author: String,
        /// Synthesized subject line
        message: String,
        /// Caller-supplied description, if any
        description: Option<String>,
    },
    /// Replay head commits onto the base branch (leaves HEAD detached)
    Rebase {
        /// Base branch
        onto: String,
        /// Remote-tracking head branch
        target: String,
    },
    /// Keep the rebased commits on a new local branch
    CheckoutNewBranch {
        /// Temporary branch name
        branch: String,
    },
    /// Switch to an existing branch
    Checkout {
        /// Branch name
        branch: String,
    },
    /// Fast-forward the current branch to another one
    FastForward {
        /// Branch to fast-forward to
        branch: String,
    },
    /// Push the base branch back to the base repository
    Push {
        /// Base repository path
        destination: PathBuf,
        /// Base branch
        branch: String,
    },
}

impl MergeStep {
    /// The git operation this step runs, attached to failures
    pub const fn git_step(&self) -> GitStep {
        match self {
            Self::Clone { .. } => GitStep::Clone,
            Self::AddRemote { .. } => GitStep::RemoteAdd,
            Self::Fetch { .. } => GitStep::Fetch,
            Self::MergeNoCommit { .. } | Self::FastForward { .. } => GitStep::Merge,
            Self::Commit { .. } => GitStep::Commit,
            Self::Rebase { .. } => GitStep::Rebase,
            Self::CheckoutNewBranch { .. } | Self::Checkout { .. } => GitStep::Checkout,
            Self::Push { .. } => GitStep::Push,
        }
    }

    /// Command line arguments, with `workdir` as the clone destination
    pub fn args(&self, workdir: &Path) -> Vec<OsString> {
        match self {
            Self::Clone { source, branch } => vec![
                os("clone"),
                os("--quiet"),
                os("-b"),
                os(branch),
                os(source),
                os(workdir),
            ],
            Self::AddRemote { name, url } => vec![os("remote"), os("add"), os(name), os(url)],
            Self::Fetch { remote } => vec![os("fetch"), os("--quiet"), os(remote)],
            Self::MergeNoCommit { target } => {
                vec![os("merge"), os("--no-ff"), os("--no-commit"), os(target)]
            }
            Self::Commit {
                author,
                message,
                description,
            } => {
                let mut args = vec![
                    os("commit"),
                    os(format!("--author={author}")),
                    os("-m"),
                    os(message),
                ];
                if let Some(desc) = description {
                    args.extend([os("-m"), os(desc)]);
                }
                args
            }
            Self::Rebase { onto, target } => {
                vec![os("rebase"), os("--quiet"), os(onto), os(target)]
            }
            Self::CheckoutNewBranch { branch } => {
                vec![os("checkout"), os("--quiet"), os("-b"), os(branch)]
            }
            Self::Checkout { branch } => vec![os("checkout"), os("--quiet"), os(branch)],
            Self::FastForward { branch } => {
                vec![os("merge"), os("--quiet"), os("--ff-only"), os(branch)]
            }
            Self::Push {
                destination,
                branch,
            } => vec![os("push"), os("--quiet"), os(destination), os(branch)],
        }
    }
}

fn os(s: impl AsRef<OsStr>) -> OsString {
    s.as_ref().to_os_string()
}

impl fmt::Display for MergeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clone { branch, .. } => write!(f, "clone base branch {branch}"),
            Self::AddRemote { name, .. } => write!(f, "add remote {name}"),
            Self::Fetch { remote } => write!(f, "fetch {remote}"),
            Self::MergeNoCommit { target } => write!(f, "merge {target} (no commit)"),
            Self::Commit { message, .. } => write!(f, "commit \"{message}\""),
            Self::Rebase { onto, target } => write!(f, "rebase {target} onto {onto}"),
            Self::CheckoutNewBranch { branch } => write!(f, "checkout new branch {branch}"),
            Self::Checkout { branch } => write!(f, "checkout {branch}"),
            Self::FastForward { branch } => write!(f, "fast-forward to {branch}"),
            Self::Push { branch, .. } => write!(f, "push {branch} to base repository"),
        }
    }
}

/// Inputs needed to plan a merge, all resolved beforehand
#[derive(Debug, Clone, Copy)]
pub struct MergeRequest<'a> {
    /// Pull request being merged
    pub pr: &'a PullRequest,
    /// Repository holding the head branch
    pub head: &'a Repository,
    /// Repository receiving the merge
    pub base: &'a Repository,
    /// User performing the merge
    pub merger: &'a User,
    /// Style asked for by the caller
    pub style: MergeStyle,
    /// Optional extra commit message paragraph
    pub description: &'a str,
}

/// Produces the integration steps of one merge style
pub trait MergeStrategy: Sync {
    /// Style implemented
    fn style(&self) -> MergeStyle;

    /// Steps run after the head repository has been fetched
    fn integrate(&self, request: &MergeRequest<'_>) -> Vec<MergeStep>;
}

/// Explicit merge commit
#[derive(Debug, Clone, Copy, Default)]
pub struct RegularMerge;

/// Rebase onto the base branch, then fast-forward
#[derive(Debug, Clone, Copy, Default)]
pub struct RebaseMerge;

impl MergeStrategy for RegularMerge {
    fn style(&self) -> MergeStyle {
        MergeStyle::Regular
    }

    fn integrate(&self, request: &MergeRequest<'_>) -> Vec<MergeStep> {
        let pr = request.pr;
        let description = request.description.trim();
        vec![
            MergeStep::MergeNoCommit {
                target: head_tracking_branch(pr),
            },
            MergeStep::Commit {
                author: request.merger.signature(),
                message: merge_commit_message(pr, request.head),
                description: (!description.is_empty()).then(|| description.to_string()),
            },
        ]
    }
}

impl MergeStrategy for RebaseMerge {
    fn style(&self) -> MergeStyle {
        MergeStyle::Rebase
    }

    fn integrate(&self, request: &MergeRequest<'_>) -> Vec<MergeStep> {
        let pr = request.pr;
        let rebased = rebased_branch_name(pr);
        vec![
            MergeStep::Rebase {
                onto: pr.base_branch.clone(),
                target: head_tracking_branch(pr),
            },
            MergeStep::CheckoutNewBranch {
                branch: rebased.clone(),
            },
            MergeStep::Checkout {
                branch: pr.base_branch.clone(),
            },
            MergeStep::FastForward { branch: rebased },
        ]
    }
}

/// Strategy implementing `style`
pub fn strategy_for(style: MergeStyle) -> &'static dyn MergeStrategy {
    match style {
        MergeStyle::Regular => &RegularMerge,
        MergeStyle::Rebase => &RebaseMerge,
    }
}

/// Subject line of a regular merge commit
pub fn merge_commit_message(pr: &PullRequest, head: &Repository) -> String {
    format!(
        "Merge branch '{}' of {}/{} into {}",
        pr.head_branch, pr.head_user_name, head.name, pr.base_branch
    )
}

fn head_tracking_branch(pr: &PullRequest) -> String {
    format!("{HEAD_REMOTE}/{}", pr.head_branch)
}

fn rebased_branch_name(pr: &PullRequest) -> String {
    format!("pull-{}-rebased", pr.id)
}

/// Merge plan - the functional core output
///
/// Created by [`create_merge_plan`] (pure) and run by
/// [`execute_merge`](super::execute_merge) (effectful).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    /// Pull request being merged
    pub pr_id: i64,
    /// Style the caller asked for
    pub requested: MergeStyle,
    /// Style that will actually be used
    pub style: MergeStyle,
    /// Base branch receiving the merge
    pub base_branch: String,
    /// Ordered git commands
    pub steps: Vec<MergeStep>,
}

impl MergePlan {
    /// Whether a requested rebase was turned into a regular merge
    #[must_use]
    pub fn downgraded(&self) -> bool {
        self.requested != self.style
    }
}

/// Create a merge plan (PURE - no I/O, easily testable)
///
/// A rebase requested on a repository that disallows rebase merges is
/// silently planned as a regular merge.
#[must_use]
pub fn create_merge_plan(request: &MergeRequest<'_>) -> MergePlan {
    let style = match request.style {
        MergeStyle::Rebase if !request.base.settings.allow_rebase => MergeStyle::Regular,
        other => other,
    };
    let pr = request.pr;

    let mut steps = vec![
        MergeStep::Clone {
            source: request.base.path.clone(),
            branch: pr.base_branch.clone(),
        },
        MergeStep::AddRemote {
            name: HEAD_REMOTE.to_string(),
            url: request.head.path.clone(),
        },
        MergeStep::Fetch {
            remote: HEAD_REMOTE.to_string(),
        },
    ];
    steps.extend(strategy_for(style).integrate(request));
    steps.push(MergeStep::Push {
        destination: request.base.path.clone(),
        branch: pr.base_branch.clone(),
    });

    MergePlan {
        pr_id: pr.id,
        requested: request.style,
        style,
        base_branch: pr.base_branch.clone(),
        steps,
    }
}
