//! Error types for pullmerge

use crate::git::GitStep;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pullmerge
#[derive(Error, Debug)]
pub enum Error {
    /// A git subprocess exited with a non-zero status
    #[error("{step} failed: {stderr}")]
    Git {
        /// The git operation that failed
        step: GitStep,
        /// Verbatim stderr of the subprocess
        stderr: String,
    },

    /// A git subprocess ran past its deadline and was killed
    #[error("{step} timed out after {}s", timeout.as_secs())]
    GitTimeout {
        /// The git operation that timed out
        step: GitStep,
        /// The deadline that was exceeded
        timeout: Duration,
    },

    /// Filesystem or process spawning error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Repository lookup failed
    #[error("repository not found: {0}")]
    RepoNotFound(i64),

    /// Pull request lookup failed
    #[error("pull request not found: {0}")]
    PullRequestNotFound(i64),

    /// Issue lookup failed
    #[error("issue not found: {0}")]
    IssueNotFound(i64),

    /// User lookup failed
    #[error("user not found: {0}")]
    UserNotFound(i64),

    /// The head repository of a pull request was deleted
    #[error("head repository of pull request {0} no longer exists")]
    HeadRepoMissing(i64),

    /// Merge style string did not match a known style
    #[error("unknown merge style: {0}")]
    UnknownMergeStyle(String),

    /// Pull request was already merged; its state is frozen
    #[error("pull request {0} has already been merged")]
    AlreadyMerged(i64),

    /// Persistence layer error
    #[error("store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The git step this error is attached to, if any
    pub const fn step(&self) -> Option<GitStep> {
        match self {
            Self::Git { step, .. } | Self::GitTimeout { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Whether this error means the looked-up entity does not exist
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::RepoNotFound(_)
                | Self::PullRequestNotFound(_)
                | Self::IssueNotFound(_)
                | Self::UserNotFound(_)
        )
    }
}
