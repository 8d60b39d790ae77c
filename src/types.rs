//! Core types for pullmerge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Mergeability status of an open pull request
///
/// Only meaningful while the pull request has not been merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestStatus {
    /// Patch does not apply cleanly on the base branch
    Conflict,
    /// A mergeability test is pending or running
    #[default]
    Checking,
    /// Patch applies cleanly on the base branch
    Mergeable,
}

impl std::fmt::Display for PullRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conflict => write!(f, "conflict"),
            Self::Checking => write!(f, "checking"),
            Self::Mergeable => write!(f, "mergeable"),
        }
    }
}

/// A pull request: a proposed integration of a head branch into a base branch
///
/// Head and base may live in the same repository or in a fork pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Row ID, also the test queue key
    pub id: i64,
    /// Per-repository index, shared with the owning issue
    pub index: i64,
    /// The issue carrying title, body and comments
    pub issue_id: i64,
    /// Mergeability status
    pub status: PullRequestStatus,

    /// Repository the head branch lives in
    pub head_repo_id: i64,
    /// Head branch name
    pub head_branch: String,
    /// Owner name of the head repository at creation time
    pub head_user_name: String,
    /// Repository the pull request targets
    pub base_repo_id: i64,
    /// Base branch name
    pub base_branch: String,
    /// Common ancestor of head and base, refreshed on every patch update
    pub merge_base: String,

    /// Whether the pull request has been merged
    pub has_merged: bool,
    /// Head branch tip at the moment of merging
    pub merged_commit_id: Option<String>,
    /// User who performed the merge
    pub merger_id: Option<i64>,
    /// When the merge happened
    pub merged_at: Option<DateTime<Utc>>,
}

impl PullRequest {
    /// Create an unmerged pull request in the checking state
    pub fn new(
        id: i64,
        index: i64,
        issue_id: i64,
        head: (&Repository, &str),
        base: (&Repository, &str),
    ) -> Self {
        Self {
            id,
            index,
            issue_id,
            status: PullRequestStatus::Checking,
            head_repo_id: head.0.id,
            head_branch: head.1.to_string(),
            head_user_name: head.0.owner_name.to_lowercase(),
            base_repo_id: base.0.id,
            base_branch: base.1.to_string(),
            merge_base: String::new(),
            has_merged: false,
            merged_commit_id: None,
            merger_id: None,
            merged_at: None,
        }
    }

    /// Whether a mergeability test is still outstanding
    pub fn is_checking(&self) -> bool {
        self.status == PullRequestStatus::Checking
    }

    /// Whether the pull request can be merged without conflicts
    pub fn can_auto_merge(&self) -> bool {
        self.status == PullRequestStatus::Mergeable
    }

    /// Mergeability as exposed to API consumers
    ///
    /// - `None` while checking
    /// - `Some(false)` on conflict
    /// - `Some(true)` when mergeable
    pub fn mergeable(&self) -> Option<bool> {
        match self.status {
            PullRequestStatus::Checking => None,
            PullRequestStatus::Conflict => Some(false),
            PullRequestStatus::Mergeable => Some(true),
        }
    }

    /// Whether head and base are the same repository
    pub const fn is_same_repo(&self) -> bool {
        self.head_repo_id == self.base_repo_id
    }

    /// The synthetic ref exposing head commits inside the base repository
    pub fn head_ref(&self) -> String {
        format!("refs/pull/{}/head", self.index)
    }
}

/// Per-repository pull request settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullSettings {
    /// Whether the rebase merge style may be used
    pub allow_rebase: bool,
    /// Whether whitespace differences are ignored when testing patches
    pub ignore_whitespace: bool,
}

impl Default for PullSettings {
    fn default() -> Self {
        Self {
            allow_rebase: true,
            ignore_whitespace: false,
        }
    }
}

/// A hosted repository as resolved by the repository store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Repository ID
    pub id: i64,
    /// Owner (user or organization) name
    pub owner_name: String,
    /// Repository name
    pub name: String,
    /// Path of the bare repository on disk
    pub path: PathBuf,
    /// Default branch name
    pub default_branch: String,
    /// Pull request settings
    #[serde(default)]
    pub settings: PullSettings,
}

impl Repository {
    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner_name, self.name)
    }

    /// Directory holding the stored pull request patches
    pub fn pulls_dir(&self) -> PathBuf {
        self.path.join("pulls")
    }

    /// Patch file path for the pull request with the given index
    pub fn patch_path(&self, index: i64) -> PathBuf {
        self.pulls_dir().join(format!("{index}.patch"))
    }
}

/// A user acting on pull requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User ID
    pub id: i64,
    /// Login name, used as git author name
    pub name: String,
    /// Email, used as git author email
    pub email: String,
}

impl User {
    /// Git signature in `Name <email>` form
    pub fn signature(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }
}

/// The issue a pull request belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Issue ID
    pub id: i64,
    /// Per-repository index
    pub index: i64,
    /// Repository the issue lives in
    pub repo_id: i64,
    /// Poster of the issue
    pub poster_id: i64,
    /// Title
    pub title: String,
    /// Body text
    pub body: String,
    /// Whether the issue is closed
    pub is_closed: bool,
}

// =============================================================================
// Merge-related types
// =============================================================================

/// Approach used to integrate the head branch into the base branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeStyle {
    /// Create an explicit merge commit
    #[serde(rename = "create_merge_commit")]
    Regular,
    /// Rebase head commits onto the base branch, then fast-forward
    #[serde(rename = "rebase_before_merging")]
    Rebase,
}

impl MergeStyle {
    /// Stable string form used in settings and forms
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "create_merge_commit",
            Self::Rebase => "rebase_before_merging",
        }
    }
}

impl std::fmt::Display for MergeStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MergeStyle {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_merge_commit" | "merge" | "regular" => Ok(Self::Regular),
            "rebase_before_merging" | "rebase" => Ok(Self::Rebase),
            other => Err(crate::error::Error::UnknownMergeStyle(other.to_string())),
        }
    }
}

/// Merge metadata persisted when a pull request is merged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRecord {
    /// Head branch tip that was merged
    pub merged_commit_id: String,
    /// User who merged
    pub merger_id: i64,
    /// When the merge happened
    pub merged_at: DateTime<Utc>,
    /// Style that was actually used (after any downgrade)
    pub style: MergeStyle,
}

/// Outcome of testing a stored patch against the base branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchTest {
    /// No patch on disk; nothing was tested
    Skipped,
    /// Patch applies cleanly
    Clean,
    /// Patch does not apply
    Conflict,
}
