//! Persistence of [`StoreState`] as a TOML file.

use super::memory::{MemoryStore, StoreState};
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Load store state from disk.
///
/// Returns an empty `StoreState` if the file doesn't exist.
pub fn load_state(path: &Path) -> Result<StoreState> {
    if !path.exists() {
        return Ok(StoreState::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Store(format!("failed to read {}: {e}", path.display())))?;

    toml::from_str(&content)
        .map_err(|e| Error::Store(format!("failed to parse {}: {e}", path.display())))
}

/// Save store state to disk.
///
/// Creates the parent directory if it doesn't exist. The file is written to a
/// sibling and renamed into place so readers never see a partial write.
pub fn save_state(path: &Path, state: &StoreState) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .map_err(|e| Error::Store(format!("failed to create {}: {e}", dir.display())))?;
        }
    }

    let content = toml::to_string_pretty(state)
        .map_err(|e| Error::Store(format!("failed to serialize store state: {e}")))?;

    let content_with_header = format!(
        "# pullmerge state\n# Auto-generated - manual edits may be overwritten\n\n{content}"
    );

    let tmp = path.with_extension("toml.tmp");
    fs::write(&tmp, content_with_header)
        .map_err(|e| Error::Store(format!("failed to write {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path)
        .map_err(|e| Error::Store(format!("failed to write {}: {e}", path.display())))?;

    Ok(())
}

impl MemoryStore {
    /// Store backed by the TOML file at `path`, written after every change
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = load_state(&path)?;
        Ok(Self {
            state: Mutex::new(state),
            path: Some(path),
        })
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PullRequestStore;
    use crate::types::{PullRequest, PullRequestStatus, PullSettings, Repository, User};
    use tempfile::TempDir;

    fn repo() -> Repository {
        Repository {
            id: 1,
            owner_name: "acme".to_string(),
            name: "widgets".to_string(),
            path: PathBuf::from("/repos/acme/widgets.git"),
            default_branch: "main".to_string(),
            settings: PullSettings {
                allow_rebase: false,
                ignore_whitespace: true,
            },
        }
    }

    #[test]
    fn test_load_missing_file_returns_empty() {
        let temp = TempDir::new().unwrap();
        let state = load_state(&temp.path().join("state.toml")).unwrap();
        assert_eq!(state, StoreState::default());
    }

    #[test]
    fn test_save_creates_directory() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("state.toml");

        save_state(&path, &StoreState::default()).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn test_file_contains_header_comment() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.toml");
        save_state(&path, &StoreState::default()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# pullmerge state"));
        assert!(content.contains("Auto-generated"));
    }

    #[test]
    fn test_corrupt_file_is_store_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.toml");
        fs::write(&path, "pull_requests = 3 = 4").unwrap();
        assert!(matches!(load_state(&path), Err(Error::Store(_))));
    }

    #[tokio::test]
    async fn test_open_store_writes_through() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.toml");

        let store = MemoryStore::open(&path).unwrap();
        store.add_repository(repo()).unwrap();
        store
            .add_user(User {
                id: 5,
                name: "alice".to_string(),
                email: "alice@example.com".to_string(),
            })
            .unwrap();
        let issue = store.create_issue(1, 5, "Fix", "body").unwrap();
        let pr = store
            .create_pull_request(PullRequest::new(
                0,
                issue.index,
                issue.id,
                (&repo(), "feature"),
                (&repo(), "main"),
            ))
            .await
            .unwrap();
        store
            .update_status(pr.id, PullRequestStatus::Conflict)
            .await
            .unwrap();

        let reopened = MemoryStore::open(&path).unwrap();
        let state = reopened.snapshot();
        assert_eq!(state.repositories, vec![repo()]);
        assert_eq!(state.users.len(), 1);
        assert_eq!(state.pull_requests.len(), 1);
        assert_eq!(state.pull_requests[0].status, PullRequestStatus::Conflict);
        assert_eq!(reopened.path(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn test_failed_save_leaves_state_unchanged() {
        use crate::store::IssueStore;
        use crate::types::{MergeRecord, MergeStyle};

        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("state");
        let store = MemoryStore::open(dir.join("state.toml")).unwrap();
        store.add_repository(repo()).unwrap();
        let issue = store.create_issue(1, 5, "Fix", "").unwrap();
        let pr = store
            .create_pull_request(PullRequest::new(
                0,
                issue.index,
                issue.id,
                (&repo(), "feature"),
                (&repo(), "main"),
            ))
            .await
            .unwrap();

        // Writes now fail: the state directory is a plain file.
        fs::remove_dir_all(&dir).unwrap();
        fs::write(&dir, "").unwrap();

        let record = MergeRecord {
            merged_commit_id: "abc123".to_string(),
            merger_id: 5,
            merged_at: chrono::Utc::now(),
            style: MergeStyle::Regular,
        };
        let err = store.complete_merge(pr.id, &record).await.unwrap_err();
        assert!(matches!(err, Error::Store(_)));

        let stored = store.get_pull_request(pr.id).await.unwrap();
        assert!(!stored.has_merged);
        assert_eq!(stored.merged_commit_id, None);
        assert!(!store.get_issue(issue.id).await.unwrap().is_closed);

        let err = store
            .update_status(pr.id, PullRequestStatus::Mergeable)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        assert_eq!(
            store.get_pull_request(pr.id).await.unwrap().status,
            PullRequestStatus::Checking
        );
    }
}
