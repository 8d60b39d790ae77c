//! Shared fixtures for pullmerge tests
//!
//! These are test utilities - not every test binary uses all of them.

#![allow(dead_code)]

use async_trait::async_trait;
use pullmerge::config::Config;
use pullmerge::error::{Error, Result};
use pullmerge::notify::{Action, HookEvent, Notifier};
use pullmerge::pull::{Collaborators, NewPullRequest};
use pullmerge::store::MemoryStore;
use pullmerge::types::{PullRequest, PullSettings, Repository, User};
use pullmerge::Engine;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// =============================================================================
// Git helpers
// =============================================================================

/// Run git in `dir`, panicking with stderr on failure
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=Test User",
            "-c",
            "user.email=test@example.com",
            "-c",
            "init.defaultBranch=main",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("failed to spawn git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

// =============================================================================
// TempGitServer
// =============================================================================

/// Bare repositories, a file-less store and a recording notifier in a temp dir
pub struct TempGitServer {
    dir: TempDir,
    /// Store shared by every engine built from this server
    pub store: Arc<MemoryStore>,
    /// Notifier shared by every engine built from this server
    pub notifier: Arc<RecordingNotifier>,
    /// Engine configuration, data dir inside the temp dir
    pub config: Config,
}

impl TempGitServer {
    /// Create an empty server
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let config = Config::with_data_dir(dir.path().join("data"));
        Self {
            dir,
            store: Arc::new(MemoryStore::new()),
            notifier: Arc::new(RecordingNotifier::default()),
            config,
        }
    }

    /// Root of the temp dir
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Engine with its own queue and lock pool over this server's store
    pub fn engine(&self) -> Engine {
        let notifier: Arc<dyn Notifier> = self.notifier.clone();
        let services = Collaborators::from_store(Arc::clone(&self.store), notifier);
        Engine::with_defaults(self.config.clone(), services)
    }

    /// Register a user
    pub fn user(&self, id: i64, name: &str) -> User {
        let user = User {
            id,
            name: name.to_string(),
            email: format!("{name}@example.com"),
        };
        self.store.add_user(user.clone()).expect("add user");
        user
    }

    /// Create a bare repository with one commit on `main`
    pub fn create_repo(&self, id: i64, owner: &str, name: &str) -> Repository {
        let path = self.repo_path(owner, name);
        fs::create_dir_all(&path).expect("create repo dir");
        git(&path, &["init", "--quiet", "--bare"]);
        git(&path, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        let repo = self.register(id, owner, name, path);
        self.commit_file(&repo, "main", None, "README.md", "hello\n", "Initial commit");
        repo
    }

    /// Fork `base` into a new bare repository owned by `owner`
    pub fn fork(&self, base: &Repository, id: i64, owner: &str) -> Repository {
        let path = self.repo_path(owner, &base.name);
        fs::create_dir_all(path.parent().expect("fork parent")).expect("create owner dir");
        git(
            self.root(),
            &[
                "clone",
                "--quiet",
                "--bare",
                base.path.to_str().expect("utf-8 path"),
                path.to_str().expect("utf-8 path"),
            ],
        );
        self.register(id, owner, &base.name, path)
    }

    /// Replace the pull request settings of a repository
    pub fn set_settings(&self, repo: &Repository, settings: PullSettings) -> Repository {
        let mut repo = repo.clone();
        repo.settings = settings;
        self.store.add_repository(repo.clone()).expect("update repo");
        repo
    }

    fn repo_path(&self, owner: &str, name: &str) -> PathBuf {
        self.root()
            .join("repos")
            .join(owner)
            .join(format!("{name}.git"))
    }

    fn register(&self, id: i64, owner: &str, name: &str, path: PathBuf) -> Repository {
        let repo = Repository {
            id,
            owner_name: owner.to_string(),
            name: name.to_string(),
            path,
            default_branch: "main".to_string(),
            settings: PullSettings::default(),
        };
        self.store.add_repository(repo.clone()).expect("add repo");
        repo
    }

    /// Commit `content` to `file` on `branch` and push it
    ///
    /// The branch starts from `start` (or its own tip when it already exists).
    /// Returns the new commit ID.
    pub fn commit_file(
        &self,
        repo: &Repository,
        branch: &str,
        start: Option<&str>,
        file: &str,
        content: &str,
        message: &str,
    ) -> String {
        let work = TempDir::new_in(self.root()).expect("create work dir");
        let dir = work.path();
        git(
            dir,
            &[
                "clone",
                "--quiet",
                repo.path.to_str().expect("utf-8 path"),
                ".",
            ],
        );

        let from = start.unwrap_or(branch);
        let exists = !git(dir, &["ls-remote", "--heads", "origin", from]).is_empty();
        if exists {
            git(
                dir,
                &["checkout", "--quiet", "-B", branch, &format!("origin/{from}")],
            );
        } else {
            git(dir, &["symbolic-ref", "HEAD", &format!("refs/heads/{branch}")]);
        }

        fs::write(dir.join(file), content).expect("write file");
        git(dir, &["add", file]);
        git(dir, &["commit", "--quiet", "-m", message]);
        git(
            dir,
            &[
                "push",
                "--quiet",
                "--force",
                "origin",
                &format!("HEAD:refs/heads/{branch}"),
            ],
        );
        git(dir, &["rev-parse", "HEAD"])
    }

    /// Commit ID a ref of `repo` points at
    pub fn rev_parse(&self, repo: &Repository, rev: &str) -> String {
        git(&repo.path, &["rev-parse", "--verify", rev])
    }

    /// Tip of `branch` in `repo`
    pub fn branch_tip(&self, repo: &Repository, branch: &str) -> String {
        self.rev_parse(repo, &format!("refs/heads/{branch}"))
    }

    /// Parent commit IDs of `rev`
    pub fn parents(&self, repo: &Repository, rev: &str) -> Vec<String> {
        git(&repo.path, &["rev-list", "--parents", "-n", "1", rev])
            .split_whitespace()
            .skip(1)
            .map(str::to_string)
            .collect()
    }

    /// Content of `file` at `rev`
    pub fn show(&self, repo: &Repository, rev: &str, file: &str) -> String {
        git(&repo.path, &["show", &format!("{rev}:{file}")])
    }

    /// Make every push to `repo` fail
    #[cfg(unix)]
    pub fn reject_pushes(&self, repo: &Repository) {
        use std::os::unix::fs::PermissionsExt;

        let hook = repo.path.join("hooks").join("pre-receive");
        fs::create_dir_all(hook.parent().expect("hooks dir")).expect("create hooks dir");
        fs::write(&hook, "#!/bin/sh\necho 'pushes are frozen' >&2\nexit 1\n")
            .expect("write hook");
        fs::set_permissions(&hook, fs::Permissions::from_mode(0o755)).expect("chmod hook");
    }

    /// Entries left in the temp clone directory
    pub fn temp_clones(&self) -> Vec<PathBuf> {
        match fs::read_dir(self.config.temp_repos_dir()) {
            Ok(entries) => entries.map(|e| e.expect("dir entry").path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Open a pull request of `head_branch` into `base_branch` through the engine
    pub async fn open_pr(
        &self,
        engine: &Engine,
        poster: &User,
        head: (&Repository, &str),
        base: (&Repository, &str),
    ) -> PullRequest {
        let (head_repo, head_branch) = head;
        let (base_repo, base_branch) = base;
        let issue = self
            .store
            .create_issue(base_repo.id, poster.id, &format!("Merge {head_branch}"), "")
            .expect("create issue");
        let patch = engine
            .compute_patch(head_repo.id, head_branch, base_repo.id, base_branch)
            .await
            .expect("compute patch");
        engine
            .new_pull_request(
                poster,
                NewPullRequest {
                    issue_id: issue.id,
                    head_repo_id: head_repo.id,
                    head_branch: head_branch.to_string(),
                    base_branch: base_branch.to_string(),
                    patch,
                },
            )
            .await
            .expect("open pull request")
    }
}

// =============================================================================
// RecordingNotifier
// =============================================================================

/// Notifier that records everything it is given
///
/// Features:
/// - Webhook events and feed actions captured in order
/// - Error injection to check that failures never undo a change
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<HookEvent>>,
    actions: Mutex<Vec<Action>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    /// Webhook events received so far
    pub fn events(&self) -> Vec<HookEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Feed actions received so far
    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().unwrap().clone()
    }

    /// Make every later call fail
    pub fn fail_all(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Internal("notifier unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn prepare_webhooks(&self, _repo: &Repository, event: HookEvent) -> Result<()> {
        self.check()?;
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    async fn record_action(&self, action: Action) -> Result<()> {
        self.check()?;
        self.actions.lock().unwrap().push(action);
        Ok(())
    }
}
