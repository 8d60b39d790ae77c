//! Git subprocess runner
//!
//! Every git interaction goes through [`GitCommand`]: the child's exit code
//! and stderr are the whole contract. Non-zero exit becomes [`Error::Git`]
//! with stderr captured verbatim; running past the deadline kills the child
//! and yields [`Error::GitTimeout`].

pub mod ops;

use crate::config::GitConfig;
use crate::error::{Error, Result};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// The git operation a subprocess performs, attached to every failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GitStep {
    /// `git clone`
    Clone,
    /// `git remote add`
    RemoteAdd,
    /// `git remote remove`
    RemoteRemove,
    /// `git fetch`
    Fetch,
    /// `git merge-base`
    MergeBase,
    /// `git diff`
    Diff,
    /// `git apply --check`
    Apply,
    /// `git checkout`
    Checkout,
    /// `git reset`
    Reset,
    /// `git merge`
    Merge,
    /// `git commit`
    Commit,
    /// `git rebase`
    Rebase,
    /// `git push`
    Push,
    /// `git rev-parse`
    RevParse,
    /// `git rev-list`
    RevList,
}

impl std::fmt::Display for GitStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Clone => "git clone",
            Self::RemoteAdd => "git remote add",
            Self::RemoteRemove => "git remote remove",
            Self::Fetch => "git fetch",
            Self::MergeBase => "git merge-base",
            Self::Diff => "git diff",
            Self::Apply => "git apply",
            Self::Checkout => "git checkout",
            Self::Reset => "git reset",
            Self::Merge => "git merge",
            Self::Commit => "git commit",
            Self::Rebase => "git rebase",
            Self::Push => "git push",
            Self::RevParse => "git rev-parse",
            Self::RevList => "git rev-list",
        };
        f.write_str(name)
    }
}

/// Handle to the git executable with its deadlines
#[derive(Debug, Clone)]
pub struct Git {
    binary: PathBuf,
    timeout: Duration,
    clone_timeout: Duration,
}

impl Git {
    /// Create a runner from configuration
    pub fn new(config: &GitConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            clone_timeout: Duration::from_secs(config.clone_timeout_secs),
        }
    }

    /// Start building a command for the given step
    ///
    /// Clones get the clone deadline, everything else the default one.
    pub fn command(&self, step: GitStep) -> GitCommand<'_> {
        let timeout = if step == GitStep::Clone {
            self.clone_timeout
        } else {
            self.timeout
        };
        GitCommand {
            git: self,
            step,
            args: Vec::new(),
            dir: None,
            envs: Vec::new(),
            timeout,
        }
    }
}

impl Default for Git {
    fn default() -> Self {
        Self::new(&GitConfig::default())
    }
}

/// A single git invocation
#[derive(Debug)]
#[must_use = "a GitCommand does nothing until run"]
pub struct GitCommand<'a> {
    git: &'a Git,
    step: GitStep,
    args: Vec<OsString>,
    dir: Option<PathBuf>,
    envs: Vec<(OsString, OsString)>,
    timeout: Duration,
}

impl GitCommand<'_> {
    /// Append one argument
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Run inside the given directory
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set an environment variable for the child
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Override the deadline
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run and return stdout as text
    pub async fn run(self) -> Result<String> {
        let stdout = self.output().await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    /// Run and return raw stdout
    pub async fn output(self) -> Result<Vec<u8>> {
        let step = self.step;
        let mut cmd = Command::new(&self.git.binary);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.dir {
            cmd.current_dir(dir);
        }

        debug!(
            step = %step,
            dir = ?self.dir,
            args = ?self.args,
            "running git"
        );

        // Dropping the output future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::GitTimeout {
                    step,
                    timeout: self.timeout,
                });
            }
        };

        if !output.status.success() {
            return Err(Error::Git {
                step,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(output.stdout)
    }
}
