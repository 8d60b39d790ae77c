//! Configuration loading
//!
//! Settings live in `config.toml` under the platform config directory
//! (`~/.config/pullmerge/config.toml` on Linux). Every key is optional.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name used under the platform config/data directories.
const APP_DIR: &str = "pullmerge";

/// Filename for configuration.
const CONFIG_FILE: &str = "config.toml";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application data directory (local copies, temp clones, CLI state)
    pub data_dir: PathBuf,
    /// Git subprocess settings
    pub git: GitConfig,
}

/// Git subprocess settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Git executable
    pub binary: PathBuf,
    /// Deadline for ordinary git commands, in seconds
    pub timeout_secs: u64,
    /// Deadline for clones, in seconds
    pub clone_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(APP_DIR),
            git: GitConfig::default(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("git"),
            timeout_secs: 60,
            clone_timeout_secs: 300,
        }
    }
}

impl Config {
    /// Configuration rooted at the given data directory, other values default
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Shared working copy of a repository, used for conflict testing
    pub fn local_copy_path(&self, repo_id: i64) -> PathBuf {
        self.data_dir
            .join("tmp")
            .join("local-repo")
            .join(repo_id.to_string())
    }

    /// Parent directory for disposable merge clones
    pub fn temp_repos_dir(&self) -> PathBuf {
        self.data_dir.join("tmp").join("repos")
    }

    /// State file used by the file-backed store
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.toml")
    }

    /// Deadline for ordinary git commands
    pub const fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git.timeout_secs)
    }

    /// Deadline for clones
    pub const fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.git.clone_timeout_secs)
    }
}

/// Default location of the config file, if the platform has a config dir
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE))
}

/// Load configuration.
///
/// An explicit path must exist. Without one, the default location is used
/// when present, otherwise built-in defaults are returned.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => return Ok(Config::default()),
        },
    };

    let content = fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))
}
