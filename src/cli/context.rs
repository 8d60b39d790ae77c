//! Shared command context for CLI commands

use pullmerge::config::{Config, load_config};
use pullmerge::error::Result;
use pullmerge::notify::LogNotifier;
use pullmerge::pull::Collaborators;
use pullmerge::store::{MemoryStore, UserStore};
use pullmerge::types::User;
use pullmerge::Engine;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Setup shared by every command
///
/// - Load configuration, applying a `--data-dir` override
/// - Open the state file under the data directory
/// - Build an engine whose notifications go to the log
pub struct CommandContext {
    /// Effective configuration
    pub config: Config,
    /// File-backed store
    pub store: Arc<MemoryStore>,
    /// Engine wired to the store
    pub engine: Engine,
}

impl CommandContext {
    /// Create a new command context
    pub fn new(config_path: Option<&Path>, data_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = load_config(config_path)?;
        if let Some(dir) = data_dir {
            config.data_dir = dir;
        }

        let state_path = config.state_path();
        debug!(path = %state_path.display(), "opening state");
        let store = Arc::new(MemoryStore::open(state_path)?);

        let services = Collaborators::from_store(Arc::clone(&store), Arc::new(LogNotifier));
        let engine = Engine::with_defaults(config.clone(), services);

        Ok(Self {
            config,
            store,
            engine,
        })
    }

    /// Look up the acting user
    pub async fn user(&self, id: i64) -> Result<User> {
        self.store.get_user(id).await
    }
}
