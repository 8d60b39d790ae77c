//! pullmerge - pull request mergeability testing and merging
//!
//! Drives the `git` command line to:
//!
//! - keep a binary patch per pull request ([`patch`])
//! - test patches against the base branch in a locked, shared working copy
//!   ([`lock`], [`queue`], [`pull::TestWorker`])
//! - merge with a merge commit or by rebasing, inside a disposable clone
//!   ([`merge`])
//! - expose head commits in the base repository under `refs/pull/<index>/head`
//!   ([`relay`])
//!
//! Storage, webhooks and the activity feed are collaborators behind the
//! traits in [`store`] and [`notify`]. [`pull::Engine`] ties everything
//! together.

pub mod config;
pub mod error;
pub mod git;
pub mod lock;
pub mod merge;
pub mod notify;
pub mod patch;
pub mod pull;
pub mod queue;
pub mod relay;
pub mod store;
pub mod types;

pub use error::{Error, Result};
pub use pull::{Engine, TestWorker};
