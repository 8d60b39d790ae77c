//! Merge executor
//!
//! Two-phase pattern:
//! 1. Plan - resolve the effective style and list git commands (pure, testable)
//! 2. Execute - run them in a disposable clone and push (effectful)

mod execute;
mod plan;

pub use execute::{MergeOutcome, NoopProgress, ProgressCallback, execute_merge};
pub use plan::{
    HEAD_REMOTE, MergePlan, MergeRequest, MergeStep, MergeStrategy, RebaseMerge, RegularMerge,
    create_merge_plan, merge_commit_message, strategy_for,
};
