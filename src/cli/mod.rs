//! CLI command implementations

pub mod admin;
pub mod context;
pub mod merge;
pub mod pulls;
pub mod style;
pub mod sync;

use async_trait::async_trait;
use indicatif::ProgressBar;
use pullmerge::merge::{MergeStep, ProgressCallback};
use std::time::Duration;
use style::{Stylize, arrow, spinner_style};

/// Spinner-backed progress reporting for merges
pub struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    /// Start a spinner with an initial message
    pub fn spinner(message: impl Into<String>) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(spinner_style());
        spinner.set_message(message.into());
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    /// Stop the spinner, leaving `message` in its place
    pub fn finish(&self, message: impl Into<String>) {
        self.spinner.finish_with_message(message.into());
    }

    /// Stop the spinner and clear it
    pub fn abandon(&self) {
        self.spinner.finish_and_clear();
    }
}

#[async_trait]
impl ProgressCallback for CliProgress {
    async fn on_step(&self, step: &MergeStep) {
        self.spinner.set_message(step.to_string());
        self.spinner
            .println(format!("  {} {}", arrow(), step.to_string().muted()));
    }

    async fn on_message(&self, message: &str) {
        self.spinner.println(format!("  {}", message.warn()));
    }
}
