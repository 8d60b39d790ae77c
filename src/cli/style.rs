//! Terminal styling shared by CLI commands

use indicatif::ProgressStyle;
use owo_colors::OwoColorize;
use std::fmt::Display;

/// Check mark used for completed steps
pub const CHECK: &str = "✓";

/// Semantic colors for CLI output
pub trait Stylize: Display + Sized {
    /// Bold, for headings and names
    fn emphasis(&self) -> String {
        self.bold().to_string()
    }

    /// Cyan, for branches and identifiers
    fn accent(&self) -> String {
        self.cyan().to_string()
    }

    /// Dimmed, for hints and secondary text
    fn muted(&self) -> String {
        self.dimmed().to_string()
    }

    /// Green
    fn success(&self) -> String {
        self.green().to_string()
    }

    /// Yellow
    fn warn(&self) -> String {
        self.yellow().to_string()
    }

    /// Red
    fn error(&self) -> String {
        self.red().to_string()
    }
}

impl<T: Display> Stylize for T {}

/// Green check mark
pub fn check() -> String {
    CHECK.success()
}

/// Arrow used in step listings
pub fn arrow() -> String {
    "→".muted()
}

/// Spinner used while git commands run
pub fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}
