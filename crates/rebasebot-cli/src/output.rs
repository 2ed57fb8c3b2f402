//! Terminal output formatting utilities.

use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use rebasebot_core::{AttemptStatus, PullRequestAction};

static QUIET_MODE: AtomicBool = AtomicBool::new(false);

/// Set quiet mode globally. Call once at startup.
pub fn set_quiet(quiet: bool) {
    QUIET_MODE.store(quiet, Ordering::Relaxed);
}

fn is_quiet() -> bool {
    QUIET_MODE.load(Ordering::Relaxed)
}

/// Print a success message (suppressed in quiet mode).
pub fn success(msg: &str) {
    if !is_quiet() {
        println!("{} {}", "✓".green(), msg);
    }
}

/// Print an error message (always prints to stderr).
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a warning message (always prints to stderr).
pub fn warn(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

/// Print an info message (suppressed in quiet mode).
pub fn info(msg: &str) {
    if !is_quiet() {
        println!("{} {}", "→".blue(), msg);
    }
}

/// Print a detail line without prefix (suppressed in quiet mode).
pub fn detail(msg: &str) {
    if !is_quiet() {
        println!("{msg}");
    }
}

/// Print essential machine-readable output (always prints).
///
/// Use for results that should be available for piping, like the JSON
/// report or a pull request URL.
pub fn essential(msg: &str) {
    println!("{msg}");
}

/// Print a horizontal line (suppressed in quiet mode).
pub fn hr() {
    if !is_quiet() {
        println!("{}", "─".repeat(50).dimmed());
    }
}

/// Colored label for an attempt status.
#[must_use]
pub fn status_label(status: AttemptStatus, noop: bool) -> String {
    match (status, noop) {
        (AttemptStatus::Succeeded, true) => "up to date".green().to_string(),
        (AttemptStatus::Succeeded, false) => "succeeded".green().to_string(),
        (AttemptStatus::Conflicted, _) => "conflicted".yellow().to_string(),
        (AttemptStatus::Failed, _) => "failed".red().to_string(),
        (AttemptStatus::Pending, _) => "pending".dimmed().to_string(),
    }
}

/// Pull request column: `#12 created`, or empty when nothing is tracked.
#[must_use]
pub fn pr_ref(number: Option<u64>, action: PullRequestAction) -> String {
    let Some(n) = number else {
        return String::new();
    };
    let text = format!("#{n}");
    match action {
        PullRequestAction::Created => format!("{} created", text.green()),
        PullRequestAction::Updated => format!("{} updated", text.cyan()),
        PullRequestAction::Unchanged => format!("{} unchanged", text.dimmed()),
        PullRequestAction::Closed => format!("{} closed", text.red()),
        PullRequestAction::None => text,
    }
}
