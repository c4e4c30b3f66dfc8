// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Terminal color utilities
//!
//! Provides consistent color schemes across the CLI.

use colored::{ColoredString, Colorize};

use crate::backend::RunStatus;

/// Style for code/commands
pub fn code(msg: &str) -> ColoredString {
    msg.cyan()
}

/// Run or step status, colored by outcome
pub fn status(status: RunStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        RunStatus::Pending => text.dimmed(),
        RunStatus::Running => text.blue(),
        RunStatus::Succeeded => text.green(),
        RunStatus::Failed => text.red(),
    }
}

/// Check if colors should be disabled
pub fn should_use_colors() -> bool {
    // Respect NO_COLOR environment variable
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }

    std::env::var_os("TERM").is_some()
}

/// Print a styled header
pub fn print_header(title: &str) {
    println!("{}", title.bold());
    println!("{}", "═".repeat(title.len().max(40)));
}

/// Print a styled section
pub fn print_section(title: &str) {
    println!();
    println!("{}:", title.bold());
}

/// Print a bullet point
pub fn print_bullet(content: &str) {
    println!("  • {}", content);
}

/// Print a success check
pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green(), msg);
}

/// Print an error cross
pub fn print_error(msg: &str) {
    println!("  {} {}", "✗".red(), msg);
}

/// Print a warning
pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠".yellow(), msg);
}

/// Print an info item
pub fn print_info(msg: &str) {
    println!("  {} {}", "→".blue(), msg);
}
