// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Progress indicators for long-running operations

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::backend::RunStatus;
use crate::pipeline::Execution;

/// Create a spinner for indeterminate progress
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.blue} {msg}")
            .expect("Invalid spinner template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// One-line summary of a run, e.g. `Running [process ✓, train …]`
pub fn run_summary(execution: &Execution) -> String {
    let steps: Vec<String> = execution
        .step_status()
        .iter()
        .map(|(name, status)| format!("{} {}", name, status_glyph(*status)))
        .collect();

    format!("{} [{}]", execution.status(), steps.join(", "))
}

fn status_glyph(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Pending => "·",
        RunStatus::Running => "…",
        RunStatus::Succeeded => "✓",
        RunStatus::Failed => "✗",
    }
}
