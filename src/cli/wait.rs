// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Wait command - follow a run that was started earlier

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;
use std::time::Duration;

use super::run::follow;
use super::{report, Workspace};
use crate::pipeline::ExecutionCoordinator;
use crate::utils::print_info;

/// Run the wait command
pub async fn run(
    run_id: String,
    poll_interval: Option<u64>,
    timeout: Option<u64>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let workspace = Workspace::open(config_path.as_deref())?;
    let execution_config = &workspace.config.execution;
    let poll_interval = poll_interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| execution_config.poll_interval());
    let timeout = timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| execution_config.timeout());

    let coordinator = ExecutionCoordinator::new(workspace.context());
    let execution = coordinator.attach(&run_id).await;
    workspace.persist()?;
    let execution = execution.map_err(report)?;

    print_info(&format!(
        "Following {} ({}) of {}",
        execution.metadata().run_name.bold(),
        execution.run_id().dimmed(),
        execution.pipeline_name()
    ));

    follow(&coordinator, &workspace, execution, poll_interval, timeout).await
}
