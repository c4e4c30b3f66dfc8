// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Run command - submit the pipeline, start a run and follow it

use colored::Colorize;
use miette::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::{report, Workspace};
use crate::backend::RunStatus;
use crate::pipeline::{
    Execution, ExecutionCoordinator, PipelineFile, PipelineGraph, PipelineValidator,
};
use crate::utils::{code, create_spinner, print_info, print_success, run_summary, status};

/// Options for the run command
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub params: Vec<(String, String)>,
    pub no_wait: bool,
    pub poll_interval: Option<u64>,
    pub timeout: Option<u64>,
    pub dry_run: bool,
    pub verbose: bool,
}

/// Run the pipeline
pub async fn run(
    pipeline_path: PathBuf,
    options: RunOptions,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let file = PipelineFile::from_file(&pipeline_path).map_err(report)?;

    let validation = PipelineValidator::validate(&file).map_err(report)?;
    if !validation.is_valid() {
        eprintln!("{}", "Pipeline validation failed:".red().bold());
        for error in &validation.errors {
            eprintln!("  {} {}", "✗".red(), error);
        }
        return Err(miette::miette!("Pipeline configuration is invalid"));
    }

    if validation.has_warnings() && options.verbose {
        eprintln!("{}", "Pipeline warnings:".yellow().bold());
        for warning in &validation.warnings {
            eprintln!("  {} {}", "⚠".yellow(), warning);
        }
        eprintln!();
    }

    let mut graph = file.into_graph().map_err(report)?;
    graph.build().map_err(report)?;

    let overrides: BTreeMap<String, String> = options.params.iter().cloned().collect();

    if options.dry_run {
        return print_plan(&graph, &overrides);
    }

    let workspace = Workspace::open(config_path.as_deref())?;
    let execution_config = &workspace.config.execution;
    let poll_interval = options
        .poll_interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| execution_config.poll_interval());
    let timeout = options
        .timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| execution_config.timeout());

    let coordinator = ExecutionCoordinator::new(workspace.context())
        .with_experiment(execution_config.experiment.clone());

    let pipeline_name = graph.name().to_string();
    let outcome = coordinator.submit(Arc::new(graph)).await;
    workspace.persist()?;
    let outcome = outcome.map_err(report)?;
    print_success(&format!(
        "Pipeline {} {}",
        pipeline_name.bold(),
        outcome.to_string().dimmed()
    ));

    let execution = coordinator.start(&pipeline_name, &overrides).await;
    workspace.persist()?;
    let execution = execution.map_err(report)?;
    print_info(&format!(
        "Started {} ({})",
        execution.metadata().run_name.bold(),
        execution.run_id().dimmed()
    ));

    if options.no_wait {
        println!();
        println!("Run continues on the backend. Follow it with:");
        println!("  {}", code(&format!("trainflow wait {}", execution.run_id())));
        return Ok(());
    }

    follow(&coordinator, &workspace, execution, poll_interval, timeout).await
}

/// Wait for a run with a spinner, then print per-step results
///
/// Backend state is persisted whatever the outcome.
pub(crate) async fn follow(
    coordinator: &ExecutionCoordinator,
    workspace: &Workspace,
    execution: Execution,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<()> {
    let spinner = create_spinner(&run_summary(&execution));
    let waited = coordinator
        .wait_with(execution, poll_interval, timeout, |e| {
            spinner.set_message(run_summary(e))
        })
        .await;
    spinner.finish_and_clear();
    workspace.persist()?;
    let outcome = waited.map_err(report)?;

    let execution = outcome.execution();
    println!();
    for (step, step_status) in execution.step_status() {
        println!("  {} {}", status(*step_status), step);
    }
    if let Some(failure) = execution.failure() {
        println!();
        println!("  {} {}", "Reason:".red().bold(), failure.reason);
    }
    println!();

    match execution.status() {
        RunStatus::Succeeded => {
            let elapsed = execution
                .ended_at()
                .map(|end| (end - execution.started_at()).num_milliseconds() as f64 / 1000.0)
                .unwrap_or_default();
            println!(
                "{}",
                format!("Run succeeded in {:.2}s", elapsed).green()
            );
        }
        RunStatus::Failed => println!("{}", "Run failed".red()),
        _ => {}
    }

    outcome.into_result().map(|_| ()).map_err(report)
}

/// Print what would be submitted, without touching the backend
fn print_plan(graph: &PipelineGraph, overrides: &BTreeMap<String, String>) -> Result<()> {
    let parameters = graph.resolve_parameters(overrides).map_err(report)?;
    let steps = graph.bind(&parameters).map_err(report)?;

    println!("{}", "Execution plan (dry run):".bold());
    for (i, step) in steps.iter().enumerate() {
        println!(
            "  {}. {} ({}, {} x {})",
            i + 1,
            step.name.bold(),
            step.kind,
            step.instance_count,
            step.instance_type
        );
        for (channel, locator) in &step.inputs {
            println!("       {} {} ← {}", "in ".dimmed(), channel, locator.cyan());
        }
        for (output, locator) in &step.outputs {
            println!("       {} {} → {}", "out".dimmed(), output, locator.cyan());
        }
    }

    Ok(())
}
