// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! trainflow - ML training pipeline orchestrator

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trainflow::cli::{run::RunOptions, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trainflow=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if !trainflow::utils::should_use_colors() {
        colored::control::set_override(false);
    }

    let cli = Cli::parse();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Init { name, template } => {
            trainflow::cli::init::run(name, template, cli.config, cli.verbose).await
        }
        Commands::Provision { bucket, role } => {
            trainflow::cli::provision::run(bucket, role, cli.config, cli.verbose).await
        }
        Commands::Upload { bucket, key, file } => {
            trainflow::cli::upload::run(bucket, key, file, cli.config, cli.verbose).await
        }
        Commands::Validate { pipeline } => {
            trainflow::cli::validate::run(pipeline, cli.verbose).await
        }
        Commands::Graph { pipeline, format } => {
            trainflow::cli::graph::run(pipeline, format, cli.verbose).await
        }
        Commands::Run {
            pipeline,
            params,
            no_wait,
            poll_interval,
            timeout,
            dry_run,
        } => {
            let options = RunOptions {
                params,
                no_wait,
                poll_interval,
                timeout,
                dry_run,
                verbose: cli.verbose,
            };
            trainflow::cli::run::run(pipeline, options, cli.config).await
        }
        Commands::Wait {
            run_id,
            poll_interval,
            timeout,
        } => trainflow::cli::wait::run(run_id, poll_interval, timeout, cli.config).await,
    }
}
