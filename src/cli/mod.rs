// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for trainflow.

pub mod graph;
pub mod init;
pub mod provision;
pub mod run;
pub mod upload;
pub mod validate;
pub mod wait;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{BackendContext, MemoryBackend};
use crate::config::TrainflowConfig;
use crate::errors::{RecoverySuggestion, TrainflowError};

/// Default pipeline file name
pub const PIPELINE_FILE: &str = ".trainflow.yaml";

/// ML training pipeline orchestrator
///
/// Provision buckets and roles, then run step graphs against them.
#[derive(Parser, Debug)]
#[clap(
    name = "trainflow",
    version,
    about = "Provision training resources and run ML step pipelines",
    long_about = None,
    after_help = "Examples:\n\
        trainflow init --template deepar     Create a process → train pipeline\n\
        trainflow provision                  Ensure the bucket and role exist\n\
        trainflow run -p InputDataUri=s3://b/raw\n\
        trainflow wait <RUN_ID>              Follow a run started earlier\n\
        trainflow graph --format mermaid     Show the step graph\n\n\
        See 'trainflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Configuration file (default: ./trainflow.toml, then the user config dir)
    #[clap(long, global = true, value_name = "FILE", env = "TRAINFLOW_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new trainflow project
    Init {
        /// Pipeline name (defaults to current directory name)
        name: Option<String>,

        /// Use a template (kmeans, deepar)
        #[clap(short, long)]
        template: Option<String>,
    },

    /// Ensure the storage bucket and execution role exist
    Provision {
        /// Bucket name (overrides config)
        #[clap(long)]
        bucket: Option<String>,

        /// Role name (overrides config)
        #[clap(long)]
        role: Option<String>,
    },

    /// Upload a local file to a bucket
    Upload {
        bucket: String,

        /// Object key
        key: String,

        /// Local file to upload
        file: PathBuf,
    },

    /// Validate pipeline configuration
    Validate {
        /// Pipeline file to validate
        #[clap(default_value = PIPELINE_FILE)]
        pipeline: PathBuf,
    },

    /// Show pipeline as a graph
    Graph {
        /// Pipeline file
        #[clap(default_value = PIPELINE_FILE)]
        pipeline: PathBuf,

        /// Output format (text, dot, mermaid)
        #[clap(short, long, default_value = "text")]
        format: GraphFormat,
    },

    /// Submit the pipeline and start a run
    Run {
        /// Pipeline file
        #[clap(default_value = PIPELINE_FILE)]
        pipeline: PathBuf,

        /// Parameter override
        #[clap(short = 'p', long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Return as soon as the run has started
        #[clap(long)]
        no_wait: bool,

        /// Seconds between status polls (overrides config)
        #[clap(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
        poll_interval: Option<u64>,

        /// Stop waiting after this many seconds (overrides config)
        #[clap(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Show the bound jobs without submitting anything
        #[clap(long)]
        dry_run: bool,
    },

    /// Follow a run that is already going until it finishes
    Wait {
        /// Run id printed by `trainflow run`
        run_id: String,

        /// Seconds between status polls (overrides config)
        #[clap(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
        poll_interval: Option<u64>,

        /// Stop waiting after this many seconds (overrides config)
        #[clap(long, value_name = "SECS")]
        timeout: Option<u64>,
    },
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

impl std::str::FromStr for GraphFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "dot" => Ok(Self::Dot),
            "mermaid" => Ok(Self::Mermaid),
            _ => Err(format!("Unknown graph format: {}", s)),
        }
    }
}

/// Parse `NAME=VALUE`
fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{}'", s)),
    }
}

/// Configuration plus the local backend it points at
pub struct Workspace {
    pub config: TrainflowConfig,
    backend: Arc<MemoryBackend>,
}

impl Workspace {
    /// Load configuration and the persisted backend state
    pub fn open(config_path: Option<&Path>) -> miette::Result<Self> {
        let config = TrainflowConfig::load(config_path).map_err(report)?;
        let backend = MemoryBackend::load(
            &config.backend.state_file,
            config.backend.account_id.clone(),
            config.backend.region.clone(),
        )
        .map_err(report)?;

        Ok(Self {
            config,
            backend: Arc::new(backend),
        })
    }

    pub fn context(&self) -> BackendContext {
        BackendContext::from_memory(self.backend.clone())
    }

    /// Write backend state back to disk
    pub fn persist(&self) -> miette::Result<()> {
        self.backend
            .save(&self.config.backend.state_file)
            .map_err(report)
    }
}

/// Print a recovery suggestion, if any, and turn the error into a report
pub fn report(error: TrainflowError) -> miette::Report {
    if let Some(suggestion) = RecoverySuggestion::for_error(&error) {
        eprintln!("{}", suggestion);
    }
    miette::Report::new(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("InputDataUri=s3://b/raw?x=1").unwrap(),
            ("InputDataUri".to_string(), "s3://b/raw?x=1".to_string())
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=v").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::parse_from([
            "trainflow", "run", "p.yaml", "-p", "a=1", "--param", "b=2", "--no-wait",
        ]);

        match cli.command {
            Commands::Run {
                pipeline,
                params,
                no_wait,
                ..
            } => {
                assert_eq!(pipeline, PathBuf::from("p.yaml"));
                assert_eq!(params.len(), 2);
                assert!(no_wait);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_rejects_zero_poll_interval() {
        assert!(Cli::try_parse_from(["trainflow", "run", "--poll-interval", "0"]).is_err());
        assert!(Cli::try_parse_from(["trainflow", "wait", "run-1", "--poll-interval", "0"]).is_err());

        let cli = Cli::parse_from(["trainflow", "wait", "run-1", "--poll-interval", "2"]);
        match cli.command {
            Commands::Wait {
                run_id,
                poll_interval,
                timeout,
            } => {
                assert_eq!(run_id, "run-1");
                assert_eq!(poll_interval, Some(2));
                assert_eq!(timeout, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
