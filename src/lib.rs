// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! # trainflow - ML training pipeline orchestrator
//!
//! `trainflow` provisions the resources a training workflow needs and runs
//! a small graph of processing and training steps against them.
//!
//! ## Features
//!
//! - **Idempotent provisioning** - Buckets and roles are created once, however often or concurrently you ask
//! - **Step graphs** - Dependencies come from the data steps consume, checked for cycles before anything runs
//! - **Lazy binding** - A step's input is wired to its producer's output location when the run starts
//! - **Run tracking** - Poll runs to completion with per-step status and failure reasons
//!
//! ## Quick Start
//!
//! ```bash
//! # Create a process → train pipeline
//! trainflow init --template deepar
//!
//! # Ensure the bucket and execution role exist
//! trainflow provision
//!
//! # Submit, start and wait
//! trainflow run -p InputDataUri=s3://my-bucket/raw
//! ```

pub mod backend;
pub mod cli;
pub mod config;
pub mod errors;
pub mod pipeline;
pub mod provision;
pub mod utils;

// Re-export commonly used types
pub use backend::{BackendContext, MemoryBackend};
pub use config::TrainflowConfig;
pub use errors::{TrainflowError, TrainflowResult};
pub use pipeline::{DataReference, ExecutionCoordinator, PipelineGraph, StepNode};
pub use provision::ResourceProvisioner;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
