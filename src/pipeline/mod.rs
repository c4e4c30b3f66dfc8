// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Pipeline definitions and execution
//!
//! Steps and data references, the dependency graph built from them, and
//! the coordinator that submits graphs and follows their runs.

mod coordinator;
mod dag;
mod definition;
mod execution;
pub mod fingerprint;
mod graph;
pub mod parameters;
mod validation;

pub use coordinator::ExecutionCoordinator;
pub use dag::DagBuilder;
pub use definition::*;
pub use execution::{Execution, RunMetadata, WaitOutcome};
pub use graph::{BoundStep, PipelineGraph};
pub use parameters::{Parameter, ResolvedParameters};
pub use validation::{PipelineValidator, ValidationResult};
