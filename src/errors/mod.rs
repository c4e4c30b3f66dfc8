// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Error types
//!
//! Every failure trainflow can report, grouped by the phase that raises it:
//! provisioning, graph validation, submission and execution.

mod recovery;

pub use recovery::RecoverySuggestion;

use miette::Diagnostic;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::provision::ResourceKind;

/// Result type for trainflow operations
pub type TrainflowResult<T> = Result<T, TrainflowError>;

/// Main error type for trainflow
#[derive(Error, Debug, Diagnostic)]
pub enum TrainflowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Provisioning Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("{kind} '{name}' already exists and is owned by '{owner}'")]
    #[diagnostic(
        code(trainflow::resource_conflict),
        help("Bucket names are global; pick a name that is unique to your account")
    )]
    ResourceConflict {
        kind: ResourceKind,
        name: String,
        owner: String,
    },

    #[error("{kind} '{name}' does not exist")]
    #[diagnostic(code(trainflow::resource_not_found))]
    ResourceNotFound { kind: ResourceKind, name: String },

    #[error("Permission denied for '{operation}' on '{resource}'")]
    #[diagnostic(
        code(trainflow::permission_denied),
        help("Check that the active credentials allow '{operation}'")
    )]
    PermissionDenied { operation: String, resource: String },

    #[error("Provisioning of '{resource}' failed during '{operation}': {message}")]
    #[diagnostic(code(trainflow::provisioning_failure))]
    ProvisioningFailure {
        operation: String,
        resource: String,
        message: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Validation Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Step '{step}' is declared more than once")]
    #[diagnostic(code(trainflow::duplicate_step))]
    DuplicateStep { step: String },

    #[error("Circular dependency detected: {}", steps.join(" → "))]
    #[diagnostic(
        code(trainflow::circular_dependency),
        help("A step cannot consume data produced by itself or by a step that depends on it")
    )]
    CircularDependency { steps: Vec<String> },

    #[error("Step '{step}' consumes output of unknown step '{dependency}'")]
    #[diagnostic(
        code(trainflow::unknown_step),
        help("Check that '{dependency}' is added to the same pipeline")
    )]
    UnknownStep { step: String, dependency: String },

    #[error("Step '{step}' consumes output '{output}' which step '{producer}' does not declare")]
    #[diagnostic(code(trainflow::unknown_output))]
    UnknownOutput {
        step: String,
        producer: String,
        output: String,
    },

    #[error("Parameter '{parameter}' is not declared by the pipeline")]
    #[diagnostic(code(trainflow::unknown_parameter))]
    UnknownParameter { parameter: String },

    #[error("Step '{step}' is invalid: {reason}")]
    #[diagnostic(code(trainflow::invalid_step))]
    InvalidStep { step: String, reason: String },

    #[error("Invalid pipeline: {reason}")]
    #[diagnostic(code(trainflow::invalid_pipeline))]
    InvalidPipeline {
        reason: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Submission & Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Precondition failed: {reason}")]
    #[diagnostic(code(trainflow::precondition_failed))]
    PreconditionFailed {
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Run '{run_id}' failed at step '{step}': {reason}")]
    #[diagnostic(code(trainflow::execution_failure))]
    ExecutionFailure {
        run_id: String,
        step: String,
        reason: String,
    },

    #[error("Run '{run_id}' still {status} after {waited:?}")]
    #[diagnostic(
        code(trainflow::timeout_exceeded),
        help("The run continues on the backend; wait again or abandon it")
    )]
    TimeoutExceeded {
        run_id: String,
        status: String,
        waited: Duration,
    },

    #[error("Backend error: {message}")]
    #[diagnostic(code(trainflow::backend_error))]
    Backend { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // File & Config Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipeline file not found: {path}")]
    #[diagnostic(
        code(trainflow::pipeline_not_found),
        help("Create a pipeline with 'trainflow init' or write .trainflow.yaml manually")
    )]
    PipelineNotFound { path: PathBuf },

    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(trainflow::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(trainflow::config_error))]
    Config { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(trainflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(trainflow::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(trainflow::json_error))]
    Json { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(trainflow::toml_error))]
    Toml { message: String },
}

impl From<std::io::Error> for TrainflowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for TrainflowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for TrainflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for TrainflowError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl TrainflowError {
    /// Structural problems found before any remote call is made
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::DuplicateStep { .. }
                | Self::CircularDependency { .. }
                | Self::UnknownStep { .. }
                | Self::UnknownOutput { .. }
                | Self::UnknownParameter { .. }
                | Self::InvalidStep { .. }
                | Self::InvalidPipeline { .. }
        )
    }

    /// Whether the surrounding workflow must stop.
    ///
    /// A timeout only means the caller stopped watching; the run itself
    /// keeps going on the backend.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::TimeoutExceeded { .. })
    }

    /// Shorthand for an invalid step
    pub fn invalid_step(step: &str, reason: impl Into<String>) -> Self {
        Self::InvalidStep {
            step: step.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_names_steps() {
        let err = TrainflowError::CircularDependency {
            steps: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: a → b → a");
        assert!(err.is_validation());
    }

    #[test]
    fn test_timeout_is_not_fatal() {
        let err = TrainflowError::TimeoutExceeded {
            run_id: "run-1".into(),
            status: "Running".into(),
            waited: Duration::from_secs(5),
        };
        assert!(!err.is_fatal());
        assert!(!err.is_validation());

        let conflict = TrainflowError::ResourceConflict {
            kind: ResourceKind::Bucket,
            name: "b".into(),
            owner: "someone-else".into(),
        };
        assert!(conflict.is_fatal());
    }
}
