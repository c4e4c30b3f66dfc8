// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Values exchanged with the backend

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::pipeline::{DataReference, RunMetadata, RuntimeConfig, StepKind};

/// Result of an idempotent create call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateOutcome {
    /// The resource did not exist and was created by this call
    Created { identifier: String },
    /// The resource already exists and belongs to the caller
    AlreadyOwned,
    /// The name is taken by another principal
    Conflict { owner: String },
}

/// A role as reported by the identity service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub name: String,
    pub arn: String,
}

/// Result of a pipeline upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// Same fingerprint as the stored definition
    Unchanged,
}

impl std::fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Step template as stored in a pipeline definition
///
/// Locators may still hold parameter placeholders and `from_step` inputs
/// are left unbound; binding happens per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    pub kind: StepKind,
    pub image: String,
    pub instance_type: String,
    pub instance_count: u32,
    pub role_arn: String,
    pub inputs: Vec<DataReference>,
    pub outputs: Vec<DataReference>,
    pub config: RuntimeConfig,
    pub depends_on: Vec<String>,
}

/// Pipeline definition sent on upsert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    /// Parameter name → default value
    pub parameters: BTreeMap<String, String>,
    /// Steps in topological order
    pub steps: Vec<StepDefinition>,
    /// Content hash of everything above
    pub fingerprint: String,
}

/// One concrete job submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub step: String,
    pub kind: StepKind,
    pub image: String,
    pub instance_type: String,
    pub instance_count: u32,
    /// Channel name → concrete locator
    pub input_channels: BTreeMap<String, String>,
    /// Output name → concrete locator
    pub outputs: BTreeMap<String, String>,
    /// Primary output location (first declared output)
    pub output_path: Option<String>,
    pub hyperparameters: RuntimeConfig,
    pub role_arn: String,
    pub depends_on: Vec<String>,
}

/// Request to start a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub pipeline_name: String,
    pub run_name: String,
    pub experiment: Option<String>,
    pub parameters: BTreeMap<String, String>,
    /// Jobs in topological order
    pub jobs: Vec<JobSpec>,
}

/// Status of a run or of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Position in `Pending → Running → {Succeeded | Failed}`
    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Succeeded | Self::Failed => 2,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// The step that failed a run and the backend's reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step: String,
    pub reason: String,
}

/// Snapshot returned by `describe`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDescription {
    pub run_id: String,
    pub pipeline_name: String,
    /// What the run was started with
    pub metadata: RunMetadata,
    pub status: RunStatus,
    pub steps: BTreeMap<String, RunStatus>,
    pub failure: Option<StepFailure>,
}
