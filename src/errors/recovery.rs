// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Error recovery suggestions
//!
//! Provides actionable suggestions for recovering from errors.

use super::TrainflowError;
use crate::provision::ResourceKind;

/// A recovery suggestion with concrete steps
#[derive(Debug, Clone)]
pub struct RecoverySuggestion {
    /// Brief description of what to do
    pub action: String,
    /// Detailed steps
    pub steps: Vec<String>,
    /// Commands to run
    pub commands: Vec<String>,
}

impl RecoverySuggestion {
    /// Pick a suggestion for an error, if there is a useful one
    pub fn for_error(error: &TrainflowError) -> Option<Self> {
        match error {
            TrainflowError::ResourceConflict {
                kind: ResourceKind::Bucket,
                name,
                ..
            } => Some(Self::rename_bucket(name)),
            TrainflowError::ResourceConflict {
                kind: ResourceKind::Role,
                name,
                ..
            } => Some(Self::rename_role(name)),
            TrainflowError::PermissionDenied { operation, .. } => {
                Some(Self::grant_permission(operation))
            }
            TrainflowError::CircularDependency { steps } => {
                Some(Self::fix_circular_dependency(steps))
            }
            TrainflowError::PreconditionFailed { reason, .. }
                if reason.contains("not been provisioned") =>
            {
                Some(Self::provision_first())
            }
            TrainflowError::PipelineNotFound { .. } => Some(Self::create_pipeline()),
            TrainflowError::TimeoutExceeded { run_id, .. } => Some(Self::keep_waiting(run_id)),
            _ => None,
        }
    }

    /// Suggest a different bucket name after a foreign-owned collision
    pub fn rename_bucket(name: &str) -> Self {
        Self {
            action: format!("Choose another name than '{}'", name),
            steps: vec![
                "Bucket names share one global namespace".into(),
                "Append a unique suffix such as your account id or a UUID".into(),
            ],
            commands: vec![
                "# Set the bucket in trainflow.toml:".into(),
                "[provisioning]".into(),
                format!("bucket = \"{}-<suffix>\"", name),
            ],
        }
    }

    /// Suggest a different role name when the name belongs to someone else
    pub fn rename_role(name: &str) -> Self {
        Self {
            action: format!("Choose another role name than '{}'", name),
            steps: vec!["The role exists but is not owned by the active account".into()],
            commands: vec![
                "# Set the role in trainflow.toml:".into(),
                "[provisioning]".into(),
                format!("role = \"{}-<suffix>\"", name),
            ],
        }
    }

    /// Suggest granting a missing permission
    pub fn grant_permission(operation: &str) -> Self {
        Self {
            action: format!("Allow '{}' for the active identity", operation),
            steps: vec![
                "The backend rejected the call for the current credentials".into(),
                "Attach a policy that grants the operation, then re-run".into(),
            ],
            commands: vec![],
        }
    }

    /// Suggest fixing a circular dependency
    pub fn fix_circular_dependency(steps: &[String]) -> Self {
        Self {
            action: "Remove circular dependency".into(),
            steps: vec![
                format!("Detected cycle: {}", steps.join(" → ")),
                "Review which step consumes which output".into(),
                "Steps must form a directed acyclic graph (DAG)".into(),
            ],
            commands: vec![
                "# Visualize your pipeline:".into(),
                "trainflow graph --format mermaid".into(),
            ],
        }
    }

    /// Suggest provisioning before submitting
    pub fn provision_first() -> Self {
        Self {
            action: "Provision resources before submitting".into(),
            steps: vec![
                "Every role referenced by a step must exist before submission".into(),
            ],
            commands: vec!["trainflow provision".into()],
        }
    }

    /// Suggest creating a pipeline file
    pub fn create_pipeline() -> Self {
        Self {
            action: "Create a pipeline definition".into(),
            steps: vec![
                "No .trainflow.yaml found in current directory".into(),
                "Initialize a new project or create the file manually".into(),
            ],
            commands: vec![
                "# Start from a template:".into(),
                "trainflow init --template deepar".into(),
            ],
        }
    }

    /// Suggest polling again after a timeout
    pub fn keep_waiting(run_id: &str) -> Self {
        Self {
            action: format!("Run '{}' is still in progress", run_id),
            steps: vec![
                "Waiting stopped but the run was not cancelled".into(),
                "Follow the same run again instead of starting a new one".into(),
            ],
            commands: vec![
                format!("trainflow wait {}", run_id),
                format!("trainflow wait {} --timeout 7200", run_id),
            ],
        }
    }
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "→ {}", self.action)?;

        for step in &self.steps {
            writeln!(f, "  {}", step)?;
        }

        if !self.commands.is_empty() {
            writeln!(f)?;
            for cmd in &self.commands {
                writeln!(f, "  {}", cmd)?;
            }
        }

        Ok(())
    }
}
