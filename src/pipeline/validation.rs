// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Pipeline validation
//!
//! Lints a pipeline file before anything is submitted. Unlike
//! `PipelineGraph::build`, which stops at the first problem, this collects
//! every error plus non-fatal warnings.

use std::collections::HashSet;

use crate::errors::TrainflowResult;
use crate::pipeline::parameters::placeholders;
use crate::pipeline::{PipelineFile, StepKind};

/// Pipeline validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Validate a pipeline file
    pub fn validate(file: &PipelineFile) -> TrainflowResult<ValidationResult> {
        let mut result = ValidationResult::new();

        if file.steps.is_empty() {
            result.add_error("Pipeline has no steps defined");
        }

        let mut seen_params = HashSet::new();
        for param in &file.parameters {
            if !seen_params.insert(param.name.as_str()) {
                result.add_error(&format!("Duplicate parameter name: '{}'", param.name));
            }
        }

        let mut seen_steps = HashSet::new();
        for step in &file.steps {
            if !seen_steps.insert(step.name.as_str()) {
                result.add_error(&format!("Duplicate step name: '{}'", step.name));
            }
            if let Err(e) = step.validate() {
                result.add_error(&e.to_string());
            }
        }

        Self::check_warnings(file, &mut result);

        // Graph-level checks only make sense once every step is well formed
        if result.is_valid() {
            let built = file.clone().into_graph().and_then(|mut graph| {
                graph.build()?;
                Ok(())
            });
            if let Err(e) = built {
                result.add_error(&e.to_string());
            }
        }

        Ok(result)
    }

    fn check_warnings(file: &PipelineFile, result: &mut ValidationResult) {
        let referenced: HashSet<&str> = file
            .steps
            .iter()
            .flat_map(|s| s.inputs.iter().chain(s.outputs.iter()))
            .filter_map(|r| r.locator.as_deref())
            .chain(file.artifact_root.as_deref())
            .flat_map(placeholders)
            .collect();

        for param in &file.parameters {
            if !referenced.contains(param.name.as_str()) {
                result.add_warning(&format!(
                    "Parameter '{}' is declared but never used",
                    param.name
                ));
            }
        }

        for step in &file.steps {
            if step.kind == StepKind::Training && step.outputs.is_empty() {
                result.add_warning(&format!(
                    "Step '{}': Training step declares no outputs, model artifacts will not be kept",
                    step.name
                ));
            }
            if step.inputs.is_empty() {
                result.add_warning(&format!("Step '{}': No inputs declared", step.name));
            }
        }
    }
}

/// Result of pipeline validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> PipelineFile {
        PipelineFile::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_validate_empty_pipeline() {
        let result = PipelineValidator::validate(&parse("name: empty\nsteps: []\n")).unwrap();
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("no steps"));
    }

    #[test]
    fn test_validate_duplicate_names() {
        let file = parse(
            r#"
name: test
steps:
  - { name: dup, kind: processing, role: r, image: i, inputs: [{ name: in, locator: s3://b/x }] }
  - { name: dup, kind: processing, role: r, image: i, inputs: [{ name: in, locator: s3://b/y }] }
"#,
        );

        let result = PipelineValidator::validate(&file).unwrap();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("Duplicate step")));
    }

    #[test]
    fn test_validate_reports_cycle() {
        let file = parse(
            r#"
name: test
artifact_root: s3://b
steps:
  - name: a
    kind: processing
    role: r
    image: i
    inputs: [{ name: in, from_step: b }]
    outputs: [{ name: out }]
  - name: b
    kind: processing
    role: r
    image: i
    inputs: [{ name: in, from_step: a }]
    outputs: [{ name: out }]
"#,
        );

        let result = PipelineValidator::validate(&file).unwrap();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("Circular dependency")));
    }

    #[test]
    fn test_unused_parameter_is_a_warning() {
        let file = parse(
            r#"
name: test
parameters:
  - { name: Unused, default: x }
steps:
  - name: train
    kind: training
    role: r
    image: i
    inputs: [{ name: train, locator: s3://b/train }]
    outputs: [{ name: model, locator: s3://b/model }]
"#,
        );

        let result = PipelineValidator::validate(&file).unwrap();
        assert!(result.is_valid());
        assert!(result.has_warnings());
        assert!(result.warnings.iter().any(|w| w.contains("never used")));
    }
}
