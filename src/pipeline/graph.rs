// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Pipeline graph
//!
//! Steps live in an arena keyed by name; dependencies are plain name sets.
//! `build()` validates the whole graph, assigns default output locations
//! and fixes the execution order. Step-to-step data is bound later, per
//! run, by [`PipelineGraph::bind`].

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{TrainflowError, TrainflowResult};
use crate::pipeline::parameters::placeholders;
use crate::pipeline::{DagBuilder, Parameter, ResolvedParameters, RuntimeConfig, StepKind, StepNode};

/// An acyclic graph of steps plus named parameters
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    name: String,
    description: Option<String>,
    artifact_root: Option<String>,
    steps: BTreeMap<String, StepNode>,
    parameters: BTreeMap<String, Parameter>,
    order: Option<Vec<String>>,
}

/// A step with every locator made concrete for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundStep {
    pub name: String,
    pub kind: StepKind,
    pub role: String,
    pub image: String,
    pub instance_type: String,
    pub instance_count: u32,
    /// Input channel → locator
    pub inputs: BTreeMap<String, String>,
    /// Output name → locator
    pub outputs: BTreeMap<String, String>,
    /// Location of the first declared output
    pub output_path: Option<String>,
    pub config: RuntimeConfig,
    pub depends_on: Vec<String>,
}

impl PipelineGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            artifact_root: None,
            steps: BTreeMap::new(),
            parameters: BTreeMap::new(),
            order: None,
        }
    }

    /// Root under which outputs without a locator are placed
    pub fn with_artifact_root(mut self, root: impl Into<String>) -> Self {
        self.set_artifact_root(Some(root.into()));
        self
    }

    pub fn set_artifact_root(&mut self, root: Option<String>) {
        self.artifact_root = root;
        self.order = None;
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn artifact_root(&self) -> Option<&str> {
        self.artifact_root.as_deref()
    }

    /// Declare a parameter. Names are unique.
    pub fn add_parameter(&mut self, parameter: Parameter) -> TrainflowResult<()> {
        if self.parameters.contains_key(&parameter.name) {
            return Err(TrainflowError::InvalidPipeline {
                reason: format!("Parameter '{}' is declared more than once", parameter.name),
                help: None,
            });
        }

        self.parameters.insert(parameter.name.clone(), parameter);
        self.order = None;
        Ok(())
    }

    /// Insert a step. Producers may be added later; they are checked by `build`.
    pub fn add_step(&mut self, step: StepNode) -> TrainflowResult<()> {
        if self.steps.contains_key(&step.name) {
            return Err(TrainflowError::DuplicateStep { step: step.name });
        }

        let step = step.build()?;
        self.steps.insert(step.name.clone(), step);
        self.order = None;
        Ok(())
    }

    /// Validate the graph and fix its execution order
    ///
    /// Nothing is modified unless every check passes.
    pub fn build(&mut self) -> TrainflowResult<&[String]> {
        if self.steps.is_empty() {
            return Err(TrainflowError::InvalidPipeline {
                reason: "Pipeline has no steps".to_string(),
                help: Some("Add at least one step under 'steps:'".to_string()),
            });
        }

        for step in self.steps.values_mut() {
            step.derive_dependencies();
        }

        self.check_references()?;
        self.check_placeholders()?;

        let order = DagBuilder::build(&self.steps)?.topological_order()?;

        let pending = self.unplaced_outputs()?;
        for (step, output, locator) in pending {
            if let Some(node) = self.steps.get_mut(&step) {
                node.resolve_output(&output, locator)?;
            }
        }

        Ok(self.order.insert(order).as_slice())
    }

    pub fn is_built(&self) -> bool {
        self.order.is_some()
    }

    /// Topological order; ties broken by step name
    pub fn execution_order(&self) -> TrainflowResult<&[String]> {
        self.order
            .as_deref()
            .ok_or_else(|| TrainflowError::PreconditionFailed {
                reason: format!("Pipeline '{}' has not been built", self.name),
                help: None,
            })
    }

    pub fn step(&self, name: &str) -> Option<&StepNode> {
        self.steps.get(name)
    }

    pub fn steps(&self) -> &BTreeMap<String, StepNode> {
        &self.steps
    }

    pub fn parameters(&self) -> &BTreeMap<String, Parameter> {
        &self.parameters
    }

    /// Names of every role referenced by a step
    pub fn roles(&self) -> BTreeSet<&str> {
        self.steps.values().map(|s| s.role.as_str()).collect()
    }

    /// Dependency DAG, for inspection and rendering
    pub fn dag(&self) -> TrainflowResult<DagBuilder> {
        DagBuilder::build(&self.steps)
    }

    /// Apply overrides on top of the declared defaults
    pub fn resolve_parameters(
        &self,
        overrides: &BTreeMap<String, String>,
    ) -> TrainflowResult<ResolvedParameters> {
        if let Some(unknown) = overrides.keys().find(|k| !self.parameters.contains_key(*k)) {
            return Err(TrainflowError::UnknownParameter {
                parameter: unknown.clone(),
            });
        }

        Ok(self
            .parameters
            .values()
            .map(|parameter| {
                let parameter = match overrides.get(&parameter.name) {
                    Some(value) => parameter.clone().with_override(value.clone()),
                    None => parameter.clone(),
                };
                (parameter.name.clone(), parameter.resolved_value().to_string())
            })
            .collect())
    }

    /// Make every locator concrete, walking steps in execution order
    ///
    /// `from_step` inputs take the producer's already-bound output location.
    pub fn bind(&self, parameters: &ResolvedParameters) -> TrainflowResult<Vec<BoundStep>> {
        let order = self.execution_order()?;
        let mut bound: BTreeMap<&str, BoundStep> = BTreeMap::new();
        let mut result = Vec::with_capacity(order.len());

        for name in order {
            let step = self.steps.get(name).ok_or_else(|| TrainflowError::UnknownStep {
                step: name.clone(),
                dependency: name.clone(),
            })?;

            let mut outputs = BTreeMap::new();
            let mut output_path = None;
            for output in &step.outputs {
                let locator = match &output.locator {
                    Some(locator) => parameters.substitute(locator)?,
                    None => {
                        return Err(TrainflowError::invalid_step(
                            &step.name,
                            format!("output '{}' has no location", output.name),
                        ))
                    }
                };
                output_path.get_or_insert_with(|| locator.clone());
                outputs.insert(output.name.clone(), locator);
            }

            let mut inputs = BTreeMap::new();
            for input in &step.inputs {
                let locator = match (&input.locator, input.producer()) {
                    (Some(locator), _) => parameters.substitute(locator)?,
                    (None, Some(producer)) => {
                        let upstream = bound.get(producer).ok_or_else(|| {
                            TrainflowError::UnknownStep {
                                step: step.name.clone(),
                                dependency: producer.to_string(),
                            }
                        })?;
                        let output = match input.output.as_deref() {
                            Some(output) => upstream.outputs.get(output).cloned(),
                            None => upstream.output_path.clone(),
                        };
                        output.ok_or_else(|| TrainflowError::UnknownOutput {
                            step: step.name.clone(),
                            producer: producer.to_string(),
                            output: input.output.clone().unwrap_or_default(),
                        })?
                    }
                    (None, None) => {
                        return Err(TrainflowError::invalid_step(
                            &step.name,
                            format!("input '{}' needs a locator or from_step", input.name),
                        ))
                    }
                };
                inputs.insert(input.name.clone(), locator);
            }

            let bound_step = BoundStep {
                name: step.name.clone(),
                kind: step.kind,
                role: step.role.clone(),
                image: step.image.clone(),
                instance_type: step.instance_type.clone(),
                instance_count: step.instance_count,
                inputs,
                outputs,
                output_path,
                config: step.config.clone(),
                depends_on: step.depends_on().iter().cloned().collect(),
            };

            result.push(bound_step.clone());
            bound.insert(name.as_str(), bound_step);
        }

        Ok(result)
    }

    /// Every `from_step` names a step that exists and an output it declares
    fn check_references(&self) -> TrainflowResult<()> {
        for step in self.steps.values() {
            for input in &step.inputs {
                let Some(producer_name) = input.producer() else {
                    continue;
                };

                let producer =
                    self.steps
                        .get(producer_name)
                        .ok_or_else(|| TrainflowError::UnknownStep {
                            step: step.name.clone(),
                            dependency: producer_name.to_string(),
                        })?;

                if producer.output_for(input).is_none() {
                    return Err(TrainflowError::UnknownOutput {
                        step: step.name.clone(),
                        producer: producer_name.to_string(),
                        output: input
                            .output
                            .clone()
                            .unwrap_or_else(|| "<first output>".to_string()),
                    });
                }
            }
        }

        Ok(())
    }

    /// Every `{{ Name }}` in a locator is a declared parameter
    fn check_placeholders(&self) -> TrainflowResult<()> {
        let locators = self
            .steps
            .values()
            .flat_map(|s| s.inputs.iter().chain(s.outputs.iter()))
            .filter_map(|r| r.locator.as_deref())
            .chain(self.artifact_root.as_deref());

        for locator in locators {
            if let Some(unknown) = placeholders(locator)
                .into_iter()
                .find(|p| !self.parameters.contains_key(*p))
            {
                return Err(TrainflowError::UnknownParameter {
                    parameter: unknown.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Default locations for outputs declared without one
    fn unplaced_outputs(&self) -> TrainflowResult<Vec<(String, String, String)>> {
        let mut pending = Vec::new();

        for step in self.steps.values() {
            for output in step.outputs.iter().filter(|o| !o.is_resolved()) {
                let root = self.artifact_root.as_deref().ok_or_else(|| {
                    TrainflowError::invalid_step(
                        &step.name,
                        format!(
                            "output '{}' has no locator and the pipeline has no artifact_root",
                            output.name
                        ),
                    )
                })?;

                pending.push((
                    step.name.clone(),
                    output.name.clone(),
                    format!("{}/{}/{}", root.trim_end_matches('/'), step.name, output.name),
                ));
            }
        }

        Ok(pending)
    }
}
