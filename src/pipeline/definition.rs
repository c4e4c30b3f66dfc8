// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Pipeline definition structures
//!
//! Steps, data references and the schema of `.trainflow.yaml` files.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use crate::errors::{TrainflowError, TrainflowResult};
use crate::pipeline::{Parameter, PipelineGraph};

/// Opaque key/value configuration passed through to the backend
/// (hyperparameters, environment, ...). Never interpreted here.
pub type RuntimeConfig = BTreeMap<String, String>;

/// Pipeline file as written in `.trainflow.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineFile {
    /// File format version
    #[serde(default = "default_version")]
    pub version: String,

    /// Pipeline name
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Where outputs without an explicit locator are written
    #[serde(default)]
    pub artifact_root: Option<String>,

    #[serde(default)]
    pub parameters: Vec<Parameter>,

    pub steps: Vec<StepNode>,
}

fn default_version() -> String {
    "1".to_string()
}

impl PipelineFile {
    /// Load a pipeline from a YAML file
    pub fn from_file(path: &Path) -> TrainflowResult<Self> {
        if !path.exists() {
            return Err(TrainflowError::PipelineNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| TrainflowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::from_yaml(&content)
    }

    /// Parse a pipeline from a YAML string
    pub fn from_yaml(yaml: &str) -> TrainflowResult<Self> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Serialize the pipeline to YAML
    pub fn to_yaml(&self) -> TrainflowResult<String> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    /// Assemble an unbuilt graph from the file
    pub fn into_graph(self) -> TrainflowResult<PipelineGraph> {
        let mut graph = PipelineGraph::new(self.name);
        graph.set_description(self.description);
        graph.set_artifact_root(self.artifact_root);

        for parameter in self.parameters {
            graph.add_parameter(parameter)?;
        }
        for step in self.steps {
            graph.add_step(step)?;
        }

        Ok(graph)
    }
}

/// Kind of work a step performs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Processing,
    Training,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Training => write!(f, "training"),
        }
    }
}

/// A named data location, optionally produced by another step
///
/// As a step input, either `locator` is a literal (possibly holding
/// parameter placeholders) or `produced_by` names the upstream step whose
/// output is bound here when a run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataReference {
    /// Logical name (input channel or output name)
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,

    #[serde(default, rename = "from_step", skip_serializing_if = "Option::is_none")]
    pub produced_by: Option<String>,

    /// Which output of `produced_by`; the producer's first output when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl DataReference {
    /// Input or output at a known location
    pub fn literal(name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: Some(locator.into()),
            produced_by: None,
            output: None,
        }
    }

    /// Input bound to the first output of `step`
    pub fn from_step(name: impl Into<String>, step: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: None,
            produced_by: Some(step.into()),
            output: None,
        }
    }

    /// Input bound to a named output of `step`
    pub fn from_output(
        name: impl Into<String>,
        step: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            output: Some(output.into()),
            ..Self::from_step(name, step)
        }
    }

    /// Output whose location is assigned from the pipeline's artifact root
    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: None,
            produced_by: None,
            output: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.locator.is_some()
    }

    pub fn producer(&self) -> Option<&str> {
        self.produced_by.as_deref()
    }
}

/// One unit of work in a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepNode {
    /// Step name (must be unique within pipeline)
    pub name: String,

    pub kind: StepKind,

    #[serde(default)]
    pub description: Option<String>,

    /// Name of the execution role the step runs as
    pub role: String,

    /// Container image
    pub image: String,

    #[serde(default = "default_instance_type")]
    pub instance_type: String,

    #[serde(default = "default_instance_count")]
    pub instance_count: u32,

    #[serde(default)]
    pub inputs: Vec<DataReference>,

    #[serde(default)]
    pub outputs: Vec<DataReference>,

    /// Hyperparameters or processing arguments, passed through untouched
    #[serde(default)]
    pub config: RuntimeConfig,

    #[serde(skip)]
    depends_on: BTreeSet<String>,
}

fn default_instance_type() -> String {
    "ml.m5.large".to_string()
}

fn default_instance_count() -> u32 {
    1
}

impl StepNode {
    pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            role: String::new(),
            image: String::new(),
            instance_type: default_instance_type(),
            instance_count: default_instance_count(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            config: RuntimeConfig::new(),
            depends_on: BTreeSet::new(),
        }
    }

    pub fn processing(name: impl Into<String>) -> Self {
        Self::new(name, StepKind::Processing)
    }

    pub fn training(name: impl Into<String>) -> Self {
        Self::new(name, StepKind::Training)
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_instances(mut self, instance_type: impl Into<String>, count: u32) -> Self {
        self.instance_type = instance_type.into();
        self.instance_count = count;
        self
    }

    pub fn with_input(mut self, input: DataReference) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_output(mut self, output: DataReference) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Validate the step and derive its dependencies.
    ///
    /// Whether producers exist is only known once the whole graph is
    /// assembled, so that check belongs to `PipelineGraph::build`.
    pub fn build(mut self) -> TrainflowResult<Self> {
        self.validate()?;
        self.derive_dependencies();
        Ok(self)
    }

    /// Check the step in isolation
    pub fn validate(&self) -> TrainflowResult<()> {
        if self.name.trim().is_empty() {
            return Err(TrainflowError::InvalidPipeline {
                reason: "Step name is empty".to_string(),
                help: None,
            });
        }
        if self.role.trim().is_empty() {
            return Err(TrainflowError::invalid_step(&self.name, "no execution role"));
        }
        if self.image.trim().is_empty() {
            return Err(TrainflowError::invalid_step(&self.name, "no container image"));
        }
        if self.instance_count == 0 {
            return Err(TrainflowError::invalid_step(
                &self.name,
                "instance_count must be at least 1",
            ));
        }

        let mut seen = HashSet::new();
        for output in &self.outputs {
            if output.name.is_empty() {
                return Err(TrainflowError::invalid_step(&self.name, "output without a name"));
            }
            if !seen.insert(output.name.as_str()) {
                return Err(TrainflowError::invalid_step(
                    &self.name,
                    format!("output '{}' is declared more than once", output.name),
                ));
            }
            if output.produced_by.is_some() || output.output.is_some() {
                return Err(TrainflowError::invalid_step(
                    &self.name,
                    format!("output '{}' cannot reference another step", output.name),
                ));
            }
        }

        let mut seen = HashSet::new();
        for input in &self.inputs {
            if input.name.is_empty() {
                return Err(TrainflowError::invalid_step(&self.name, "input without a name"));
            }
            if !seen.insert(input.name.as_str()) {
                return Err(TrainflowError::invalid_step(
                    &self.name,
                    format!("input '{}' is declared more than once", input.name),
                ));
            }
            if input.locator.is_none() && input.produced_by.is_none() {
                return Err(TrainflowError::invalid_step(
                    &self.name,
                    format!("input '{}' needs a locator or from_step", input.name),
                ));
            }
            if input.output.is_some() && input.produced_by.is_none() {
                return Err(TrainflowError::invalid_step(
                    &self.name,
                    format!("input '{}' names an output but no from_step", input.name),
                ));
            }
        }

        Ok(())
    }

    /// Names of the steps whose outputs this step consumes
    pub fn depends_on(&self) -> &BTreeSet<String> {
        &self.depends_on
    }

    pub fn output(&self, name: &str) -> Option<&DataReference> {
        self.outputs.iter().find(|o| o.name == name)
    }

    /// The output an input refers to: named, or the first one
    pub fn output_for(&self, input: &DataReference) -> Option<&DataReference> {
        match input.output.as_deref() {
            Some(name) => self.output(name),
            None => self.outputs.first(),
        }
    }

    pub(crate) fn derive_dependencies(&mut self) {
        self.depends_on = self
            .inputs
            .iter()
            .filter_map(|input| input.produced_by.clone())
            .collect();
    }

    /// Fill in an output location. Locators are written at most once.
    pub(crate) fn resolve_output(&mut self, name: &str, locator: String) -> TrainflowResult<()> {
        let step = self.name.clone();
        let output = self
            .outputs
            .iter_mut()
            .find(|o| o.name == name)
            .ok_or_else(|| TrainflowError::invalid_step(&step, format!("no output '{}'", name)))?;

        if output.locator.is_some() {
            return Err(TrainflowError::invalid_step(
                &step,
                format!("output '{}' already has a locator", name),
            ));
        }

        output.locator = Some(locator);
        Ok(())
    }
}
