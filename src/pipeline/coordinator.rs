// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Execution coordinator
//!
//! Submits built graphs to the pipeline service, starts runs with concrete
//! parameter values and follows them to a terminal status. Scheduling
//! between steps belongs to the backend; the coordinator only hands it the
//! dependency order.

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::{
    BackendContext, JobSpec, PipelineDefinition, RunRequest, StepDefinition, UpsertOutcome,
};
use crate::errors::{TrainflowError, TrainflowResult};
use crate::pipeline::fingerprint::fingerprint;
use crate::pipeline::{Execution, PipelineGraph, RunMetadata, WaitOutcome};

/// A graph accepted by the backend, with the role ARNs it was checked against
struct Submission {
    graph: Arc<PipelineGraph>,
    role_arns: BTreeMap<String, String>,
}

/// Submits pipelines and tracks their runs
pub struct ExecutionCoordinator {
    ctx: BackendContext,
    experiment: Option<String>,
    submitted: RwLock<HashMap<String, Submission>>,
}

impl ExecutionCoordinator {
    pub fn new(ctx: BackendContext) -> Self {
        Self {
            ctx,
            experiment: None,
            submitted: RwLock::new(HashMap::new()),
        }
    }

    /// Tracking label recorded on every run started from here
    pub fn with_experiment(mut self, experiment: Option<String>) -> Self {
        self.experiment = experiment;
        self
    }

    /// Upsert the graph's definition
    ///
    /// Every role a step runs as must already exist. Re-submitting an
    /// unchanged graph is reported as `Unchanged`.
    pub async fn submit(&self, graph: Arc<PipelineGraph>) -> TrainflowResult<UpsertOutcome> {
        let order = graph.execution_order()?;

        let mut role_arns = BTreeMap::new();
        for role in graph.roles() {
            match self.ctx.identity.get_role(role).await {
                Ok(record) => {
                    role_arns.insert(role.to_string(), record.arn);
                }
                Err(e) if e.is_not_found() => {
                    return Err(TrainflowError::PreconditionFailed {
                        reason: format!("Role '{}' has not been provisioned", role),
                        help: Some("Run `trainflow provision` before submitting".to_string()),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        let parameters: BTreeMap<String, String> = graph
            .parameters()
            .values()
            .map(|p| (p.name.clone(), p.default_value.clone()))
            .collect();

        let mut steps = Vec::with_capacity(order.len());
        for name in order {
            let step = graph.step(name).ok_or_else(|| TrainflowError::InvalidPipeline {
                reason: format!("Step '{}' is ordered but missing from the graph", name),
                help: None,
            })?;
            steps.push(StepDefinition {
                name: step.name.clone(),
                kind: step.kind,
                image: step.image.clone(),
                instance_type: step.instance_type.clone(),
                instance_count: step.instance_count,
                role_arn: role_arn_for(&role_arns, &step.name, &step.role)?,
                inputs: step.inputs.clone(),
                outputs: step.outputs.clone(),
                config: step.config.clone(),
                depends_on: step.depends_on().iter().cloned().collect(),
            });
        }

        let definition = PipelineDefinition {
            name: graph.name().to_string(),
            fingerprint: fingerprint(graph.name(), &parameters, &steps)?,
            parameters,
            steps,
        };

        let outcome = self.ctx.pipelines.upsert(&definition).await?;
        info!(
            pipeline = %definition.name,
            fingerprint = %definition.fingerprint,
            %outcome,
            "submitted pipeline"
        );

        self.submitted
            .write()
            .await
            .insert(definition.name, Submission { graph, role_arns });

        Ok(outcome)
    }

    /// Start a run without waiting for it
    ///
    /// Parameters are resolved, then every `from_step` input is bound to its
    /// producer's output location in execution order.
    pub async fn start(
        &self,
        pipeline_name: &str,
        overrides: &BTreeMap<String, String>,
    ) -> TrainflowResult<Execution> {
        let (graph, role_arns) = {
            let submitted = self.submitted.read().await;
            let submission = submitted.get(pipeline_name).ok_or_else(|| {
                TrainflowError::PreconditionFailed {
                    reason: format!("Pipeline '{}' has not been submitted", pipeline_name),
                    help: None,
                }
            })?;
            (submission.graph.clone(), submission.role_arns.clone())
        };

        let parameters = graph.resolve_parameters(overrides)?;
        let jobs = graph
            .bind(&parameters)?
            .into_iter()
            .map(|step| {
                Ok(JobSpec {
                    role_arn: role_arn_for(&role_arns, &step.name, &step.role)?,
                    step: step.name,
                    kind: step.kind,
                    image: step.image,
                    instance_type: step.instance_type,
                    instance_count: step.instance_count,
                    input_channels: step.inputs,
                    outputs: step.outputs,
                    output_path: step.output_path,
                    hyperparameters: step.config,
                    depends_on: step.depends_on,
                })
            })
            .collect::<TrainflowResult<Vec<JobSpec>>>()?;

        let started_at = Utc::now();
        let run_name = format!("{}-{}", pipeline_name, started_at.format("%Y%m%d-%H%M%S"));
        let steps: Vec<String> = jobs.iter().map(|job| job.step.clone()).collect();

        let request = RunRequest {
            pipeline_name: pipeline_name.to_string(),
            run_name: run_name.clone(),
            experiment: self.experiment.clone(),
            parameters: parameters.as_map().clone(),
            jobs,
        };

        let run_id = self.ctx.pipelines.start(&request).await?;
        info!(
            pipeline = pipeline_name,
            run_id = %run_id,
            run_name = %run_name,
            experiment = ?self.experiment,
            "started run"
        );

        let metadata = RunMetadata {
            run_name,
            experiment: self.experiment.clone(),
            parameters: request.parameters,
            started_at,
        };

        Ok(Execution::started(pipeline_name, run_id, metadata, steps))
    }

    /// Pick up a run by id, e.g. one started with `--no-wait` or one a
    /// previous `wait` gave up on
    pub async fn attach(&self, run_id: &str) -> TrainflowResult<Execution> {
        let description = self
            .ctx
            .pipelines
            .describe(run_id)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    TrainflowError::PreconditionFailed {
                        reason: format!("Run '{}' is not known to the backend", run_id),
                        help: Some("Check the run id printed by `trainflow run`".to_string()),
                    }
                } else {
                    e.into()
                }
            })?;

        let execution = Execution::attached(&description);
        debug!(
            run_id,
            pipeline = execution.pipeline_name(),
            status = %execution.status(),
            "attached to run"
        );
        Ok(execution)
    }

    /// Refresh an execution from the backend. Returns whether it changed.
    pub async fn poll(&self, execution: &mut Execution) -> TrainflowResult<bool> {
        if execution.is_terminal() {
            return Ok(false);
        }

        let description = self.ctx.pipelines.describe(execution.run_id()).await?;
        debug!(
            run_id = execution.run_id(),
            status = %description.status,
            "polled run"
        );

        Ok(execution.observe(&description))
    }

    /// Poll until the run is terminal or `timeout` elapses
    ///
    /// Sleeps `poll_interval` between polls, which must be non-zero.
    pub async fn wait(
        &self,
        execution: Execution,
        poll_interval: Duration,
        timeout: Duration,
    ) -> TrainflowResult<WaitOutcome> {
        self.wait_with(execution, poll_interval, timeout, |_| {}).await
    }

    /// Like [`wait`](Self::wait), calling `on_change` whenever a poll changes the run
    pub async fn wait_with<F>(
        &self,
        mut execution: Execution,
        poll_interval: Duration,
        timeout: Duration,
        mut on_change: F,
    ) -> TrainflowResult<WaitOutcome>
    where
        F: FnMut(&Execution),
    {
        if poll_interval.is_zero() {
            return Err(TrainflowError::Config {
                message: "poll interval must be greater than zero".to_string(),
            });
        }

        let started = Instant::now();

        loop {
            if self.poll(&mut execution).await? {
                on_change(&execution);
            }

            if execution.is_terminal() {
                info!(
                    run_id = execution.run_id(),
                    status = %execution.status(),
                    failed_step = ?execution.failed_step(),
                    "run finished"
                );
                return Ok(WaitOutcome::Completed(execution));
            }

            let waited = started.elapsed();
            if waited >= timeout {
                warn!(
                    run_id = execution.run_id(),
                    status = %execution.status(),
                    "gave up waiting, run continues on the backend"
                );
                return Ok(WaitOutcome::TimedOut { execution, waited });
            }

            tokio::time::sleep(poll_interval.min(timeout - waited)).await;
        }
    }
}

/// ARN of the role a step runs as, resolved at submission
fn role_arn_for(
    role_arns: &BTreeMap<String, String>,
    step: &str,
    role: &str,
) -> TrainflowResult<String> {
    role_arns
        .get(role)
        .cloned()
        .ok_or_else(|| TrainflowError::PreconditionFailed {
            reason: format!("Role '{}' of step '{}' was not resolved at submission", role, step),
            help: Some("Submit the pipeline again".to_string()),
        })
}
