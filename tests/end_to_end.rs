// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use trainflow::backend::{RunStatus, StepOutcome};
use trainflow::config::{S3_FULL_ACCESS, SAGEMAKER_FULL_ACCESS};
use trainflow::pipeline::{Parameter, PipelineFile};
use trainflow::provision::ProvisioningPlan;
use trainflow::{
    BackendContext, DataReference, ExecutionCoordinator, MemoryBackend, PipelineGraph,
    ResourceProvisioner, StepNode, TrainflowError,
};

const PRINCIPAL: &str = "sagemaker.amazonaws.com";
const TICK: Duration = Duration::from_millis(1);
const PATIENCE: Duration = Duration::from_secs(5);

fn backend() -> (Arc<MemoryBackend>, BackendContext) {
    let backend = Arc::new(MemoryBackend::new("123456789012", "us-west-2"));
    let ctx = BackendContext::from_memory(backend.clone());
    (backend, ctx)
}

fn policies() -> Vec<String> {
    vec![SAGEMAKER_FULL_ACCESS.to_string(), S3_FULL_ACCESS.to_string()]
}

async fn provision(ctx: &BackendContext) {
    ResourceProvisioner::new(ctx.clone())
        .provision(&ProvisioningPlan {
            bucket: "b".into(),
            role: "r".into(),
            trusted_principal: PRINCIPAL.into(),
            policies: policies(),
        })
        .await
        .unwrap();
}

fn process_train_graph() -> PipelineGraph {
    let mut graph = PipelineGraph::new("TimeSeriesPipeline");
    graph
        .add_parameter(Parameter::new("InputDataUri", "s3://b/raw"))
        .unwrap();
    graph
        .add_step(
            StepNode::processing("process")
                .with_role("r")
                .with_image("sagemaker-scikit-learn:1.2-1-cpu-py3")
                .with_input(DataReference::literal("input", "{{ InputDataUri }}"))
                .with_output(DataReference::literal("processed_data", "b/processed")),
        )
        .unwrap();
    graph
        .add_step(
            StepNode::training("train")
                .with_role("r")
                .with_image("forecasting-deepar")
                .with_input(DataReference::from_step("train", "process"))
                .with_output(DataReference::literal("model", "b/model"))
                .with_config("epochs", "10"),
        )
        .unwrap();
    graph
}

#[tokio::test]
async fn ensure_bucket_twice_matches_once() {
    let (backend, ctx) = backend();
    let provisioner = ResourceProvisioner::new(ctx);

    let first = provisioner.ensure_bucket("b").await.unwrap();
    let second = provisioner.ensure_bucket("b").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(backend.bucket_count(), 1);
}

#[tokio::test]
async fn concurrent_ensure_bucket_creates_one_bucket() {
    let (backend, ctx) = backend();
    let left = ResourceProvisioner::new(ctx.clone());
    let right = ResourceProvisioner::new(ctx);

    let (a, b) = tokio::join!(left.ensure_bucket("b"), right.ensure_bucket("b"));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.identifier, b.identifier);
    assert_eq!(backend.bucket_count(), 1);
    assert_eq!(backend.bucket_owner("b").as_deref(), Some("123456789012"));
}

#[tokio::test]
async fn concurrent_ensure_role_creates_one_complete_role() {
    let (backend, ctx) = backend();
    let left = ResourceProvisioner::new(ctx.clone());
    let right = ResourceProvisioner::new(ctx);
    let wanted = policies();

    let (a, b) = tokio::join!(
        left.ensure_role("x", PRINCIPAL, &wanted),
        right.ensure_role("x", PRINCIPAL, &wanted),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.identifier, b.identifier);
    assert_eq!(backend.role_count(), 1);
    assert_eq!(backend.role_creations("x"), 1);
    assert_eq!(backend.role_policies("x").len(), 2);
}

#[tokio::test]
async fn foreign_bucket_aborts_provisioning() {
    let (backend, ctx) = backend();
    backend.seed_foreign_bucket("b", "999999999999");

    let err = ResourceProvisioner::new(ctx.clone())
        .provision(&ProvisioningPlan {
            bucket: "b".into(),
            role: "r".into(),
            trusted_principal: PRINCIPAL.into(),
            policies: policies(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, TrainflowError::ResourceConflict { .. }));
    assert_eq!(backend.role_count(), 0);
}

#[test]
fn cycle_fails_build_and_chain_orders() {
    let step = |name: &str, from: &str| {
        StepNode::processing(name)
            .with_role("r")
            .with_image("img")
            .with_input(DataReference::from_step("in", from))
            .with_output(DataReference::literal("out", format!("s3://b/{name}")))
    };

    let mut cyclic = PipelineGraph::new("cyclic");
    cyclic.add_step(step("A", "B")).unwrap();
    cyclic.add_step(step("B", "A")).unwrap();
    let err = cyclic.build().unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("A → B → A"));

    let mut chain = PipelineGraph::new("chain");
    chain
        .add_step(
            StepNode::processing("A")
                .with_role("r")
                .with_image("img")
                .with_input(DataReference::literal("in", "s3://b/raw"))
                .with_output(DataReference::literal("out", "s3://b/A")),
        )
        .unwrap();
    chain.add_step(step("C", "B")).unwrap();
    chain.add_step(step("B", "A")).unwrap();
    assert_eq!(chain.build().unwrap().to_vec(), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn two_step_run_binds_and_succeeds() {
    let (backend, ctx) = backend();
    provision(&ctx).await;

    let mut graph = process_train_graph();
    graph.build().unwrap();
    assert!(graph.step("train").unwrap().inputs[0].locator.is_none());

    let coordinator = ExecutionCoordinator::new(ctx);
    coordinator.submit(Arc::new(graph)).await.unwrap();
    let execution = coordinator
        .start("TimeSeriesPipeline", &BTreeMap::new())
        .await
        .unwrap();

    let request = backend.run_request(execution.run_id()).unwrap();
    assert_eq!(request.jobs[0].step, "process");
    assert_eq!(request.jobs[1].input_channels["train"], "b/processed");
    assert_eq!(request.jobs[1].hyperparameters["epochs"], "10");

    let execution = coordinator
        .wait(execution, TICK, PATIENCE)
        .await
        .unwrap()
        .into_result()
        .unwrap();

    assert_eq!(execution.status(), RunStatus::Succeeded);
    assert_eq!(
        execution.step_status(),
        &BTreeMap::from([
            ("process".to_string(), RunStatus::Succeeded),
            ("train".to_string(), RunStatus::Succeeded),
        ])
    );
}

#[tokio::test]
async fn failed_producer_stops_consumer() {
    let (backend, ctx) = backend();
    provision(&ctx).await;
    backend.script_step("process", StepOutcome::Fail("ClientError: no data".into()));

    let mut graph = process_train_graph();
    graph.build().unwrap();
    let coordinator = ExecutionCoordinator::new(ctx);
    coordinator.submit(Arc::new(graph)).await.unwrap();

    let execution = coordinator
        .start("TimeSeriesPipeline", &BTreeMap::new())
        .await
        .unwrap();
    let run_id = execution.run_id().to_string();
    let outcome = coordinator.wait(execution, TICK, PATIENCE).await.unwrap();

    assert_eq!(outcome.execution().status(), RunStatus::Failed);
    assert_eq!(outcome.execution().failed_step(), Some("process"));
    assert_eq!(
        outcome.execution().step_status()["train"],
        RunStatus::Pending
    );
    assert_eq!(backend.submitted_steps(&run_id), vec!["process"]);
}

#[tokio::test]
async fn override_replaces_default_everywhere() {
    let (backend, ctx) = backend();
    provision(&ctx).await;

    let mut graph = process_train_graph();
    graph.build().unwrap();
    let coordinator = ExecutionCoordinator::new(ctx);
    coordinator.submit(Arc::new(graph)).await.unwrap();

    let overrides = BTreeMap::from([("InputDataUri".to_string(), "s3://b/v".to_string())]);
    let execution = coordinator
        .start("TimeSeriesPipeline", &overrides)
        .await
        .unwrap();

    let request = backend.run_request(execution.run_id()).unwrap();
    assert_eq!(request.jobs[0].input_channels["input"], "s3://b/v");
    assert_eq!(request.parameters["InputDataUri"], "s3://b/v");
    assert_eq!(execution.metadata().parameters["InputDataUri"], "s3://b/v");
}

#[tokio::test]
async fn pipeline_file_runs_end_to_end() {
    let (_, ctx) = backend();
    provision(&ctx).await;

    let file = PipelineFile::from_yaml(
        r#"
name: kmeans
artifact_root: s3://b/artifacts
parameters:
  - name: TrainingData
    default: s3://b/data.csv
steps:
  - name: train
    kind: training
    role: r
    image: kmeans:1
    inputs:
      - name: train
        locator: "{{ TrainingData }}"
    outputs:
      - name: model
    config:
      k: "10"
"#,
    )
    .unwrap();

    let mut graph = file.into_graph().unwrap();
    graph.build().unwrap();

    let coordinator = ExecutionCoordinator::new(ctx);
    coordinator.submit(Arc::new(graph)).await.unwrap();
    let execution = coordinator.start("kmeans", &BTreeMap::new()).await.unwrap();
    let outcome = coordinator.wait(execution, TICK, PATIENCE).await.unwrap();

    assert_eq!(outcome.execution().status(), RunStatus::Succeeded);
}
