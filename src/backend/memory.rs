// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! In-memory backend
//!
//! A self-contained stand-in for the cloud services. It keeps bucket and
//! role ownership per account, runs pipelines through a deterministic
//! simulator (one job at a time, in the submitted order), and can inject
//! the failures the provisioner and coordinator must survive: foreign-owned
//! names, denied operations, eventually-consistent role reads and failing
//! or hanging steps.
//!
//! State can be saved to and loaded from a JSON file so the CLI keeps
//! provisioned resources and runs between invocations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    bucket_arn, ops, role_arn, BackendError, CreateOutcome, IdentityService, ObjectStore,
    PipelineDefinition, PipelineService, RoleRecord, RunDescription, RunRequest, RunStatus,
    StepFailure, UpsertOutcome,
};
use crate::errors::{TrainflowError, TrainflowResult};
use crate::pipeline::RunMetadata;

/// Scripted behaviour of a step in simulated runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Succeed,
    Fail(String),
    /// Stay `Running` forever
    Hang,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredBucket {
    owner: String,
    #[serde(default)]
    objects: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRole {
    owner: String,
    arn: String,
    trust_document: String,
    #[serde(default)]
    policies: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SimulatedRun {
    request: RunRequest,
    status: RunStatus,
    steps: BTreeMap<String, RunStatus>,
    failure: Option<StepFailure>,
    submitted: Vec<String>,
    #[serde(default)]
    started_at: DateTime<Utc>,
}

impl SimulatedRun {
    fn new(request: RunRequest) -> Self {
        let steps = request
            .jobs
            .iter()
            .map(|job| (job.step.clone(), RunStatus::Pending))
            .collect();

        Self {
            request,
            status: RunStatus::Pending,
            steps,
            failure: None,
            submitted: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Advance the run by one observation
    fn tick(&mut self, scripts: &BTreeMap<String, StepOutcome>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = RunStatus::Running;

        let running = self
            .steps
            .iter()
            .find(|(_, status)| **status == RunStatus::Running)
            .map(|(name, _)| name.clone());

        if let Some(step) = running {
            match scripts.get(&step).cloned().unwrap_or(StepOutcome::Succeed) {
                StepOutcome::Succeed => {
                    self.steps.insert(step, RunStatus::Succeeded);
                }
                StepOutcome::Fail(reason) => {
                    self.steps.insert(step.clone(), RunStatus::Failed);
                    self.failure = Some(StepFailure { step, reason });
                    self.status = RunStatus::Failed;
                    return;
                }
                StepOutcome::Hang => return,
            }
        }

        let next = self.request.jobs.iter().find(|job| {
            self.steps.get(&job.step) == Some(&RunStatus::Pending)
                && job
                    .depends_on
                    .iter()
                    .all(|dep| self.steps.get(dep) == Some(&RunStatus::Succeeded))
        });

        match next {
            Some(job) => {
                self.steps.insert(job.step.clone(), RunStatus::Running);
                self.submitted.push(job.step.clone());
            }
            None => {
                if self
                    .steps
                    .values()
                    .all(|status| *status == RunStatus::Succeeded)
                {
                    self.status = RunStatus::Succeeded;
                }
            }
        }
    }

    fn describe(&self, run_id: &str) -> RunDescription {
        RunDescription {
            run_id: run_id.to_string(),
            pipeline_name: self.request.pipeline_name.clone(),
            metadata: RunMetadata {
                run_name: self.request.run_name.clone(),
                experiment: self.request.experiment.clone(),
                parameters: self.request.parameters.clone(),
                started_at: self.started_at,
            },
            status: self.status,
            steps: self.steps.clone(),
            failure: self.failure.clone(),
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct MemoryState {
    #[serde(default)]
    buckets: BTreeMap<String, StoredBucket>,
    #[serde(default)]
    roles: BTreeMap<String, StoredRole>,
    #[serde(default)]
    pipelines: BTreeMap<String, PipelineDefinition>,
    #[serde(default)]
    runs: BTreeMap<String, SimulatedRun>,
}

/// Knobs and counters that are never persisted
#[derive(Debug, Default)]
struct Harness {
    denied: BTreeSet<String>,
    stale_role_reads: BTreeMap<String, u32>,
    scripts: BTreeMap<String, StepOutcome>,
    role_create_attempts: BTreeMap<String, usize>,
    role_creations: BTreeMap<String, usize>,
}

/// In-memory implementation of every backend service
#[derive(Debug)]
pub struct MemoryBackend {
    account_id: String,
    region: String,
    state: Mutex<MemoryState>,
    harness: Mutex<Harness>,
}

impl MemoryBackend {
    /// Create an empty backend acting on behalf of `account_id`
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
            state: Mutex::new(MemoryState::default()),
            harness: Mutex::new(Harness::default()),
        }
    }

    /// Load persisted state, starting empty when the file does not exist
    pub fn load(
        path: &Path,
        account_id: impl Into<String>,
        region: impl Into<String>,
    ) -> TrainflowResult<Self> {
        let backend = Self::new(account_id, region);

        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| TrainflowError::FileReadError {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                })?;
            *backend.state() = serde_json::from_str(&content)?;
            tracing::debug!(path = %path.display(), "loaded backend state");
        }

        Ok(backend)
    }

    /// Persist state as JSON
    pub fn save(&self, path: &Path) -> TrainflowResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(&*self.state())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fault injection
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a bucket owned by another principal
    pub fn seed_foreign_bucket(&self, name: &str, owner: &str) {
        self.state().buckets.insert(
            name.to_string(),
            StoredBucket {
                owner: owner.to_string(),
                objects: BTreeMap::new(),
            },
        );
    }

    /// Register a role under another account's ownership
    pub fn seed_foreign_role(&self, name: &str, owner: &str) {
        self.state().roles.insert(
            name.to_string(),
            StoredRole {
                owner: owner.to_string(),
                arn: role_arn(owner, name),
                trust_document: String::new(),
                policies: BTreeSet::new(),
            },
        );
    }

    /// Reject every call of `operation` with `AccessDenied`
    pub fn deny(&self, operation: &str) {
        self.harness().denied.insert(operation.to_string());
    }

    /// Make the next `misses` reads of a role report `NotFound`
    pub fn stale_role_reads(&self, name: &str, misses: u32) {
        self.harness()
            .stale_role_reads
            .insert(name.to_string(), misses);
    }

    /// Script how a step behaves in every simulated run
    pub fn script_step(&self, step: &str, outcome: StepOutcome) {
        self.harness().scripts.insert(step.to_string(), outcome);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────────

    pub fn bucket_owner(&self, name: &str) -> Option<String> {
        self.state().buckets.get(name).map(|b| b.owner.clone())
    }

    pub fn bucket_count(&self) -> usize {
        self.state().buckets.len()
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.state()
            .buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key).cloned())
    }

    /// A role owned by this backend's account
    pub fn role(&self, name: &str) -> Option<RoleRecord> {
        self.state()
            .roles
            .get(name)
            .filter(|role| role.owner == self.account_id)
            .map(|role| RoleRecord {
                name: name.to_string(),
                arn: role.arn.clone(),
            })
    }

    pub fn role_count(&self) -> usize {
        self.state().roles.len()
    }

    pub fn role_policies(&self, name: &str) -> Vec<String> {
        self.state()
            .roles
            .get(name)
            .map(|role| role.policies.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn role_trust_document(&self, name: &str) -> Option<String> {
        self.state()
            .roles
            .get(name)
            .map(|role| role.trust_document.clone())
    }

    /// How many `create_role` calls reached the backend
    pub fn role_create_attempts(&self, name: &str) -> usize {
        self.harness()
            .role_create_attempts
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// How many `create_role` calls actually created the role
    pub fn role_creations(&self, name: &str) -> usize {
        self.harness()
            .role_creations
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn pipeline(&self, name: &str) -> Option<PipelineDefinition> {
        self.state().pipelines.get(name).cloned()
    }

    pub fn run_request(&self, run_id: &str) -> Option<RunRequest> {
        self.state().runs.get(run_id).map(|run| run.request.clone())
    }

    /// Steps the simulator has submitted as jobs, in submission order
    pub fn submitted_steps(&self, run_id: &str) -> Vec<String> {
        self.state()
            .runs
            .get(run_id)
            .map(|run| run.submitted.clone())
            .unwrap_or_default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn harness(&self) -> MutexGuard<'_, Harness> {
        self.harness
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn authorize(&self, operation: &str, resource: &str) -> Result<(), BackendError> {
        if self.harness().denied.contains(operation) {
            return Err(BackendError::AccessDenied {
                operation: operation.to_string(),
                resource: resource.to_string(),
            });
        }
        Ok(())
    }

    /// Whether this read of `name` should miss
    fn consume_stale_read(&self, name: &str) -> bool {
        let mut harness = self.harness();
        match harness.stale_role_reads.get_mut(name) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

// Every call yields once before touching state so that concurrent callers
// interleave the way they would against a remote service.

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn create_bucket(&self, name: &str) -> Result<CreateOutcome, BackendError> {
        tokio::task::yield_now().await;
        self.authorize(ops::CREATE_BUCKET, name)?;

        let mut state = self.state();
        if let Some(existing) = state.buckets.get(name) {
            if existing.owner == self.account_id {
                return Ok(CreateOutcome::AlreadyOwned);
            }
            return Ok(CreateOutcome::Conflict {
                owner: existing.owner.clone(),
            });
        }

        state.buckets.insert(
            name.to_string(),
            StoredBucket {
                owner: self.account_id.clone(),
                objects: BTreeMap::new(),
            },
        );
        Ok(CreateOutcome::Created {
            identifier: bucket_arn(name),
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
    ) -> Result<(), BackendError> {
        tokio::task::yield_now().await;
        self.authorize(ops::PUT_OBJECT, &format!("{}/{}", bucket, key))?;

        let mut state = self.state();
        let stored = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| BackendError::NotFound {
                resource: bucket.to_string(),
            })?;

        if stored.owner != self.account_id {
            return Err(BackendError::AccessDenied {
                operation: ops::PUT_OBJECT.to_string(),
                resource: bucket.to_string(),
            });
        }

        stored.objects.insert(key.to_string(), body);
        Ok(())
    }
}

#[async_trait]
impl IdentityService for MemoryBackend {
    async fn get_role(&self, name: &str) -> Result<RoleRecord, BackendError> {
        tokio::task::yield_now().await;
        self.authorize(ops::GET_ROLE, name)?;

        let not_found = || BackendError::NotFound {
            resource: name.to_string(),
        };

        if self.consume_stale_read(name) {
            return Err(not_found());
        }

        self.role(name).ok_or_else(not_found)
    }

    async fn create_role(
        &self,
        name: &str,
        trust_document: &str,
    ) -> Result<CreateOutcome, BackendError> {
        tokio::task::yield_now().await;
        self.authorize(ops::CREATE_ROLE, name)?;

        *self
            .harness()
            .role_create_attempts
            .entry(name.to_string())
            .or_default() += 1;

        let mut state = self.state();
        if let Some(existing) = state.roles.get(name) {
            if existing.owner == self.account_id {
                return Ok(CreateOutcome::AlreadyOwned);
            }
            return Ok(CreateOutcome::Conflict {
                owner: existing.owner.clone(),
            });
        }

        let arn = role_arn(&self.account_id, name);
        state.roles.insert(
            name.to_string(),
            StoredRole {
                owner: self.account_id.clone(),
                arn: arn.clone(),
                trust_document: trust_document.to_string(),
                policies: BTreeSet::new(),
            },
        );
        drop(state);

        *self
            .harness()
            .role_creations
            .entry(name.to_string())
            .or_default() += 1;

        Ok(CreateOutcome::Created { identifier: arn })
    }

    async fn attach_policy(&self, role: &str, policy_arn: &str) -> Result<(), BackendError> {
        tokio::task::yield_now().await;
        self.authorize(ops::ATTACH_ROLE_POLICY, role)?;

        let mut state = self.state();
        let stored = state
            .roles
            .get_mut(role)
            .filter(|stored| stored.owner == self.account_id)
            .ok_or_else(|| BackendError::NotFound {
                resource: role.to_string(),
            })?;
        stored.policies.insert(policy_arn.to_string());
        Ok(())
    }

    async fn attached_policies(&self, role: &str) -> Result<Vec<String>, BackendError> {
        tokio::task::yield_now().await;
        self.authorize(ops::LIST_ATTACHED_ROLE_POLICIES, role)?;

        self.state()
            .roles
            .get(role)
            .filter(|stored| stored.owner == self.account_id)
            .map(|stored| stored.policies.iter().cloned().collect())
            .ok_or_else(|| BackendError::NotFound {
                resource: role.to_string(),
            })
    }
}

#[async_trait]
impl PipelineService for MemoryBackend {
    async fn upsert(&self, definition: &PipelineDefinition) -> Result<UpsertOutcome, BackendError> {
        tokio::task::yield_now().await;
        self.authorize(ops::UPSERT_PIPELINE, &definition.name)?;

        let mut state = self.state();
        let outcome = match state.pipelines.get(&definition.name) {
            Some(existing) if existing.fingerprint == definition.fingerprint => {
                return Ok(UpsertOutcome::Unchanged);
            }
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Created,
        };

        state
            .pipelines
            .insert(definition.name.clone(), definition.clone());
        Ok(outcome)
    }

    async fn start(&self, request: &RunRequest) -> Result<String, BackendError> {
        tokio::task::yield_now().await;
        self.authorize(ops::START_PIPELINE, &request.pipeline_name)?;

        let mut state = self.state();
        if !state.pipelines.contains_key(&request.pipeline_name) {
            return Err(BackendError::NotFound {
                resource: request.pipeline_name.clone(),
            });
        }

        let run_id = format!("run-{}", Uuid::new_v4().simple());
        state
            .runs
            .insert(run_id.clone(), SimulatedRun::new(request.clone()));
        Ok(run_id)
    }

    async fn describe(&self, run_id: &str) -> Result<RunDescription, BackendError> {
        tokio::task::yield_now().await;
        self.authorize(ops::DESCRIBE_RUN, run_id)?;

        let scripts = self.harness().scripts.clone();
        let mut state = self.state();
        let run = state
            .runs
            .get_mut(run_id)
            .ok_or_else(|| BackendError::NotFound {
                resource: run_id.to_string(),
            })?;

        run.tick(&scripts);
        Ok(run.describe(run_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::JobSpec;
    use crate::pipeline::StepKind;

    fn job(step: &str, depends_on: &[&str]) -> JobSpec {
        JobSpec {
            step: step.into(),
            kind: StepKind::Processing,
            image: "image".into(),
            instance_type: "ml.m5.large".into(),
            instance_count: 1,
            input_channels: BTreeMap::new(),
            outputs: BTreeMap::new(),
            output_path: None,
            hyperparameters: BTreeMap::new(),
            role_arn: role_arn("123", "r"),
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn definition(name: &str, fingerprint: &str) -> PipelineDefinition {
        PipelineDefinition {
            name: name.into(),
            parameters: BTreeMap::new(),
            steps: vec![],
            fingerprint: fingerprint.into(),
        }
    }

    fn request(jobs: Vec<JobSpec>) -> RunRequest {
        RunRequest {
            pipeline_name: "p".into(),
            run_name: "p-run".into(),
            experiment: None,
            parameters: BTreeMap::new(),
            jobs,
        }
    }

    #[tokio::test]
    async fn test_bucket_ownership() {
        let backend = MemoryBackend::new("123", "us-west-2");
        backend.seed_foreign_bucket("taken", "999");

        assert!(matches!(
            backend.create_bucket("mine").await.unwrap(),
            CreateOutcome::Created { .. }
        ));
        assert_eq!(
            backend.create_bucket("mine").await.unwrap(),
            CreateOutcome::AlreadyOwned
        );
        assert_eq!(
            backend.create_bucket("taken").await.unwrap(),
            CreateOutcome::Conflict {
                owner: "999".into()
            }
        );
    }

    #[tokio::test]
    async fn test_denied_operation() {
        let backend = MemoryBackend::new("123", "us-west-2");
        backend.deny(ops::CREATE_ROLE);

        let err = backend.create_role("r", "{}").await.unwrap_err();
        assert!(matches!(err, BackendError::AccessDenied { .. }));
    }

    #[tokio::test]
    async fn test_stale_reads_expire() {
        let backend = MemoryBackend::new("123", "us-west-2");
        backend.create_role("r", "{}").await.unwrap();
        backend.stale_role_reads("r", 1);

        assert!(backend.get_role("r").await.unwrap_err().is_not_found());
        assert_eq!(backend.get_role("r").await.unwrap().arn, role_arn("123", "r"));
    }

    #[tokio::test]
    async fn test_upsert_fingerprints() {
        let backend = MemoryBackend::new("123", "us-west-2");

        assert_eq!(
            backend.upsert(&definition("p", "a")).await.unwrap(),
            UpsertOutcome::Created
        );
        assert_eq!(
            backend.upsert(&definition("p", "a")).await.unwrap(),
            UpsertOutcome::Unchanged
        );
        assert_eq!(
            backend.upsert(&definition("p", "b")).await.unwrap(),
            UpsertOutcome::Updated
        );
    }

    #[tokio::test]
    async fn test_simulated_run_respects_dependencies() {
        let backend = MemoryBackend::new("123", "us-west-2");
        backend.upsert(&definition("p", "a")).await.unwrap();
        let run_id = backend
            .start(&request(vec![job("a", &[]), job("b", &["a"])]))
            .await
            .unwrap();

        let first = backend.describe(&run_id).await.unwrap();
        assert_eq!(first.status, RunStatus::Running);
        assert_eq!(first.steps["a"], RunStatus::Running);
        assert_eq!(first.steps["b"], RunStatus::Pending);

        let second = backend.describe(&run_id).await.unwrap();
        assert_eq!(second.steps["a"], RunStatus::Succeeded);
        assert_eq!(second.steps["b"], RunStatus::Running);

        let third = backend.describe(&run_id).await.unwrap();
        assert_eq!(third.status, RunStatus::Succeeded);
        assert_eq!(backend.submitted_steps(&run_id), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failed_step_stops_downstream() {
        let backend = MemoryBackend::new("123", "us-west-2");
        backend.script_step("a", StepOutcome::Fail("OOM".into()));
        backend.upsert(&definition("p", "a")).await.unwrap();
        let run_id = backend
            .start(&request(vec![job("a", &[]), job("b", &["a"])]))
            .await
            .unwrap();

        backend.describe(&run_id).await.unwrap();
        let done = backend.describe(&run_id).await.unwrap();
        assert_eq!(done.status, RunStatus::Failed);
        assert_eq!(
            done.failure,
            Some(StepFailure {
                step: "a".into(),
                reason: "OOM".into()
            })
        );
        assert_eq!(done.steps["b"], RunStatus::Pending);
        assert_eq!(backend.submitted_steps(&run_id), vec!["a"]);
    }

    #[tokio::test]
    async fn test_state_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("backend.json");

        let backend = MemoryBackend::new("123", "us-west-2");
        backend.create_bucket("b").await.unwrap();
        backend.put_object("b", "k", b"v".to_vec()).await.unwrap();
        backend.save(&path).unwrap();

        let restored = MemoryBackend::load(&path, "123", "us-west-2").unwrap();
        assert_eq!(restored.object("b", "k"), Some(b"v".to_vec()));
        assert_eq!(
            restored.create_bucket("b").await.unwrap(),
            CreateOutcome::AlreadyOwned
        );
    }
}
