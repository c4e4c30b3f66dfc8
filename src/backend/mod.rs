// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Execution backend interfaces
//!
//! trainflow never talks to a cloud SDK directly. Object storage, identity
//! and the pipeline service are traits, bundled into a [`BackendContext`]
//! that is handed to the provisioner and the coordinator.

mod memory;
mod types;

pub use memory::{MemoryBackend, StepOutcome};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::errors::TrainflowError;

/// Operation names, used in errors and for permission checks
pub mod ops {
    pub const CREATE_BUCKET: &str = "s3:CreateBucket";
    pub const PUT_OBJECT: &str = "s3:PutObject";
    pub const GET_ROLE: &str = "iam:GetRole";
    pub const CREATE_ROLE: &str = "iam:CreateRole";
    pub const ATTACH_ROLE_POLICY: &str = "iam:AttachRolePolicy";
    pub const LIST_ATTACHED_ROLE_POLICIES: &str = "iam:ListAttachedRolePolicies";
    pub const UPSERT_PIPELINE: &str = "pipeline:Upsert";
    pub const START_PIPELINE: &str = "pipeline:Start";
    pub const DESCRIBE_RUN: &str = "pipeline:Describe";
}

/// Failure reported by a backend call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("'{resource}' not found")]
    NotFound { resource: String },

    #[error("access denied for '{operation}' on '{resource}'")]
    AccessDenied { operation: String, resource: String },

    #[error("backend unavailable: {message}")]
    Unavailable { message: String },
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<BackendError> for TrainflowError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::AccessDenied {
                operation,
                resource,
            } => Self::PermissionDenied {
                operation,
                resource,
            },
            other => Self::Backend {
                message: other.to_string(),
            },
        }
    }
}

/// Object storage API
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create a bucket, reporting whether it was new, already ours, or foreign
    async fn create_bucket(&self, name: &str) -> Result<CreateOutcome, BackendError>;

    /// Unconditionally write an object; last write wins
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>)
        -> Result<(), BackendError>;
}

/// Identity/role API
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Fetch a role by name. Missing roles are `BackendError::NotFound`.
    async fn get_role(&self, name: &str) -> Result<RoleRecord, BackendError>;

    /// Create a role whose trust policy is the given JSON document
    async fn create_role(
        &self,
        name: &str,
        trust_document: &str,
    ) -> Result<CreateOutcome, BackendError>;

    /// Attach a managed policy. Attaching twice is a no-op.
    async fn attach_policy(&self, role: &str, policy_arn: &str) -> Result<(), BackendError>;

    /// List policies currently attached to a role
    async fn attached_policies(&self, role: &str) -> Result<Vec<String>, BackendError>;
}

/// Pipeline definition and run API
#[async_trait]
pub trait PipelineService: Send + Sync {
    /// Create or update a pipeline definition
    async fn upsert(&self, definition: &PipelineDefinition) -> Result<UpsertOutcome, BackendError>;

    /// Start a run and return its identifier without waiting
    async fn start(&self, request: &RunRequest) -> Result<String, BackendError>;

    /// Report the current status of a run
    async fn describe(&self, run_id: &str) -> Result<RunDescription, BackendError>;
}

/// Handles to the backend services plus the caller's identity
#[derive(Clone)]
pub struct BackendContext {
    /// Account that owns everything created through this context
    pub account_id: String,
    /// Region the services live in
    pub region: String,
    pub objects: Arc<dyn ObjectStore>,
    pub identity: Arc<dyn IdentityService>,
    pub pipelines: Arc<dyn PipelineService>,
}

impl BackendContext {
    /// Route every service to one in-memory backend
    pub fn from_memory(backend: Arc<MemoryBackend>) -> Self {
        Self {
            account_id: backend.account_id().to_string(),
            region: backend.region().to_string(),
            objects: backend.clone(),
            identity: backend.clone(),
            pipelines: backend,
        }
    }
}

impl std::fmt::Debug for BackendContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendContext")
            .field("account_id", &self.account_id)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

/// Durable identifier of a bucket
pub fn bucket_arn(name: &str) -> String {
    format!("arn:aws:s3:::{}", name)
}

/// Durable identifier of a role
pub fn role_arn(account_id: &str, name: &str) -> String {
    format!("arn:aws:iam::{}:role/{}", account_id, name)
}
