// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Resource provisioning
//!
//! Idempotent create-or-get for the storage bucket and the execution role a
//! pipeline needs. Safe to call repeatedly and from concurrent callers:
//! "already exists and is ours" is success, a foreign owner is a conflict,
//! and every other backend failure aborts.

mod trust;

pub use trust::TrustDocument;

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::backend::{bucket_arn, ops, BackendContext, BackendError, CreateOutcome, RoleRecord};
use crate::errors::{TrainflowError, TrainflowResult};

/// Kind of a provisioned resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Bucket,
    Role,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bucket => write!(f, "Bucket"),
            Self::Role => write!(f, "Role"),
        }
    }
}

/// A policy attached to a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub resource_name: String,
    /// Identifier of the attached managed policy
    pub action: String,
}

/// A bucket or role known to exist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: ResourceKind,
    pub name: String,
    /// ARN of the resource
    pub identifier: String,
    /// Attached policies (roles only)
    #[serde(default)]
    pub policies: Vec<Policy>,
}

/// Everything a pipeline needs before it can run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningPlan {
    pub bucket: String,
    pub role: String,
    pub trusted_principal: String,
    pub policies: Vec<String>,
}

/// Result of [`ResourceProvisioner::provision`]
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub bucket: Resource,
    pub role: Resource,
}

/// Creates or confirms buckets and roles
pub struct ResourceProvisioner {
    ctx: BackendContext,
}

impl ResourceProvisioner {
    pub fn new(ctx: BackendContext) -> Self {
        Self { ctx }
    }

    /// Create a bucket unless it already exists and belongs to the caller
    pub async fn ensure_bucket(&self, name: &str) -> TrainflowResult<Resource> {
        let outcome = self
            .ctx
            .objects
            .create_bucket(name)
            .await
            .map_err(|e| backend_failure(ops::CREATE_BUCKET, name, e))?;

        let identifier = match outcome {
            CreateOutcome::Created { identifier } => {
                info!(bucket = name, "created bucket");
                identifier
            }
            CreateOutcome::AlreadyOwned => {
                debug!(bucket = name, "bucket already exists");
                bucket_arn(name)
            }
            CreateOutcome::Conflict { owner } => {
                return Err(TrainflowError::ResourceConflict {
                    kind: ResourceKind::Bucket,
                    name: name.to_string(),
                    owner,
                });
            }
        };

        Ok(Resource {
            kind: ResourceKind::Bucket,
            name: name.to_string(),
            identifier,
            policies: Vec::new(),
        })
    }

    /// Get or create a role assumable only by `trusted_principal`, with every
    /// policy in `policy_arns` attached.
    ///
    /// Losing a creation race to another caller falls back to fetching the
    /// role. Policies are attached on every path, so the role ends up complete
    /// whichever caller created it.
    pub async fn ensure_role(
        &self,
        name: &str,
        trusted_principal: &str,
        policy_arns: &[String],
    ) -> TrainflowResult<Resource> {
        let record = match self.fetch_role(name).await? {
            Some(record) => {
                debug!(role = name, "role already exists");
                record
            }
            None => self.create_role(name, trusted_principal).await?,
        };

        for policy in policy_arns {
            self.ctx
                .identity
                .attach_policy(name, policy)
                .await
                .map_err(|e| backend_failure(ops::ATTACH_ROLE_POLICY, name, e))?;
            debug!(role = name, policy = %policy, "attached policy");
        }

        let attached = self
            .ctx
            .identity
            .attached_policies(name)
            .await
            .map_err(|e| backend_failure(ops::LIST_ATTACHED_ROLE_POLICIES, name, e))?;

        if let Some(missing) = policy_arns.iter().find(|p| !attached.contains(p)) {
            return Err(TrainflowError::ProvisioningFailure {
                operation: ops::ATTACH_ROLE_POLICY.to_string(),
                resource: name.to_string(),
                message: format!("policy '{}' is not attached after attachment", missing),
            });
        }

        Ok(Resource {
            kind: ResourceKind::Role,
            name: name.to_string(),
            identifier: record.arn,
            policies: policy_arns
                .iter()
                .map(|p| Policy {
                    resource_name: name.to_string(),
                    action: p.clone(),
                })
                .collect(),
        })
    }

    /// Write an object, replacing whatever was stored under `key`
    pub async fn upload_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> TrainflowResult<()> {
        let size = body.len();
        self.ctx
            .objects
            .put_object(bucket, key, body)
            .await
            .map_err(|e| match e {
                BackendError::NotFound { .. } => TrainflowError::ResourceNotFound {
                    kind: ResourceKind::Bucket,
                    name: bucket.to_string(),
                },
                other => backend_failure(ops::PUT_OBJECT, &format!("{}/{}", bucket, key), other),
            })?;

        info!(bucket, key, bytes = size, "uploaded object");
        Ok(())
    }

    /// Upload a local file
    pub async fn upload_file(&self, bucket: &str, key: &str, path: &Path) -> TrainflowResult<()> {
        let body = tokio::fs::read(path)
            .await
            .map_err(|e| TrainflowError::FileReadError {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;

        self.upload_object(bucket, key, body).await
    }

    /// Ensure the bucket, then the role. Stops at the first failure.
    pub async fn provision(&self, plan: &ProvisioningPlan) -> TrainflowResult<Provisioned> {
        let bucket = self.ensure_bucket(&plan.bucket).await?;
        let role = self
            .ensure_role(&plan.role, &plan.trusted_principal, &plan.policies)
            .await?;

        Ok(Provisioned { bucket, role })
    }

    /// `None` when the role does not exist
    async fn fetch_role(&self, name: &str) -> TrainflowResult<Option<RoleRecord>> {
        match self.ctx.identity.get_role(name).await {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(backend_failure(ops::GET_ROLE, name, e)),
        }
    }

    async fn create_role(&self, name: &str, trusted_principal: &str) -> TrainflowResult<RoleRecord> {
        let trust = TrustDocument::for_service(trusted_principal).to_json()?;

        let outcome = self
            .ctx
            .identity
            .create_role(name, &trust)
            .await
            .map_err(|e| backend_failure(ops::CREATE_ROLE, name, e))?;

        match outcome {
            CreateOutcome::Created { identifier } => {
                info!(role = name, principal = trusted_principal, "created role");
                Ok(RoleRecord {
                    name: name.to_string(),
                    arn: identifier,
                })
            }
            CreateOutcome::AlreadyOwned => {
                info!(role = name, "role created concurrently, fetching it");
                self.fetch_role(name)
                    .await?
                    .ok_or_else(|| TrainflowError::ProvisioningFailure {
                        operation: ops::GET_ROLE.to_string(),
                        resource: name.to_string(),
                        message: "role exists but could not be retrieved".to_string(),
                    })
            }
            CreateOutcome::Conflict { owner } => Err(TrainflowError::ResourceConflict {
                kind: ResourceKind::Role,
                name: name.to_string(),
                owner,
            }),
        }
    }
}

fn backend_failure(operation: &str, resource: &str, error: BackendError) -> TrainflowError {
    match error {
        BackendError::AccessDenied { .. } => TrainflowError::PermissionDenied {
            operation: operation.to_string(),
            resource: resource.to_string(),
        },
        other => TrainflowError::ProvisioningFailure {
            operation: operation.to_string(),
            resource: resource.to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use std::sync::Arc;

    const SAGEMAKER: &str = "arn:aws:iam::aws:policy/AmazonSageMakerFullAccess";
    const S3: &str = "arn:aws:iam::aws:policy/AmazonS3FullAccess";
    const PRINCIPAL: &str = "sagemaker.amazonaws.com";

    fn setup() -> (Arc<MemoryBackend>, ResourceProvisioner) {
        let backend = Arc::new(MemoryBackend::new("111122223333", "us-west-2"));
        let provisioner = ResourceProvisioner::new(BackendContext::from_memory(backend.clone()));
        (backend, provisioner)
    }

    fn policies() -> Vec<String> {
        vec![SAGEMAKER.to_string(), S3.to_string()]
    }

    #[tokio::test]
    async fn test_ensure_bucket_is_idempotent() {
        let (backend, provisioner) = setup();

        let first = provisioner.ensure_bucket("b").await.unwrap();
        let second = provisioner.ensure_bucket("b").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.identifier, "arn:aws:s3:::b");
        assert_eq!(backend.bucket_count(), 1);
        assert_eq!(backend.bucket_owner("b").as_deref(), Some("111122223333"));
    }

    #[tokio::test]
    async fn test_foreign_bucket_is_a_conflict() {
        let (backend, provisioner) = setup();
        backend.seed_foreign_bucket("shared-name", "999999999999");

        let err = provisioner.ensure_bucket("shared-name").await.unwrap_err();
        assert!(matches!(
            err,
            TrainflowError::ResourceConflict { kind: ResourceKind::Bucket, ref owner, .. }
                if owner == "999999999999"
        ));
    }

    #[tokio::test]
    async fn test_concurrent_ensure_bucket_converges() {
        let (backend, provisioner) = setup();
        let other = ResourceProvisioner::new(BackendContext::from_memory(backend.clone()));

        let (a, b) = tokio::join!(provisioner.ensure_bucket("b"), other.ensure_bucket("b"));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.identifier, b.identifier);
        assert_eq!(backend.bucket_count(), 1);
    }

    #[tokio::test]
    async fn test_foreign_role_is_a_conflict() {
        let (backend, provisioner) = setup();
        backend.seed_foreign_role("r", "999999999999");

        let err = provisioner
            .ensure_role("r", PRINCIPAL, &policies())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TrainflowError::ResourceConflict { kind: ResourceKind::Role, ref owner, .. }
                if owner == "999999999999"
        ));
        assert!(backend.role("r").is_none());
        assert!(backend.role_policies("r").is_empty());
    }

    #[tokio::test]
    async fn test_ensure_role_creates_and_attaches() {
        let (backend, provisioner) = setup();

        let role = provisioner
            .ensure_role("r", PRINCIPAL, &policies())
            .await
            .unwrap();

        assert_eq!(role.kind, ResourceKind::Role);
        assert_eq!(role.identifier, "arn:aws:iam::111122223333:role/r");
        assert_eq!(role.policies.len(), 2);
        assert_eq!(backend.role_policies("r").len(), 2);

        let trust = backend.role_trust_document("r").unwrap();
        assert!(trust.contains(PRINCIPAL));
    }

    #[tokio::test]
    async fn test_existing_role_gets_missing_policies() {
        let (backend, provisioner) = setup();
        provisioner
            .ensure_role("r", PRINCIPAL, &[SAGEMAKER.to_string()])
            .await
            .unwrap();

        provisioner
            .ensure_role("r", PRINCIPAL, &policies())
            .await
            .unwrap();

        assert_eq!(backend.role_creations("r"), 1);
        assert_eq!(backend.role_policies("r"), vec![S3.to_string(), SAGEMAKER.to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_ensure_role_converges() {
        let (backend, provisioner) = setup();
        let wanted = policies();

        let (a, b) = tokio::join!(
            provisioner.ensure_role("x", PRINCIPAL, &wanted),
            provisioner.ensure_role("x", PRINCIPAL, &wanted),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.identifier, b.identifier);
        assert_eq!(backend.role_count(), 1);
        assert_eq!(backend.role_creations("x"), 1);
        assert_eq!(backend.role_policies("x").len(), 2);
    }

    #[tokio::test]
    async fn test_create_race_falls_back_to_fetch() {
        let (backend, provisioner) = setup();
        provisioner.ensure_role("r", PRINCIPAL, &[]).await.unwrap();

        // The first read misses, as if another caller created the role a moment ago
        backend.stale_role_reads("r", 1);

        let role = provisioner
            .ensure_role("r", PRINCIPAL, &policies())
            .await
            .unwrap();

        assert_eq!(role.identifier, "arn:aws:iam::111122223333:role/r");
        assert_eq!(backend.role_create_attempts("r"), 2);
        assert_eq!(backend.role_creations("r"), 1);
    }

    #[tokio::test]
    async fn test_fetch_after_conflict_failure_is_fatal() {
        let (backend, provisioner) = setup();
        provisioner.ensure_role("r", PRINCIPAL, &[]).await.unwrap();
        backend.stale_role_reads("r", u32::MAX);

        let err = provisioner
            .ensure_role("r", PRINCIPAL, &policies())
            .await
            .unwrap_err();
        assert!(matches!(err, TrainflowError::ProvisioningFailure { .. }));
    }

    #[tokio::test]
    async fn test_policy_attachment_failure_is_fatal() {
        let (backend, provisioner) = setup();
        backend.deny(ops::ATTACH_ROLE_POLICY);

        let err = provisioner
            .ensure_role("r", PRINCIPAL, &policies())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TrainflowError::PermissionDenied { ref operation, ref resource }
                if operation == ops::ATTACH_ROLE_POLICY && resource == "r"
        ));
    }

    #[tokio::test]
    async fn test_upload_overwrites() {
        let (backend, provisioner) = setup();
        provisioner.ensure_bucket("b").await.unwrap();

        provisioner
            .upload_object("b", "data.csv", b"1,2".to_vec())
            .await
            .unwrap();
        provisioner
            .upload_object("b", "data.csv", b"3,4".to_vec())
            .await
            .unwrap();

        assert_eq!(backend.object("b", "data.csv"), Some(b"3,4".to_vec()));
    }

    #[tokio::test]
    async fn test_upload_to_missing_bucket() {
        let (_, provisioner) = setup();

        let err = provisioner
            .upload_object("nope", "k", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, TrainflowError::ResourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_provision_plan() {
        let (backend, provisioner) = setup();
        let plan = ProvisioningPlan {
            bucket: "b".into(),
            role: "r".into(),
            trusted_principal: PRINCIPAL.into(),
            policies: policies(),
        };

        let provisioned = provisioner.provision(&plan).await.unwrap();
        assert_eq!(provisioned.bucket.name, "b");
        assert_eq!(provisioned.role.name, "r");
        assert_eq!(backend.role_policies("r").len(), 2);
    }
}
