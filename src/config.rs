// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Project configuration (`trainflow.toml`)
//!
//! Lookup order: an explicit path, `./trainflow.toml`, the user config
//! directory, then built-in defaults. Command-line flags override whatever
//! was loaded.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{TrainflowError, TrainflowResult};
use crate::provision::ProvisioningPlan;

pub const CONFIG_FILE: &str = "trainflow.toml";

pub const SAGEMAKER_FULL_ACCESS: &str = "arn:aws:iam::aws:policy/AmazonSageMakerFullAccess";
pub const S3_FULL_ACCESS: &str = "arn:aws:iam::aws:policy/AmazonS3FullAccess";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainflowConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_account_id")]
    pub account_id: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Where the local backend keeps its state between invocations
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

fn default_account_id() -> String {
    "123456789012".to_string()
}

fn default_region() -> String {
    "us-west-2".to_string()
}

fn default_state_file() -> PathBuf {
    PathBuf::from(".trainflow/state.json")
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            account_id: default_account_id(),
            region: default_region(),
            state_file: default_state_file(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default = "default_trusted_principal")]
    pub trusted_principal: String,
    #[serde(default = "default_policies")]
    pub policies: Vec<String>,
}

fn default_bucket() -> String {
    "trainflow-artifacts".to_string()
}

fn default_role() -> String {
    "trainflow-execution".to_string()
}

fn default_trusted_principal() -> String {
    "sagemaker.amazonaws.com".to_string()
}

fn default_policies() -> Vec<String> {
    vec![SAGEMAKER_FULL_ACCESS.to_string(), S3_FULL_ACCESS.to_string()]
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            role: default_role(),
            trusted_principal: default_trusted_principal(),
            policies: default_policies(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Tracking label recorded on every run
    #[serde(default)]
    pub experiment: Option<String>,
}

fn default_poll_interval() -> u64 {
    30
}

fn default_timeout() -> u64 {
    3600
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_timeout(),
            experiment: None,
        }
    }
}

impl ExecutionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl TrainflowConfig {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> TrainflowResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> TrainflowResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TrainflowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Load configuration following the lookup order
    ///
    /// An explicit path must exist; the other locations are optional.
    pub fn load(explicit: Option<&Path>) -> TrainflowResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Self::from_file(&local);
        }

        if let Some(user) = Self::user_config_path() {
            if user.exists() {
                return Self::from_file(&user);
            }
        }

        Ok(Self::default())
    }

    /// `trainflow.toml` in the platform config directory
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "trainflow").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    pub fn validate(&self) -> TrainflowResult<()> {
        if self.execution.poll_interval_secs == 0 {
            return Err(TrainflowError::Config {
                message: "execution.poll_interval_secs must be at least 1".to_string(),
            });
        }
        if self.provisioning.bucket.is_empty() || self.provisioning.role.is_empty() {
            return Err(TrainflowError::Config {
                message: "provisioning.bucket and provisioning.role must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// The resources to bootstrap, as configured
    pub fn provisioning_plan(&self) -> ProvisioningPlan {
        ProvisioningPlan {
            bucket: self.provisioning.bucket.clone(),
            role: self.provisioning.role.clone(),
            trusted_principal: self.provisioning.trusted_principal.clone(),
            policies: self.provisioning.policies.clone(),
        }
    }

    pub fn to_toml(&self) -> TrainflowResult<String> {
        toml::to_string_pretty(self).map_err(|e| TrainflowError::Toml {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrainflowConfig::from_toml("").unwrap();

        assert_eq!(config.backend.state_file, PathBuf::from(".trainflow/state.json"));
        assert_eq!(config.provisioning.trusted_principal, "sagemaker.amazonaws.com");
        assert_eq!(
            config.provisioning.policies,
            vec![SAGEMAKER_FULL_ACCESS, S3_FULL_ACCESS]
        );
        assert_eq!(config.execution.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.execution.timeout(), Duration::from_secs(3600));
    }

    #[test]
    fn test_partial_sections() {
        let config = TrainflowConfig::from_toml(
            r#"
[provisioning]
bucket = "stock-data"

[execution]
poll_interval_secs = 5
experiment = "deepar"
"#,
        )
        .unwrap();

        assert_eq!(config.provisioning.bucket, "stock-data");
        assert_eq!(config.provisioning.role, "trainflow-execution");
        assert_eq!(config.execution.poll_interval_secs, 5);
        assert_eq!(config.execution.timeout_secs, 3600);
        assert_eq!(config.execution.experiment.as_deref(), Some("deepar"));

        let plan = config.provisioning_plan();
        assert_eq!(plan.bucket, "stock-data");
        assert_eq!(plan.policies.len(), 2);
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let err = TrainflowConfig::from_toml("[execution]\npoll_interval_secs = 0\n").unwrap_err();
        assert!(matches!(err, TrainflowError::Config { .. }));
    }

    #[test]
    fn test_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[backend]\nregion = \"eu-west-1\"\n").unwrap();

        let config = TrainflowConfig::load(Some(&path)).unwrap();
        assert_eq!(config.backend.region, "eu-west-1");
        assert_eq!(config.backend.account_id, "123456789012");

        let missing = dir.path().join("missing.toml");
        assert!(TrainflowConfig::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = TrainflowConfig::default();
        let parsed = TrainflowConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
