// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Content fingerprints for pipeline definitions
//!
//! Uses BLAKE3. Two definitions with the same name, parameter defaults
//! and steps hash identically, so re-submitting them is a no-op.

use blake3::Hasher;
use std::collections::BTreeMap;

use crate::backend::StepDefinition;
use crate::errors::TrainflowResult;

/// Incremental hasher over the parts of a definition
pub struct DefinitionHasher {
    hasher: Hasher,
}

impl DefinitionHasher {
    pub fn new() -> Self {
        Self {
            hasher: Hasher::new(),
        }
    }

    /// Hash a length-prefixed field so adjacent fields cannot run together
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(&(data.len() as u64).to_le_bytes());
        self.hasher.update(data);
    }

    pub fn hash_parameters(&mut self, parameters: &BTreeMap<String, String>) {
        for (name, default) in parameters {
            self.update(name.as_bytes());
            self.update(default.as_bytes());
        }
    }

    pub fn hash_step(&mut self, step: &StepDefinition) -> TrainflowResult<()> {
        let json = serde_json::to_vec(step)?;
        self.update(&json);
        Ok(())
    }

    pub fn finalize(self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

impl Default for DefinitionHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Fingerprint of a whole definition
pub fn fingerprint(
    name: &str,
    parameters: &BTreeMap<String, String>,
    steps: &[StepDefinition],
) -> TrainflowResult<String> {
    let mut hasher = DefinitionHasher::new();
    hasher.update(name.as_bytes());
    hasher.hash_parameters(parameters);
    for step in steps {
        hasher.hash_step(step)?;
    }
    Ok(hasher.finalize())
}
