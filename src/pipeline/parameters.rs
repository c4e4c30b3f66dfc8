// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Pipeline parameters and `{{ Name }}` placeholders in locators

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::errors::{TrainflowError, TrainflowResult};

/// A named pipeline parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,

    #[serde(rename = "default")]
    pub default_value: String,

    /// Set per run, never persisted
    #[serde(skip)]
    pub override_value: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, default_value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_value: default_value.into(),
            override_value: None,
        }
    }

    pub fn with_override(mut self, value: impl Into<String>) -> Self {
        self.override_value = Some(value.into());
        self
    }

    /// Override if present, default otherwise
    pub fn resolved_value(&self) -> &str {
        self.override_value.as_deref().unwrap_or(&self.default_value)
    }
}

/// Concrete parameter values for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedParameters {
    values: BTreeMap<String, String>,
}

impl ResolvedParameters {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Replace every placeholder in `text` with its resolved value
    pub fn substitute(&self, text: &str) -> TrainflowResult<String> {
        substitute(text, &self.values)
    }
}

impl FromIterator<(String, String)> for ResolvedParameters {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}\}")
            .expect("Invalid placeholder pattern")
    })
}

/// Parameter names referenced by `text`, in order of appearance
pub fn placeholders(text: &str) -> Vec<&str> {
    placeholder_pattern()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Substitute placeholders; unknown names are an error
pub fn substitute(text: &str, values: &BTreeMap<String, String>) -> TrainflowResult<String> {
    if let Some(unknown) = placeholders(text)
        .into_iter()
        .find(|name| !values.contains_key(*name))
    {
        return Err(TrainflowError::UnknownParameter {
            parameter: unknown.to_string(),
        });
    }

    Ok(placeholder_pattern()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            values
                .get(&caps[1])
                .cloned()
                .unwrap_or_default()
        })
        .into_owned())
}
