// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Assume-role trust documents

use serde::{Deserialize, Serialize};

use crate::errors::TrainflowResult;

/// Policy language version understood by the identity service
pub const POLICY_VERSION: &str = "2012-10-17";

/// Trust policy naming the only principal allowed to assume a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrustDocument {
    pub version: String,
    pub statement: Vec<TrustStatement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrustStatement {
    pub effect: String,
    pub principal: TrustPrincipal,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrustPrincipal {
    pub service: String,
}

impl TrustDocument {
    /// Allow a single service principal to assume the role
    pub fn for_service(principal: &str) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement: vec![TrustStatement {
                effect: "Allow".to_string(),
                principal: TrustPrincipal {
                    service: principal.to_string(),
                },
                action: "sts:AssumeRole".to_string(),
            }],
        }
    }

    pub fn to_json(&self) -> TrainflowResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_document_shape() {
        let json = TrustDocument::for_service("sagemaker.amazonaws.com")
            .to_json()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["Version"], "2012-10-17");
        assert_eq!(value["Statement"][0]["Effect"], "Allow");
        assert_eq!(
            value["Statement"][0]["Principal"]["Service"],
            "sagemaker.amazonaws.com"
        );
        assert_eq!(value["Statement"][0]["Action"], "sts:AssumeRole");
    }
}
