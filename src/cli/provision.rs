// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Provision command - ensure the bucket and execution role exist

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::{report, Workspace};
use crate::provision::ResourceProvisioner;
use crate::utils::{print_bullet, print_header, print_section, print_success};

/// Run the provision command
pub async fn run(
    bucket: Option<String>,
    role: Option<String>,
    config_path: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let workspace = Workspace::open(config_path.as_deref())?;

    let mut plan = workspace.config.provisioning_plan();
    if let Some(bucket) = bucket {
        plan.bucket = bucket;
    }
    if let Some(role) = role {
        plan.role = role;
    }

    print_header("Provisioning resources");

    let provisioner = ResourceProvisioner::new(workspace.context());
    let result = provisioner.provision(&plan).await;

    // Whatever was created before a failure is real and must be kept
    workspace.persist()?;
    let provisioned = result.map_err(report)?;

    print_success(&format!(
        "Bucket {} ({})",
        provisioned.bucket.name.bold(),
        provisioned.bucket.identifier.dimmed()
    ));
    print_success(&format!(
        "Role {} ({})",
        provisioned.role.name.bold(),
        provisioned.role.identifier.dimmed()
    ));

    if verbose {
        print_section("Attached policies");
        for policy in &provisioned.role.policies {
            print_bullet(&policy.action);
        }
    }

    println!();
    println!("{}", "Resources ready.".green().bold());
    Ok(())
}
