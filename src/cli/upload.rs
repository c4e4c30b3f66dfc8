// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Upload command - put a local file into a bucket

use miette::Result;
use std::path::PathBuf;

use super::{report, Workspace};
use crate::provision::ResourceProvisioner;
use crate::utils::{code, print_success};

/// Run the upload command
pub async fn run(
    bucket: String,
    key: String,
    file: PathBuf,
    config_path: Option<PathBuf>,
    _verbose: bool,
) -> Result<()> {
    let workspace = Workspace::open(config_path.as_deref())?;
    let provisioner = ResourceProvisioner::new(workspace.context());

    provisioner
        .upload_file(&bucket, &key, &file)
        .await
        .map_err(report)?;
    workspace.persist()?;

    print_success(&format!(
        "Uploaded {} to {}",
        file.display(),
        code(&format!("s3://{}/{}", bucket, key))
    ));
    Ok(())
}
