// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Graph command - visualize pipeline as a graph

use miette::Result;
use std::path::PathBuf;

use super::{report, GraphFormat};
use crate::pipeline::{DagBuilder, PipelineFile};

/// Run the graph command
pub async fn run(pipeline_path: PathBuf, format: GraphFormat, _verbose: bool) -> Result<()> {
    let graph = PipelineFile::from_file(&pipeline_path)
        .and_then(PipelineFile::into_graph)
        .map_err(report)?;

    let dag = DagBuilder::build(graph.steps()).map_err(report)?;

    let output = match format {
        GraphFormat::Text => dag.to_text(graph.steps()).map_err(report)?,
        GraphFormat::Dot => dag.to_dot(),
        GraphFormat::Mermaid => dag.to_mermaid(),
    };

    println!("{}", output);

    Ok(())
}
