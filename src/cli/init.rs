// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Init command - create a new trainflow project

use colored::Colorize;
use miette::Result;
use std::path::{Path, PathBuf};

use super::{report, PIPELINE_FILE};
use crate::config::{TrainflowConfig, CONFIG_FILE};

/// Run the init command
pub async fn run(
    name: Option<String>,
    template: Option<String>,
    config_path: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let project_name = name.unwrap_or_else(|| {
        std::env::current_dir()
            .ok()
            .and_then(|p| p.file_name().map(|s| s.to_string_lossy().to_string()))
            .unwrap_or_else(|| "my-pipeline".to_string())
    });

    println!("{}", "Initializing trainflow project...".bold());
    println!();

    if Path::new(PIPELINE_FILE).exists() {
        return Err(miette::miette!(
            "{} already exists. Remove it first to start over.",
            PIPELINE_FILE
        ));
    }

    let config = TrainflowConfig::load(config_path.as_deref()).map_err(report)?;
    let bucket = &config.provisioning.bucket;
    let role = &config.provisioning.role;

    let pipeline_content = match template.as_deref() {
        Some("kmeans") | None => generate_kmeans_template(&project_name, bucket, role),
        Some("deepar") => generate_deepar_template(&project_name, bucket, role),
        Some(t) => {
            return Err(miette::miette!(
                "Unknown template: '{}'\n\nAvailable templates:\n\
                 • kmeans  - Single k-means training step on uploaded CSV data\n\
                 • deepar  - Process time series, then train a DeepAR forecaster",
                t
            ));
        }
    };

    std::fs::write(PIPELINE_FILE, &pipeline_content)
        .map_err(|e| miette::miette!("Failed to write {}: {}", PIPELINE_FILE, e))?;
    println!("  {} Created {}", "✓".green(), PIPELINE_FILE);

    if config_path.is_none() && !Path::new(CONFIG_FILE).exists() {
        let toml = config.to_toml().map_err(report)?;
        std::fs::write(CONFIG_FILE, toml)
            .map_err(|e| miette::miette!("Failed to write {}: {}", CONFIG_FILE, e))?;
        println!("  {} Created {}", "✓".green(), CONFIG_FILE);
    }

    println!();
    println!("{}", "Project initialized!".green().bold());
    println!();
    println!("Next steps:");
    println!("  1. Set bucket and role names in {}", CONFIG_FILE.cyan());
    println!("  2. Run {} to create them", "trainflow provision".cyan());
    println!(
        "  3. Upload training data with {}",
        "trainflow upload <BUCKET> <KEY> <FILE>".cyan()
    );
    println!("  4. Run {} to start the pipeline", "trainflow run".cyan());
    println!();

    if verbose {
        println!("{}", "Generated pipeline:".dimmed());
        println!("{}", "─".repeat(50).dimmed());
        println!("{}", pipeline_content.dimmed());
    }

    Ok(())
}

fn generate_kmeans_template(name: &str, bucket: &str, role: &str) -> String {
    format!(
        r#"# trainflow pipeline
version: "1"
name: "{name}"
description: "k-means clustering on CSV data"
artifact_root: "s3://{bucket}/artifacts"

parameters:
  - name: TrainingData
    default: "s3://{bucket}/data.csv"

steps:
  - name: train
    kind: training
    role: "{role}"
    image: "kmeans:1"
    instance_type: ml.c5.xlarge
    inputs:
      - name: train
        locator: "{{{{ TrainingData }}}}"
    outputs:
      - name: model
    config:
      k: "10"
      feature_dim: "33"
      mini_batch_size: "500"
      epochs: "3"
"#
    )
}

fn generate_deepar_template(name: &str, bucket: &str, role: &str) -> String {
    format!(
        r#"# trainflow pipeline
version: "1"
name: "{name}"
description: "Time series processing followed by DeepAR forecasting"
artifact_root: "s3://{bucket}/artifacts"

parameters:
  - name: InputDataUri
    default: "s3://{bucket}/time-series"

steps:
  - name: process
    kind: processing
    role: "{role}"
    image: "sagemaker-scikit-learn:1.2-1-cpu-py3"
    inputs:
      - name: input
        locator: "{{{{ InputDataUri }}}}"
    outputs:
      - name: processed_data
    config:
      code: scripts/processing.py

  - name: train
    kind: training
    role: "{role}"
    image: "forecasting-deepar:1"
    inputs:
      - name: train
        from_step: process
        output: processed_data
    outputs:
      - name: model
    config:
      time_freq: D
      context_length: "30"
      prediction_length: "7"
      epochs: "10"
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineFile, PipelineValidator};

    #[test]
    fn test_templates_build() {
        for content in [
            generate_kmeans_template("k", "b", "r"),
            generate_deepar_template("d", "b", "r"),
        ] {
            let file = PipelineFile::from_yaml(&content).unwrap();
            let result = PipelineValidator::validate(&file).unwrap();
            assert!(result.is_valid(), "{:?}", result.errors);

            let mut graph = file.into_graph().unwrap();
            graph.build().unwrap();
        }
    }

    #[test]
    fn test_deepar_template_chains_steps() {
        let file = PipelineFile::from_yaml(&generate_deepar_template("d", "b", "r")).unwrap();
        let mut graph = file.into_graph().unwrap();
        let order = graph.build().unwrap().to_vec();

        assert_eq!(order, vec!["process", "train"]);
        assert_eq!(
            graph
                .step("process")
                .unwrap()
                .output("processed_data")
                .unwrap()
                .locator
                .as_deref(),
            Some("s3://b/artifacts/process/processed_data")
        );
    }
}
