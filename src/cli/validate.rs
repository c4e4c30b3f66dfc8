// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 trainflow contributors

//! Validate command - check pipeline configuration

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::report;
use crate::pipeline::{PipelineFile, PipelineValidator};
use crate::utils::{print_error, print_section, print_success, print_warning};

/// Run the validate command
pub async fn run(pipeline_path: PathBuf, verbose: bool) -> Result<()> {
    println!("{}", "Validating pipeline...".bold());
    println!();

    let file = match PipelineFile::from_file(&pipeline_path) {
        Ok(f) => f,
        Err(e) => {
            print_error("Failed to parse pipeline");
            println!();
            return Err(report(e));
        }
    };

    print_success("Pipeline file is valid YAML");

    let validation = PipelineValidator::validate(&file).map_err(report)?;

    if !validation.errors.is_empty() {
        print_section("Errors");
        for error in &validation.errors {
            print_error(error);
        }
    }

    if !validation.warnings.is_empty() {
        print_section("Warnings");
        for warning in &validation.warnings {
            print_warning(warning);
        }
    }

    if verbose && validation.is_valid() {
        let mut graph = file.clone().into_graph().map_err(report)?;
        let order = graph.build().map_err(report)?.to_vec();

        print_section("Pipeline summary");
        println!("  Name: {}", file.name);
        println!("  Parameters: {}", file.parameters.len());
        println!("  Steps: {}", order.len());
        for name in &order {
            if let Some(step) = graph.step(name) {
                let deps = if step.depends_on().is_empty() {
                    String::new()
                } else {
                    let deps: Vec<&str> = step.depends_on().iter().map(String::as_str).collect();
                    format!(" [depends: {}]", deps.join(", "))
                };
                println!("    - {} ({}){}", step.name, step.kind, deps.dimmed());
            }
        }
    }

    println!();

    if !validation.is_valid() {
        Err(miette::miette!("Pipeline validation failed"))
    } else if validation.has_warnings() {
        println!("{}", "Pipeline is valid but has warnings.".yellow().bold());
        Ok(())
    } else {
        println!("{}", "Pipeline is valid!".green().bold());
        Ok(())
    }
}
